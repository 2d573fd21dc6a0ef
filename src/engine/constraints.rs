// ==========================================
// 矿石配矿堆料系统 - 堆约束
// ==========================================
// 职责: 一次构建调用所需的全部硬约束（质量窗口/品位带/回收率/药剂）
// 红线: 所有构建器/补料器共用同一套可行性判定
// ==========================================

use crate::config::{GradeBand, GradeEdgePolicy, MassWindow, ReagentBand, SolverConfig};
use crate::domain::{BlendTotals, Lot, PileType, TOLERANCE};

// ==========================================
// PileConstraints - 堆硬约束
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PileConstraints {
    pub pile_type: PileType,
    pub window: MassWindow,
    pub band: GradeBand,
    pub edge: GradeEdgePolicy,
    /// 加权回收率下限
    pub rec_min: f64,
    pub reagents: ReagentBand,
    pub enforce_reagents: bool,
}

impl PileConstraints {
    /// varios 堆约束（品位带由策略列表逐个传入）
    pub fn for_varios(cfg: &SolverConfig, band: GradeBand, enforce_reagents: bool) -> Self {
        Self {
            pile_type: PileType::Varios,
            window: cfg.varios.window,
            band,
            edge: cfg.varios.edge,
            rec_min: cfg.filters.pile_rec_min,
            reagents: cfg.reagents,
            enforce_reagents,
        }
    }

    /// batch 堆约束
    pub fn for_batch(cfg: &SolverConfig, enforce_reagents: bool) -> Self {
        Self {
            pile_type: PileType::Batch,
            window: cfg.batch.window,
            band: cfg.batch.band,
            edge: cfg.batch.edge,
            rec_min: cfg.filters.pile_rec_min,
            reagents: cfg.reagents,
            enforce_reagents,
        }
    }

    pub fn with_window(mut self, window: MassWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_reagents_enforced(mut self, enforce_reagents: bool) -> Self {
        self.enforce_reagents = enforce_reagents;
        self
    }

    /// 单批次能否进入候选池（药剂强制时必须已知药剂）
    pub fn admits_lot(&self, lot: &Lot) -> bool {
        lot.dry_mass > 0.0
            && lot.effective_mass > 0.0
            && (!self.enforce_reagents || lot.has_reagents())
    }

    /// 品质约束（不含质量窗口）: 回收率 + 品位 + 药剂
    pub fn quality_ok(&self, totals: &BlendTotals) -> bool {
        if totals.dry_mass <= 0.0 {
            return false;
        }

        let rec_ok = totals
            .recovery()
            .map_or(false, |r| r >= self.rec_min - TOLERANCE);
        if !rec_ok || !self.band.admits(totals.grade(), self.edge) {
            return false;
        }

        !self.enforce_reagents || self.reagents_ok(totals)
    }

    /// 两种药剂加权均值均在带内，且没有未知药剂的成员
    pub fn reagents_ok(&self, totals: &BlendTotals) -> bool {
        totals.unknown_reagent_lots == 0
            && self.reagents.admits(totals.reagent_a())
            && self.reagents.admits(totals.reagent_b())
    }

    /// 全部硬约束
    pub fn is_satisfied(&self, totals: &BlendTotals) -> bool {
        self.window.contains(totals.dry_mass) && self.quality_ok(totals)
    }

    /// 药剂带距离之和（两种药剂）
    pub fn reagent_distance(&self, totals: &BlendTotals) -> f64 {
        self.reagents.distance(totals.reagent_a()) + self.reagents.distance(totals.reagent_b())
    }

    /// 回收率缺口
    pub fn recovery_deficit(&self, totals: &BlendTotals) -> f64 {
        totals
            .recovery()
            .map_or(self.rec_min, |r| (self.rec_min - r).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(code: &str, mass: f64, grade: f64, rec: f64, reag: Option<f64>) -> Lot {
        Lot {
            code: code.to_string(),
            zone: None,
            wet_mass: None,
            moisture_pct: None,
            dry_mass: mass,
            effective_mass: mass,
            grade_oz_tc: None,
            grade,
            fine_content: grade * mass,
            ag_grade_oz_tc: None,
            ag_grade: None,
            ag_fine_content: None,
            impurity_pct: None,
            reagent_a: reag,
            reagent_b: reag,
            recovery_pct: rec,
            loaded_at: None,
        }
    }

    #[test]
    fn test_varios_constraints_satisfied() {
        let cfg = SolverConfig::default();
        let c = PileConstraints::for_varios(&cfg, GradeBand::new(20.0, 24.0), true);
        let lots = vec![
            lot("A", 100.0, 22.0, 90.0, Some(6.0)),
            lot("B", 100.0, 22.0, 90.0, Some(6.0)),
            lot("C", 100.0, 22.0, 90.0, Some(6.0)),
        ];
        let t = BlendTotals::from_lots(&lots);
        assert!(c.is_satisfied(&t));
        assert_eq!(c.reagent_distance(&t), 0.0);
    }

    #[test]
    fn test_unknown_reagents_fail_when_enforced() {
        let cfg = SolverConfig::default();
        let strict = PileConstraints::for_batch(&cfg, true);
        let relaxed = strict.with_reagents_enforced(false);
        let lots = vec![
            lot("A", 50.0, 35.0, 90.0, Some(6.0)),
            lot("B", 50.0, 35.0, 90.0, None),
        ];
        let t = BlendTotals::from_lots(&lots);
        assert!(!strict.quality_ok(&t));
        assert!(relaxed.is_satisfied(&t));
        assert!(!strict.admits_lot(&lots[1]));
        assert!(relaxed.admits_lot(&lots[1]));
    }

    #[test]
    fn test_recovery_deficit() {
        let cfg = SolverConfig::default();
        let c = PileConstraints::for_batch(&cfg, false);
        let t = BlendTotals::from_lots(&[lot("A", 100.0, 35.0, 80.0, None)]);
        assert!((c.recovery_deficit(&t) - 5.0).abs() < 1e-12);
        assert!(!c.quality_ok(&t));
    }
}
