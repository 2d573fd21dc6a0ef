// ==========================================
// 矿石配矿堆料系统 - varios 裁剪构建器
// ==========================================
// 职责: 从全部候选批次出发，每轮移除一个"最差"批次，直到满足全部硬约束
// 输入: 候选批次 + 堆约束（品位带 / 是否强制药剂）
// 输出: 可行批次集合；不可行时 None
// 红线: 迭代次数上限 = 候选数 + 5；移除不得使剩余干吨低于下限
// ==========================================

use crate::domain::{BlendTotals, Lot, TOLERANCE};
use crate::engine::constraints::PileConstraints;
use std::cmp::Ordering;
use tracing::{debug, info, instrument, trace};

// ===== 罚分权重（严格优先级，由大到小）=====
const W_MASS_DEFICIT: f64 = 1e12;
const W_MASS_EXCESS: f64 = 1e6;
const W_GRADE: f64 = 5e5;
const W_RECOVERY: f64 = 5e5;
const W_REAGENT: f64 = 2e5;
const W_TARGET: f64 = 10.0;
/// 空集合的罚分
const EMPTY_PENALTY: f64 = 1e18;
/// 罚分必须至少下降这么多才算改进
const MIN_IMPROVEMENT: f64 = 1e-6;
const EXTRA_ITERATIONS: usize = 5;

// ==========================================
// TrimBuilder - 裁剪构建器
// ==========================================
pub struct TrimBuilder {
    // 无状态引擎
}

/// 一次候选移除
#[derive(Debug, Clone, Copy)]
struct Removal {
    index: usize,
    penalty: f64,
    mass: f64,
    fine: f64,
}

impl Removal {
    /// 罚分最低 → 移除干吨最小 → 损失金属量最小
    fn cmp_key(&self, other: &Removal) -> Ordering {
        self.penalty
            .total_cmp(&other.penalty)
            .then_with(|| self.mass.total_cmp(&other.mass))
            .then_with(|| self.fine.total_cmp(&other.fine))
    }
}

/// 单次裁剪的结果与执行的移除轮数
struct TrimRun {
    lots: Option<Vec<Lot>>,
    iterations: usize,
}

impl TrimBuilder {
    pub fn new() -> Self {
        Self {}
    }

    /// 裁剪出一个可行堆
    ///
    /// 强制药剂时，药剂未知的批次不参与
    ///
    /// # 返回
    /// - Some(lots): 可行集合（保持输入顺序）
    /// - None: 该品位带/药剂模式下不可行
    #[instrument(skip(self, pool, constraints), fields(
        pool_size = pool.len(),
        gmin = constraints.band.min,
        gmax = constraints.band.max,
        enforce_reagents = constraints.enforce_reagents
    ))]
    pub fn build(&self, pool: &[Lot], constraints: &PileConstraints) -> Option<Vec<Lot>> {
        self.trim(pool, constraints).lots
    }

    fn trim(&self, pool: &[Lot], constraints: &PileConstraints) -> TrimRun {
        let lots: Vec<&Lot> = pool.iter().filter(|l| constraints.admits_lot(l)).collect();
        if lots.is_empty() {
            debug!("无可用候选批次");
            return TrimRun { lots: None, iterations: 0 };
        }

        let parts: Vec<BlendTotals> = lots.iter().map(|l| BlendTotals::of_lot(l)).collect();
        let mut keep = vec![true; lots.len()];
        let mut totals = BlendTotals::from_lots(lots.iter().copied());
        let mut cur_pen = self.penalty(&totals, constraints);

        let max_iterations = lots.len() + EXTRA_ITERATIONS;
        for iteration in 0..max_iterations {
            if constraints.is_satisfied(&totals) {
                return TrimRun {
                    lots: Some(self.finish(&lots, &keep, &totals)),
                    iterations: iteration,
                };
            }

            let best = keep
                .iter()
                .enumerate()
                .filter(|(_, kept)| **kept)
                .filter_map(|(j, _)| {
                    let after = totals - parts[j];
                    let removable = after.dry_mass >= constraints.window.min - TOLERANCE
                        && after.dry_mass > 0.0;
                    removable.then(|| Removal {
                        index: j,
                        penalty: self.penalty(&after, constraints),
                        mass: parts[j].dry_mass,
                        fine: parts[j].fine_content,
                    })
                })
                .min_by(|a, b| a.cmp_key(b));

            let removal = match best {
                Some(r) => r,
                None => {
                    debug!(iteration, mass = totals.dry_mass, "无可移除批次，判定不可行");
                    return TrimRun { lots: None, iterations: iteration };
                }
            };

            let need_cut = totals.dry_mass > constraints.window.max + TOLERANCE;
            if !need_cut && removal.penalty >= cur_pen - MIN_IMPROVEMENT {
                debug!(
                    iteration,
                    cur_pen,
                    new_pen = removal.penalty,
                    "移除无法改善罚分，判定不可行"
                );
                return TrimRun { lots: None, iterations: iteration };
            }

            trace!(
                iteration,
                code = %lots[removal.index].code,
                new_pen = removal.penalty,
                "移除批次"
            );
            keep[removal.index] = false;
            totals -= parts[removal.index];
            cur_pen = removal.penalty;
        }

        let kept = if constraints.is_satisfied(&totals) {
            Some(self.finish(&lots, &keep, &totals))
        } else {
            debug!(max_iterations, "迭代上限耗尽仍不可行");
            None
        };
        TrimRun {
            lots: kept,
            iterations: max_iterations,
        }
    }

    /// 标量罚分
    ///
    /// 干吨缺口 ≫ 超上限 ≫ 品位越界 ≈ 回收率缺口 ≫ 药剂越界（仅强制时） ≫ 与目标距离
    pub fn penalty(&self, totals: &BlendTotals, constraints: &PileConstraints) -> f64 {
        let mass = totals.dry_mass;
        if mass <= 0.0 {
            return EMPTY_PENALTY;
        }

        let w = &constraints.window;
        let grade_dist = constraints.band.edge_penalty(totals.grade(), constraints.edge);
        let reagent_term = if constraints.enforce_reagents {
            W_REAGENT * constraints.reagent_distance(totals)
        } else {
            0.0
        };

        W_MASS_DEFICIT * w.deficit(mass)
            + W_MASS_EXCESS * w.excess(mass)
            + W_GRADE * grade_dist
            + W_RECOVERY * constraints.recovery_deficit(totals)
            + reagent_term
            + W_TARGET * w.target_gap(mass)
    }

    fn finish(&self, lots: &[&Lot], keep: &[bool], totals: &BlendTotals) -> Vec<Lot> {
        let kept: Vec<Lot> = lots
            .iter()
            .zip(keep)
            .filter(|(_, k)| **k)
            .map(|(l, _)| (*l).clone())
            .collect();

        info!(
            lot_count = kept.len(),
            removed = lots.len() - kept.len(),
            mass = totals.dry_mass,
            grade = totals.grade().unwrap_or_default(),
            recovery = totals.recovery().unwrap_or_default(),
            "varios 裁剪完成"
        );
        kept
    }
}

impl Default for TrimBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GradeBand, MassWindow, SolverConfig};

    fn lot(code: &str, mass: f64, grade: f64, rec: f64, reag: Option<f64>) -> Lot {
        Lot {
            code: code.to_string(),
            zone: Some("Z".to_string()),
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

    fn constraints(min: f64) -> PileConstraints {
        let cfg = SolverConfig::default();
        PileConstraints::for_varios(&cfg, GradeBand::new(20.0, 24.0), true)
            .with_window(MassWindow::new(min, 550.0, 550.0))
    }

    #[test]
    fn test_feasible_pool_is_returned_untouched() {
        let pool = vec![
            lot("A", 100.0, 22.0, 90.0, Some(6.0)),
            lot("B", 100.0, 22.0, 90.0, Some(6.0)),
            lot("C", 100.0, 22.0, 90.0, Some(6.0)),
        ];
        let out = TrimBuilder::new().build(&pool, &constraints(250.0)).unwrap();
        assert_eq!(out, pool);
    }

    #[test]
    fn test_low_recovery_lot_forced_by_mass_min_is_infeasible() {
        let pool = vec![
            lot("A", 100.0, 22.0, 90.0, Some(6.0)),
            lot("B", 100.0, 22.0, 90.0, Some(6.0)),
            lot("LOW", 100.0, 22.0, 60.0, Some(6.0)),
        ];
        assert!(TrimBuilder::new().build(&pool, &constraints(250.0)).is_none());
    }

    #[test]
    fn test_low_recovery_lot_removed_when_allowed() {
        let pool = vec![
            lot("A", 100.0, 22.0, 90.0, Some(6.0)),
            lot("LOW", 100.0, 22.0, 60.0, Some(6.0)),
            lot("B", 100.0, 22.0, 90.0, Some(6.0)),
        ];
        let out = TrimBuilder::new().build(&pool, &constraints(150.0)).unwrap();
        let codes: Vec<&str> = out.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B"]);
    }

    #[test]
    fn test_excess_mass_is_cut_to_window() {
        let pool: Vec<Lot> = (0..8)
            .map(|i| lot(&format!("L{}", i), 100.0, 22.0, 90.0, Some(6.0)))
            .collect();
        let out = TrimBuilder::new().build(&pool, &constraints(250.0)).unwrap();
        let mass: f64 = out.iter().map(|l| l.dry_mass).sum();
        assert!((mass - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_enforced_reagents_skip_unknown_lots() {
        let pool = vec![
            lot("A", 150.0, 22.0, 90.0, Some(6.0)),
            lot("B", 150.0, 22.0, 90.0, None),
        ];
        assert!(TrimBuilder::new().build(&pool, &constraints(250.0)).is_none());

        let relaxed = constraints(250.0).with_reagents_enforced(false);
        assert_eq!(TrimBuilder::new().build(&pool, &relaxed).unwrap().len(), 2);
    }

    #[test]
    fn test_iterations_bounded_by_pool_size() {
        // 品位全部越界: 每次移除仍能缩小与目标的距离，直到触及干吨下限
        let pool: Vec<Lot> = (0..20)
            .map(|i| lot(&format!("G{:02}", i), 10.0, 30.0, 90.0, Some(6.0)))
            .collect();
        let c = constraints(20.0).with_window(MassWindow::new(20.0, 20.0, 550.0));

        let run = TrimBuilder::new().trim(&pool, &c);
        assert!(run.lots.is_none());
        assert_eq!(run.iterations, 18);
        assert!(run.iterations <= pool.len() + EXTRA_ITERATIONS);

        let heavy: Vec<Lot> = (0..8)
            .map(|i| lot(&format!("L{}", i), 100.0, 22.0, 90.0, Some(6.0)))
            .collect();
        let run = TrimBuilder::new().trim(&heavy, &constraints(250.0));
        assert_eq!(run.lots.map(|l| l.len()), Some(5));
        assert_eq!(run.iterations, 3);
    }

    #[test]
    fn test_removal_tie_break_prefers_less_mass_then_less_fine() {
        let a = Removal { index: 0, penalty: 1.0, mass: 50.0, fine: 10.0 };
        let b = Removal { index: 1, penalty: 1.0, mass: 40.0, fine: 99.0 };
        let c = Removal { index: 2, penalty: 1.0, mass: 40.0, fine: 5.0 };
        let best = [a, b, c].into_iter().min_by(|x, y| x.cmp_key(y)).unwrap();
        assert_eq!(best.index, 2);
    }
}
