// ==========================================
// 矿石配矿堆料系统 - 补料引擎
// ==========================================
// 职责: 用次级批次池逐个补入，使已接受的堆向干吨目标靠近
// 输入: 堆成员 + 次级批次池 + 获胜的堆约束
// 输出: 新补入的批次（按补入顺序）
// 红线: 只加不减；每次补入后全部硬约束仍须成立
// ==========================================

use crate::domain::{BlendTotals, Lot, TOLERANCE};
use crate::engine::constraints::PileConstraints;
use std::collections::HashSet;
use tracing::{debug, info, instrument};

// ==========================================
// TopUpExtender - 补料引擎
// ==========================================
pub struct TopUpExtender {
    // 无状态引擎
}

impl TopUpExtender {
    pub fn new() -> Self {
        Self {}
    }

    /// 爬山式补料
    ///
    /// 每轮在可容纳、品质仍合格的候选中，选加入后与目标差距最小者
    /// （差距相同取加入后干吨更大者）；差距不再缩小或已达目标即停止
    #[instrument(skip(self, members, secondary, constraints), fields(
        pile_type = %constraints.pile_type,
        members = members.len(),
        secondary = secondary.len(),
        enforce_reagents = constraints.enforce_reagents
    ))]
    pub fn extend(
        &self,
        members: &[Lot],
        secondary: &[Lot],
        constraints: &PileConstraints,
    ) -> Vec<Lot> {
        let mut used: HashSet<&str> = members.iter().map(|l| l.code.as_str()).collect();
        let mut totals = BlendTotals::from_lots(members);
        let target = constraints.window.effective_target();

        let mut added: Vec<Lot> = Vec::new();

        loop {
            if totals.dry_mass >= target - TOLERANCE {
                break;
            }

            let room = constraints.window.max - totals.dry_mass;
            let cur_gap = (target - totals.dry_mass).abs();

            let mut best: Option<(&Lot, f64, BlendTotals)> = None;
            for lot in secondary {
                if used.contains(lot.code.as_str()) || !constraints.admits_lot(lot) {
                    continue;
                }
                if lot.dry_mass > room + TOLERANCE {
                    continue;
                }

                let next = totals + BlendTotals::of_lot(lot);
                if !constraints.quality_ok(&next) {
                    continue;
                }

                let gap = (target - next.dry_mass).abs();
                if gap >= cur_gap - TOLERANCE {
                    continue;
                }

                let better = match &best {
                    None => true,
                    Some((_, best_gap, best_totals)) => {
                        gap < *best_gap
                            || (gap == *best_gap && next.dry_mass > best_totals.dry_mass)
                    }
                };
                if better {
                    best = Some((lot, gap, next));
                }
            }

            match best {
                Some((lot, gap, next)) => {
                    debug!(code = %lot.code, mass = next.dry_mass, gap, "补入批次");
                    used.insert(lot.code.as_str());
                    totals = next;
                    added.push(lot.clone());
                }
                None => break,
            }
        }

        if !added.is_empty() {
            info!(
                added = added.len(),
                mass = totals.dry_mass,
                grade = totals.grade().unwrap_or_default(),
                recovery = totals.recovery().unwrap_or_default(),
                "补料完成"
            );
        }
        added
    }
}

impl Default for TopUpExtender {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GradeBand, SolverConfig};

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

    fn varios(enforce: bool) -> PileConstraints {
        PileConstraints::for_varios(&SolverConfig::default(), GradeBand::new(20.0, 24.0), enforce)
    }

    #[test]
    fn test_closest_to_target_is_added_first() {
        let members = vec![lot("M", 400.0, 22.0, 95.0, Some(6.0))];
        let secondary = vec![
            lot("S1", 50.0, 22.0, 82.0, Some(6.0)),
            lot("S2", 140.0, 22.0, 82.0, Some(6.0)),
            lot("S3", 200.0, 22.0, 82.0, Some(6.0)),
        ];

        let added = TopUpExtender::new().extend(&members, &secondary, &varios(true));
        let codes: Vec<&str> = added.iter().map(|l| l.code.as_str()).collect();
        // 400 + 140 = 540 最接近 550；S3 超上限；S1 再加超上限
        assert_eq!(codes, vec!["S2"]);
    }

    #[test]
    fn test_recovery_floor_blocks_additions() {
        let members = vec![lot("M", 300.0, 22.0, 86.0, Some(6.0))];
        let secondary = vec![lot("S1", 100.0, 22.0, 70.0, Some(6.0))];
        let added = TopUpExtender::new().extend(&members, &secondary, &varios(true));
        assert!(added.is_empty());
    }

    #[test]
    fn test_unknown_reagents_only_when_relaxed() {
        let members = vec![lot("M", 300.0, 22.0, 95.0, Some(6.0))];
        let secondary = vec![lot("S1", 100.0, 22.0, 84.0, None)];

        assert!(TopUpExtender::new()
            .extend(&members, &secondary, &varios(true))
            .is_empty());
        assert_eq!(
            TopUpExtender::new()
                .extend(&members, &secondary, &varios(false))
                .len(),
            1
        );
    }

    #[test]
    fn test_used_codes_are_skipped_and_ties_prefer_larger_mass() {
        let members = vec![lot("M", 450.0, 22.0, 95.0, Some(6.0))];
        let secondary = vec![
            lot("M", 100.0, 22.0, 95.0, Some(6.0)),
            lot("S1", 90.0, 22.0, 90.0, Some(6.0)),
            lot("S2", 90.0, 22.0, 90.0, Some(6.0)),
            lot("S3", 10.0, 22.0, 90.0, Some(6.0)),
        ];
        let added = TopUpExtender::new().extend(&members, &secondary, &varios(true));
        let codes: Vec<&str> = added.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, vec!["S1", "S3"]);
    }
}
