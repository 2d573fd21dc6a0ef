// ==========================================
// 矿石配矿堆料系统 - 批次优先级排序
// ==========================================
// 职责: batch 构建前的扫描顺序
// 排序键: 低回收率批次在后 → 回收率降序 → 干吨降序
// 红线: 只影响候选抽样顺序，不影响可行性
// ==========================================

use crate::domain::Lot;
use std::cmp::Ordering;

pub struct LotPrioritySorter {
    /// 低于该回收率的批次排在最后
    rec_floor: f64,
}

impl LotPrioritySorter {
    pub fn new(rec_floor: f64) -> Self {
        Self { rec_floor }
    }

    /// 与稳定排序配合使用，键相同时保持输入顺序
    pub fn compare(&self, a: &Lot, b: &Lot) -> Ordering {
        let low_a = a.recovery_pct < self.rec_floor;
        let low_b = b.recovery_pct < self.rec_floor;

        low_a
            .cmp(&low_b)
            .then_with(|| b.recovery_pct.total_cmp(&a.recovery_pct))
            .then_with(|| b.dry_mass.total_cmp(&a.dry_mass))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(code: &str, mass: f64, rec: f64) -> Lot {
        Lot {
            code: code.to_string(),
            zone: None,
            wet_mass: None,
            moisture_pct: None,
            dry_mass: mass,
            effective_mass: mass,
            grade_oz_tc: None,
            grade: 30.0,
            fine_content: 30.0 * mass,
            ag_grade_oz_tc: None,
            ag_grade: None,
            ag_fine_content: None,
            impurity_pct: None,
            reagent_a: None,
            reagent_b: None,
            recovery_pct: rec,
            loaded_at: None,
        }
    }

    #[test]
    fn test_low_recovery_last_then_rec_then_mass() {
        let sorter = LotPrioritySorter::new(85.0);
        let mut lots = vec![
            lot("LOW", 100.0, 70.0),
            lot("A", 20.0, 90.0),
            lot("B", 50.0, 90.0),
            lot("C", 10.0, 95.0),
        ];
        lots.sort_by(|a, b| sorter.compare(a, b));
        let codes: Vec<&str> = lots.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, vec!["C", "B", "A", "LOW"]);
    }
}
