// ==========================================
// 矿石配矿堆料系统 - 低回收率未使用批次
// ==========================================
// 职责: 基础表中回收率低于上限的批次，分档后剔除任一视图已使用者
// 红线: 报告中的批次不会出现在任何视图的任何堆中
// ==========================================

use crate::domain::{Lot, RecoveryBand, RejectRow};
use std::collections::HashSet;
use tracing::{info, instrument};

pub struct RejectClassifier {
    ceiling: f64,
}

impl RejectClassifier {
    pub fn new(ceiling: f64) -> Self {
        Self { ceiling }
    }

    /// # 参数
    /// - `base`: 区域/质量过滤后、未按回收率过滤的批次
    /// - `used`: 三个视图中所有堆使用过的批次编号
    #[instrument(skip(self, base, used), fields(base = base.len(), used = used.len()))]
    pub fn classify(&self, base: &[Lot], used: &HashSet<String>) -> Vec<RejectRow> {
        let rows: Vec<RejectRow> = base
            .iter()
            .filter(|lot| !used.contains(&lot.code))
            .filter_map(|lot| {
                RecoveryBand::classify(lot.recovery_pct, self.ceiling)
                    .map(|band| RejectRow::from_lot(lot, band))
            })
            .collect();

        info!(rejects = rows.len(), ceiling = self.ceiling, "低回收率未使用批次");
        rows
    }
}
