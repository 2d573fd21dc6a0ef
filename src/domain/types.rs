// ==========================================
// 矿石配矿堆料系统 - 领域类型定义
// ==========================================
// 职责: 堆类型、视图类型、回收率分档等枚举
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 堆类型 (Pile Type)
// ==========================================
// 序列化格式: 小写 (与结果表 pile_type 列一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PileType {
    Varios, // 全量裁剪堆（大堆）
    Batch,  // 容量受限的批次堆
}

impl PileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PileType::Varios => "varios",
            PileType::Batch => "batch",
        }
    }
}

impl fmt::Display for PileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 分配视图 (Allocation View)
// ==========================================
// 三个视图互相独立，各自持有一份批次池副本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Varios,      // 视图1: 单个 varios 堆
    BatchSeries, // 视图2: 连续 batch 堆直到余量不足
    Mixed,       // 视图3: 1 个 varios + 若干 batch
}

impl ViewKind {
    pub const ALL: [ViewKind; 3] = [ViewKind::Varios, ViewKind::BatchSeries, ViewKind::Mixed];

    /// 对应的结果表名
    pub fn table_name(&self) -> &'static str {
        match self {
            ViewKind::Varios => "res_pile_1",
            ViewKind::BatchSeries => "res_pile_2",
            ViewKind::Mixed => "res_pile_3",
        }
    }

    /// 视图序号（1/2/3）
    pub fn index(&self) -> u8 {
        match self {
            ViewKind::Varios => 1,
            ViewKind::BatchSeries => 2,
            ViewKind::Mixed => 3,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(ViewKind::Varios),
            2 => Some(ViewKind::BatchSeries),
            3 => Some(ViewKind::Mixed),
            _ => None,
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKind::Varios => write!(f, "VARIOS"),
            ViewKind::BatchSeries => write!(f, "BATCH_SERIES"),
            ViewKind::Mixed => write!(f, "MIXED"),
        }
    }
}

// ==========================================
// 回收率分档 (Recovery Band)
// ==========================================
// 仅用于低回收率未使用批次的报告
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecoveryBand {
    #[serde(rename = "80%-85%")]
    From80To85,
    #[serde(rename = "70%-80%")]
    From70To80,
    #[serde(rename = "<70%")]
    Below70,
}

impl RecoveryBand {
    /// 最高一档的上沿，报告上限不会超过该值
    pub const TOP_EDGE: f64 = 85.0;

    pub fn label(&self) -> &'static str {
        match self {
            RecoveryBand::From80To85 => "80%-85%",
            RecoveryBand::From70To80 => "70%-80%",
            RecoveryBand::Below70 => "<70%",
        }
    }

    /// 按回收率分档
    ///
    /// 仅对低于上限 `ceiling` 的回收率分档；上限及以上返回 None。
    /// `ceiling` 高于 [`Self::TOP_EDGE`] 时按 TOP_EDGE 处理
    pub fn classify(recovery_pct: f64, ceiling: f64) -> Option<Self> {
        if !recovery_pct.is_finite() || recovery_pct >= ceiling.min(Self::TOP_EDGE) {
            return None;
        }
        if recovery_pct >= 80.0 {
            Some(RecoveryBand::From80To85)
        } else if recovery_pct >= 70.0 {
            Some(RecoveryBand::From70To80)
        } else {
            Some(RecoveryBand::Below70)
        }
    }
}

impl fmt::Display for RecoveryBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
