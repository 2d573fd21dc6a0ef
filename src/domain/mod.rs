// ==========================================
// 矿石配矿堆料系统 - 领域模型层
// ==========================================
// 职责: 定义批次、堆、累计量、结果行等领域实体
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod blend;
pub mod lot;
pub mod pile;
pub mod types;

// 重导出核心类型
pub use blend::{BlendTotals, TOLERANCE};
pub use lot::{Lot, RawLotRecord, GRAMS_PER_TON_PER_OZ_TC};
pub use pile::{Pile, PileBasis, PileRow, PileSummary, RejectRow};
pub use types::{PileType, RecoveryBand, ViewKind};
