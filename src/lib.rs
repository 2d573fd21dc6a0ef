// ==========================================
// 矿石配矿堆料系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 日批次 → 三种堆料分配视图（单 varios / batch 序列 / 混合）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 批次、堆、汇总
pub mod domain;

// 配置层 - 求解参数与覆盖解析
pub mod config;

// 引擎层 - 构建与编排
pub mod engine;

// 导入层 - 外部批次表
pub mod importer;

// 数据仓储层 - 暂存表、结果表、CSV 导出
pub mod repository;

// 数据库基础设施（连接初始化/建表）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{PileType, RecoveryBand, ViewKind};

// 领域实体
pub use domain::{
    BlendTotals, Lot, Pile, PileBasis, PileRow, PileSummary, RawLotRecord, RejectRow,
};

// 配置
pub use config::{ConfigError, ConfigResolver, SolverConfig};

// 引擎
pub use engine::{
    AllocationOrchestrator, AllocationResult, GreedyBuilder, LotPreparer, TopUpExtender,
    TrimBuilder, ViewResult,
};

// 导入 / 仓储
pub use importer::{ImportError, LotImporter};
pub use repository::{LotRepository, RepositoryError, ResultRepository};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "矿石配矿堆料系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert!(!APP_NAME.is_empty());
    }
}
