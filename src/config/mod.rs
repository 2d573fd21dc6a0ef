// ==========================================
// 矿石配矿堆料系统 - 配置层
// ==========================================
// 职责: 调用方覆写 + 默认值 → 已校验的求解配置
// 来源: JSON 文本 / JSON 文件 / 代码直接构造
// ==========================================

pub mod config_resolver;
pub mod error;
pub mod solver_config;

// 重导出核心配置类型
pub use config_resolver::{config_keys, ConfigResolver};
pub use error::{ConfigError, ConfigResult};
pub use solver_config::{
    AdmissionFloor, BatchConfig, GradeBand, GradeEdgePolicy, LotFilterConfig, MassWindow,
    ReagentBand, SearchKnobs, Seeds, SolverConfig, VariosConfig,
};
