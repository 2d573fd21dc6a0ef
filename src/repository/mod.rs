// ==========================================
// 矿石配矿堆料系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 约束: 所有查询值使用参数化（表名只来自 ViewKind 常量）
// ==========================================

pub mod csv_export;
pub mod error;
pub mod lot_repo;
pub mod result_repo;

// 重导出核心仓储
pub use csv_export::{export_result, write_pile_rows, write_reject_rows, write_table};
pub use error::{RepositoryError, RepositoryResult};
pub use lot_repo::LotRepository;
pub use result_repo::{ResultRepository, SolveRun, INSERT_CHUNK_ROWS};
