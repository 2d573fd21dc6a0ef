// ==========================================
// 矿石配矿堆料系统 - 引擎层
// ==========================================
// 职责: 批次准备、裁剪构建、随机贪心构建、补料、视图编排
// 红线: 引擎不做 I/O，不拼 SQL；不可行返回空结果，不报错
// ==========================================

pub mod constraints;
pub mod greedy_builder;
pub mod lot_preparation;
pub mod lot_priority;
pub mod orchestrator;
pub mod reject;
pub mod strategy;
pub mod top_up;
pub mod trim_builder;

// 重导出核心引擎
pub use constraints::PileConstraints;
pub use greedy_builder::{GreedyBuilder, GreedyOutcome, GreedySearchParams};
pub use lot_preparation::{batch_candidates, LotPreparer, PreparedPool};
pub use lot_priority::LotPrioritySorter;
pub use orchestrator::{AllocationOrchestrator, AllocationResult, ViewResult};
pub use reject::RejectClassifier;
pub use strategy::{first_success, varios_strategies, FallbackStrategy, StrategyOutcome};
pub use top_up::TopUpExtender;
pub use trim_builder::TrimBuilder;
