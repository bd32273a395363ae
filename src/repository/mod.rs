// ==========================================
// 铁路罐车检修排程系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 例外: 上限检查 / 版本检查必须与写入在同一语句或事务内
// ==========================================
// 职责: 提供数据访问接口, 屏蔽数据库细节
// 约束: 所有查询使用参数化, 防止 SQL 注入
// ==========================================

pub mod allocation_repo;
pub mod capacity_repo;
pub mod demand_repo;
pub mod error;
pub mod outbox_repo;
pub mod reference_repo;
pub mod scenario_repo;
pub mod shopping_event_repo;

// 重导出核心仓储
pub use allocation_repo::AllocationRepository;
pub use capacity_repo::CapacityLedgerRepository;
pub use demand_repo::DemandRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use outbox_repo::OutboxRepository;
pub use reference_repo::ReferenceDataRepository;
pub use scenario_repo::ScenarioRepository;
pub use shopping_event_repo::ShoppingEventRepository;
