// ==========================================
// 铁路罐车检修排程系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、值对象
// 红线: 不含数据访问逻辑, 不含引擎逻辑
// ==========================================

pub mod allocation;
pub mod capacity;
pub mod car;
pub mod cost;
pub mod demand;
pub mod outbox;
pub mod rule;
pub mod shop;
pub mod shopping_event;
pub mod types;

// 重导出核心类型
pub use allocation::{
    Allocation, AllocationBatchResult, AllocationSummary, AllocationWarning, WarningCode,
};
pub use capacity::{overcommit_ceiling, CapacityConstraint, CapacityRecord, PlanMonth, ReserveOutcome};
pub use car::{
    required_work_types, CarAttribute, CarFlag, CarProfile, Commodity, CommodityCatalog,
    ShoppingOverrides,
};
pub use cost::{round_currency, CostBreakdown, LaborLine};
pub use demand::Demand;
pub use outbox::{OutboxEvent, OutboxEventType, OutboxStatus};
pub use rule::{EligibilityRule, EligibilityVerdict, RuleCondition, RuleResult};
pub use shop::{ShopCapabilities, ShopProfile};
pub use shopping_event::{ShoppingEvent, TransitionPayload, TransitionRequest};
pub use types::{
    AllocationStatus, CleaningClass, DemandStatus, Disposition, RuleOutcome, ShoppingState,
    WorkType,
};
