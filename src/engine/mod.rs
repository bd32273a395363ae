// ==========================================
// 铁路罐车检修排程系统 - 引擎层
// ==========================================
// 职责: 准入评估、成本估算、评分排名、分配、检修生命周期
// 红线: Engine 不拼 SQL, 所有规则结果必须带原因
// ==========================================

pub mod allocation;
pub mod cost_estimator;
pub mod eligibility;
pub mod events;
pub mod repositories;
pub mod scoring;
pub mod shop_evaluation;
pub mod shopping_fsm;

// 重导出核心引擎
pub use allocation::{AllocationEngine, CapacitySnapshot, DemandPlan, DemandPlanner};
pub use cost_estimator::{CostEstimator, DistanceProvider, FreightError, RegionDistanceTable};
pub use eligibility::EligibilityEvaluator;
pub use events::{
    LoggingSideEffectHandler, CompositeSideEffectHandler, NoOpSideEffectHandler,
    SideEffectError, SideEffectHandler,
};
pub use repositories::AllocationRepositories;
pub use scoring::{normalize, rank_by_score, ScoreBreakdown, ShopScorer, NEUTRAL_SCORE};
pub use shop_evaluation::{EvaluationResult, ShopEvaluator};
pub use shopping_fsm::{ShoppingStateMachine, TransitionError};
