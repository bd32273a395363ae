// ==========================================
// 铁路罐车检修排程系统 - 分配结果领域模型
// ==========================================
// 红线: 成本快照创建后不可重算 (保证方案间历史可比)
// ==========================================

use crate::domain::capacity::PlanMonth;
use crate::domain::cost::{round_currency, CostBreakdown};
use crate::domain::types::AllocationStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// Allocation - 单车分配
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub allocation_id: String,
    pub run_id: String,
    pub demand_id: String,
    pub scenario_id: String,
    pub car_number: Option<String>,  // 绑定实车前为空
    pub shop_code: String,
    pub is_preferred_network: bool,
    pub target_month: PlanMonth,
    pub cost: CostBreakdown,         // 不可变成本快照
    pub score: f64,
    pub rank: usize,                 // 在该需求中的排名 (从 1 开始)
    pub status: AllocationStatus,
    pub created_at: DateTime<Utc>,
}

// ==========================================
// AllocationWarning - 可恢复的批次级问题
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    DemandNotFound,      // 需求 ID 无法解析
    DemandNotPending,    // 需求已被消费
    DuplicateDemand,     // 同一批次重复列出的需求
    ScenarioFallback,    // 指定方案无效, 回退默认
    NoEligibleShop,      // 无准入且有产能的厂修
    ResidualDemand,      // 产能不足, 有残量
    CommitRejected,      // 提交阶段实时预留被拒
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WarningCode::DemandNotFound => "DEMAND_NOT_FOUND",
            WarningCode::DemandNotPending => "DEMAND_NOT_PENDING",
            WarningCode::DuplicateDemand => "DUPLICATE_DEMAND",
            WarningCode::ScenarioFallback => "SCENARIO_FALLBACK",
            WarningCode::NoEligibleShop => "NO_ELIGIBLE_SHOP",
            WarningCode::ResidualDemand => "RESIDUAL_DEMAND",
            WarningCode::CommitRejected => "COMMIT_REJECTED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationWarning {
    pub demand_id: Option<String>,
    pub code: WarningCode,
    pub message: String,
}

impl AllocationWarning {
    pub fn new(demand_id: Option<&str>, code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            demand_id: demand_id.map(str::to_string),
            code,
            message: message.into(),
        }
    }
}

// ==========================================
// AllocationSummary - 批次汇总
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationSummary {
    pub total_cars: i64,
    pub total_cost: f64,
    pub avg_cost: f64,
    pub preferred_network_cost: f64,
    pub non_preferred_network_cost: f64,
    pub unallocated_cars: i64,
}

impl AllocationSummary {
    /// 由分配列表与未分配车数汇总
    pub fn from_allocations(allocations: &[Allocation], unallocated_cars: i64) -> Self {
        let mut total_cost = 0.0;
        let mut preferred = 0.0;
        let mut non_preferred = 0.0;
        for allocation in allocations {
            total_cost += allocation.cost.total_cost;
            if allocation.is_preferred_network {
                preferred += allocation.cost.total_cost;
            } else {
                non_preferred += allocation.cost.total_cost;
            }
        }
        let total_cars = allocations.len() as i64;
        let avg_cost = if total_cars > 0 {
            total_cost / total_cars as f64
        } else {
            0.0
        };

        Self {
            total_cars,
            total_cost: round_currency(total_cost),
            avg_cost: round_currency(avg_cost),
            preferred_network_cost: round_currency(preferred),
            non_preferred_network_cost: round_currency(non_preferred),
            unallocated_cars,
        }
    }
}

// ==========================================
// AllocationBatchResult - 分配运行结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationBatchResult {
    pub run_id: String,
    pub scenario_id: String,
    pub preview_only: bool,
    pub allocations: Vec<Allocation>,
    pub summary: AllocationSummary,
    pub warnings: Vec<AllocationWarning>,
}
