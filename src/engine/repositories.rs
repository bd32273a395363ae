// ==========================================
// 铁路罐车检修排程系统 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合分配引擎所需的全部 Repository, 简化依赖注入
// ==========================================

use std::sync::Arc;

use crate::repository::{
    AllocationRepository, CapacityLedgerRepository, DemandRepository, ReferenceDataRepository,
    ScenarioRepository,
};

/// 分配引擎仓储集合
#[derive(Clone)]
pub struct AllocationRepositories {
    /// 参考数据 (车辆/厂修/规则/货物)
    pub reference_repo: Arc<ReferenceDataRepository>,
    /// 检修需求
    pub demand_repo: Arc<DemandRepository>,
    /// 方案权重
    pub scenario_repo: Arc<ScenarioRepository>,
    /// 产能台账
    pub capacity_repo: Arc<CapacityLedgerRepository>,
    /// 分配结果
    pub allocation_repo: Arc<AllocationRepository>,
}

impl AllocationRepositories {
    pub fn new(
        reference_repo: Arc<ReferenceDataRepository>,
        demand_repo: Arc<DemandRepository>,
        scenario_repo: Arc<ScenarioRepository>,
        capacity_repo: Arc<CapacityLedgerRepository>,
        allocation_repo: Arc<AllocationRepository>,
    ) -> Self {
        Self {
            reference_repo,
            demand_repo,
            scenario_repo,
            capacity_repo,
            allocation_repo,
        }
    }
}
