// ==========================================
// 铁路罐车检修排程系统 - 分配 API
// ==========================================
// 职责: generateAllocations, 分配完工/取消, 分配查询
// ==========================================

use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::config::engine_config::EngineConfig;
use crate::domain::allocation::{Allocation, AllocationBatchResult};
use crate::engine::allocation::AllocationEngine;
use crate::engine::repositories::AllocationRepositories;
use crate::repository::AllocationRepository;

pub struct AllocationApi {
    engine: AllocationEngine,
    allocation_repo: Arc<AllocationRepository>,
    config: Arc<EngineConfig>,
}

impl AllocationApi {
    pub fn new(repos: AllocationRepositories, config: Arc<EngineConfig>) -> Self {
        let allocation_repo = repos.allocation_repo.clone();
        Self {
            engine: AllocationEngine::new(repos, config.as_ref().clone()),
            allocation_repo,
            config,
        }
    }

    /// 生成分配
    ///
    /// # 参数
    /// - demand_ids: 需求 ID 列表 (不能为空)
    /// - scenario_id: 方案 ID (可选, 无效时回退默认并给出警告)
    /// - preview_only: 预览模式不落库
    pub fn generate_allocations(
        &self,
        demand_ids: &[String],
        scenario_id: Option<&str>,
        preview_only: bool,
    ) -> ApiResult<AllocationBatchResult> {
        if demand_ids.is_empty() {
            return Err(ApiError::InvalidInput("需求列表不能为空".to_string()));
        }
        Ok(self
            .engine
            .generate_allocations(demand_ids, scenario_id, preview_only)?)
    }

    pub fn get_allocation(&self, allocation_id: &str) -> ApiResult<Allocation> {
        self.allocation_repo
            .find_by_id(allocation_id)?
            .ok_or_else(|| ApiError::NotFound(format!("分配(id={})不存在", allocation_id)))
    }

    pub fn list_by_run(&self, run_id: &str) -> ApiResult<Vec<Allocation>> {
        Ok(self.allocation_repo.list_by_run(run_id)?)
    }

    /// 分配完工 (PLANNED → COMPLETED), 释放一个槽位
    pub fn complete_allocation(&self, allocation_id: &str) -> ApiResult<Allocation> {
        Ok(self
            .allocation_repo
            .complete(allocation_id, self.config.outbox_max_retries)?)
    }

    /// 分配取消 (PLANNED → CANCELLED), 撤销一个槽位
    pub fn cancel_allocation(&self, allocation_id: &str) -> ApiResult<Allocation> {
        Ok(self
            .allocation_repo
            .cancel(allocation_id, self.config.outbox_max_retries)?)
    }
}
