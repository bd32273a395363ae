// ==========================================
// 铁路罐车检修排程系统 - 检修事件 API
// ==========================================
// 职责: 创建/查询检修事件, transitionShoppingEvent
// 并发: 读取 → 状态机校验 → 带版本条件提交; 冲突返回 VersionConflict,
//       调用方需重新读取后重试
// ==========================================

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::config::engine_config::EngineConfig;
use crate::domain::shopping_event::{ShoppingEvent, TransitionPayload, TransitionRequest};
use crate::domain::types::ShoppingState;
use crate::engine::shopping_fsm::ShoppingStateMachine;
use crate::repository::{AllocationRepository, ShoppingEventRepository};

/// 创建检修事件请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub car_number: String,
    #[serde(default)]
    pub classification_code: Option<String>,
    #[serde(default)]
    pub allocation_id: Option<String>,
}

pub struct ShoppingEventApi {
    event_repo: Arc<ShoppingEventRepository>,
    allocation_repo: Arc<AllocationRepository>,
    machine: ShoppingStateMachine,
    config: Arc<EngineConfig>,
}

impl ShoppingEventApi {
    pub fn new(
        event_repo: Arc<ShoppingEventRepository>,
        allocation_repo: Arc<AllocationRepository>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            event_repo,
            allocation_repo,
            machine: ShoppingStateMachine::new(config.lifecycle.clone()),
            config,
        }
    }

    /// 创建检修事件 (state=EVENT, version=0)
    pub fn create_event(&self, request: &CreateEventRequest) -> ApiResult<ShoppingEvent> {
        let car_number = request.car_number.trim();
        if car_number.is_empty() {
            return Err(ApiError::InvalidInput("车号不能为空".to_string()));
        }
        if let Some(allocation_id) = request.allocation_id.as_deref() {
            if self.allocation_repo.find_by_id(allocation_id)?.is_none() {
                return Err(ApiError::NotFound(format!("分配(id={})不存在", allocation_id)));
            }
        }

        let event = ShoppingEvent::new(
            Uuid::new_v4().to_string(),
            car_number.to_string(),
            request.classification_code.clone(),
            request.allocation_id.clone(),
            Utc::now(),
        );
        self.event_repo
            .insert(&event, self.config.outbox_max_retries)?;
        tracing::info!(event_id = %event.event_id, car_number, "检修事件已创建");
        Ok(event)
    }

    pub fn get_event(&self, event_id: &str) -> ApiResult<ShoppingEvent> {
        self.event_repo
            .find_by_id(event_id)?
            .ok_or_else(|| ApiError::NotFound(format!("检修事件(id={})不存在", event_id)))
    }

    /// 当前状态允许的目标状态
    pub fn allowed_targets(&self, event_id: &str) -> ApiResult<Vec<ShoppingState>> {
        let event = self.get_event(event_id)?;
        Ok(self.machine.allowed_targets(&event))
    }

    /// 状态转换
    ///
    /// # 参数
    /// - expected_version: 调用方读取时的版本
    /// - payload: 进入 DISPO_TO_DESTINATION 时必须带 disposition
    ///
    /// # 返回
    /// - Ok(ShoppingEvent): 转换后的事件 (version +1)
    /// - Err(VersionConflict): 版本已前进, 可重试
    /// - Err(InvalidTransition / MissingDisposition): 规则拒绝
    /// - Err(TerminalState): 致命
    #[instrument(skip(self, payload), fields(target = %target_state))]
    pub fn transition_shopping_event(
        &self,
        event_id: &str,
        target_state: ShoppingState,
        expected_version: i64,
        payload: TransitionPayload,
    ) -> ApiResult<ShoppingEvent> {
        let current = self.get_event(event_id)?;
        let request = TransitionRequest {
            target_state,
            expected_version,
            payload,
        };

        let next = match self.machine.apply(&current, &request, Utc::now()) {
            Ok(next) => next,
            Err(err) => {
                if err.is_fatal() {
                    tracing::error!(event_id, error = %err, rule = err.rule_code(), "终态事件再转换");
                } else {
                    tracing::warn!(event_id, error = %err, rule = err.rule_code(), "状态转换被拒绝");
                }
                return Err(err.into());
            }
        };

        let committed = self.event_repo.commit_transition(
            &next,
            current.state,
            expected_version,
            self.config.outbox_max_retries,
        )?;

        tracing::info!(
            event_id,
            from = %current.state,
            to = %committed.state,
            version = committed.version,
            actor = request.payload.actor.as_deref().unwrap_or("-"),
            "状态转换已提交"
        );
        Ok(committed)
    }
}
