// ==========================================
// 铁路罐车检修排程系统 - 检修事件领域模型
// ==========================================
// 红线: state 只能经由状态机转换修改
// 红线: 只做逻辑终结 (CLOSED / CANCELLED), 从不删除
// ==========================================

use crate::domain::types::{Disposition, ShoppingState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// ShoppingEvent - 检修事件
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingEvent {
    pub event_id: String,
    pub car_number: String,
    pub state: ShoppingState,
    pub state_timestamps: BTreeMap<ShoppingState, DateTime<Utc>>, // 各状态首次到达时间
    pub disposition: Option<Disposition>,
    pub classification_code: Option<String>, // 用于小修例外 (MRU)
    pub allocation_id: Option<String>,       // 关联的分配 (可选)
    pub version: i64,                        // 乐观锁版本
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShoppingEvent {
    /// 创建初始事件 (state=EVENT, version=0)
    pub fn new(
        event_id: String,
        car_number: String,
        classification_code: Option<String>,
        allocation_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut state_timestamps = BTreeMap::new();
        state_timestamps.insert(ShoppingState::Event, now);
        Self {
            event_id,
            car_number,
            state: ShoppingState::Event,
            state_timestamps,
            disposition: None,
            classification_code,
            allocation_id,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// 某状态首次到达时间
    pub fn reached_at(&self, state: ShoppingState) -> Option<DateTime<Utc>> {
        self.state_timestamps.get(&state).copied()
    }
}

// ==========================================
// TransitionRequest - 状态转换请求
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub target_state: ShoppingState,
    pub expected_version: i64,
    #[serde(default)]
    pub payload: TransitionPayload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionPayload {
    #[serde(default)]
    pub disposition: Option<Disposition>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}
