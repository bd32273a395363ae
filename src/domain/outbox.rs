// ==========================================
// 铁路罐车检修排程系统 - 发件箱领域模型
// ==========================================
// 用途: 非阻塞副作用 (审计/镜像/通知) 与主操作同事务入队,
//       由独立的重试 worker 执行
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxEventType {
    AllocationCommitted,       // 分配已落库
    AllocationStatusChanged,   // 分配浅层状态变更
    ShoppingEventCreated,      // 检修事件创建
    ShoppingEventTransitioned, // 检修事件状态转换
}

impl OutboxEventType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            OutboxEventType::AllocationCommitted => "ALLOCATION_COMMITTED",
            OutboxEventType::AllocationStatusChanged => "ALLOCATION_STATUS_CHANGED",
            OutboxEventType::ShoppingEventCreated => "SHOPPING_EVENT_CREATED",
            OutboxEventType::ShoppingEventTransitioned => "SHOPPING_EVENT_TRANSITIONED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ALLOCATION_COMMITTED" => Some(OutboxEventType::AllocationCommitted),
            "ALLOCATION_STATUS_CHANGED" => Some(OutboxEventType::AllocationStatusChanged),
            "SHOPPING_EVENT_CREATED" => Some(OutboxEventType::ShoppingEventCreated),
            "SHOPPING_EVENT_TRANSITIONED" => Some(OutboxEventType::ShoppingEventTransitioned),
            _ => None,
        }
    }
}

impl fmt::Display for OutboxEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending, // 待处理 (含可重试的失败)
    Done,    // 已处理
    Failed,  // 超过重试上限 (死信)
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Done => "DONE",
            OutboxStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "DONE" => OutboxStatus::Done,
            "FAILED" => OutboxStatus::Failed,
            _ => OutboxStatus::Pending,
        }
    }
}

// ==========================================
// OutboxEvent - 发件箱记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub event_id: String,
    pub event_type: OutboxEventType,
    pub aggregate_id: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn new(
        event_type: OutboxEventType,
        aggregate_id: impl Into<String>,
        payload: serde_json::Value,
        max_retries: i32,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type,
            aggregate_id: aggregate_id.into(),
            payload,
            status: OutboxStatus::Pending,
            retry_count: 0,
            max_retries,
            last_error: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }
}
