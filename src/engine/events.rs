// ==========================================
// 铁路罐车检修排程系统 - 发件箱副作用处理
// ==========================================
// 职责: 定义副作用处理 trait, 由发件箱 worker 调用
// 说明: 主操作只负责入队, 审计/镜像/通知在此执行
// 红线: 处理失败不影响主操作, 只累加重试次数
// ==========================================

use crate::domain::outbox::OutboxEvent;
use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;

pub type SideEffectError = Box<dyn Error + Send + Sync>;

/// 发件箱副作用处理者
///
/// # 返回
/// - `Ok(())`: 处理完成, 事件标记 DONE
/// - `Err`: 处理失败, 事件重试计数 +1, 达到上限后进入死信
#[async_trait]
pub trait SideEffectHandler: Send + Sync {
    async fn handle(&self, event: &OutboxEvent) -> Result<(), SideEffectError>;
}

/// 空操作处理者 (单元测试 / 未接入下游时)
#[derive(Debug, Clone, Default)]
pub struct NoOpSideEffectHandler;

#[async_trait]
impl SideEffectHandler for NoOpSideEffectHandler {
    async fn handle(&self, event: &OutboxEvent) -> Result<(), SideEffectError> {
        tracing::debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            "NoOpSideEffectHandler: 跳过副作用"
        );
        Ok(())
    }
}

/// 日志处理者: 把事件写入 tracing 的 "audit" target
#[derive(Debug, Clone, Default)]
pub struct LoggingSideEffectHandler;

#[async_trait]
impl SideEffectHandler for LoggingSideEffectHandler {
    async fn handle(&self, event: &OutboxEvent) -> Result<(), SideEffectError> {
        tracing::info!(
            target: "audit",
            event_id = %event.event_id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            retry_count = event.retry_count,
            payload = %event.payload,
            "副作用事件"
        );
        Ok(())
    }
}

/// 组合处理者: 依次调用, 任一失败即整体失败
pub struct CompositeSideEffectHandler {
    handlers: Vec<Arc<dyn SideEffectHandler>>,
}

impl CompositeSideEffectHandler {
    pub fn new(handlers: Vec<Arc<dyn SideEffectHandler>>) -> Self {
        Self { handlers }
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl SideEffectHandler for CompositeSideEffectHandler {
    async fn handle(&self, event: &OutboxEvent) -> Result<(), SideEffectError> {
        for handler in &self.handlers {
            handler.handle(event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outbox::OutboxEventType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    #[async_trait]
    impl SideEffectHandler for Counting {
        async fn handle(&self, _event: &OutboxEvent) -> Result<(), SideEffectError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl SideEffectHandler for Failing {
        async fn handle(&self, _event: &OutboxEvent) -> Result<(), SideEffectError> {
            Err("下游不可用".into())
        }
    }

    fn event() -> OutboxEvent {
        OutboxEvent::new(
            OutboxEventType::AllocationCommitted,
            "A1",
            serde_json::json!({"shop_code": "S1"}),
            3,
        )
    }

    #[tokio::test]
    async fn test_noop_and_audit_handlers_succeed() {
        assert!(NoOpSideEffectHandler.handle(&event()).await.is_ok());
        assert!(LoggingSideEffectHandler.handle(&event()).await.is_ok());
    }

    #[tokio::test]
    async fn test_composite_stops_at_first_failure() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let composite = CompositeSideEffectHandler::new(vec![
            counter.clone() as Arc<dyn SideEffectHandler>,
            Arc::new(Failing),
            counter.clone() as Arc<dyn SideEffectHandler>,
        ]);
        assert!(composite.handle(&event()).await.is_err());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
