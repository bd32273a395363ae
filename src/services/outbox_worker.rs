// ==========================================
// 铁路罐车检修排程系统 - 发件箱重试 worker
// ==========================================
// 职责: 批量取出 PENDING 事件, 调用副作用处理者
// 成功 → DONE; 失败 → retry_count+1, 达到上限 → FAILED (死信)
// 红线: 处理失败绝不回滚主操作
// ==========================================

use crate::domain::outbox::OutboxStatus;
use crate::engine::events::SideEffectHandler;
use crate::repository::error::RepositoryResult;
use crate::repository::OutboxRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// 默认批量大小
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// 单轮处理统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainStats {
    pub processed: usize, // 成功处理
    pub retried: usize, // 失败但仍可重试
    pub dead_lettered: usize, // 进入死信
}

impl DrainStats {
    pub fn total(&self) -> usize {
        self.processed + self.retried + self.dead_lettered
    }
}

pub struct OutboxWorker {
    repo: Arc<OutboxRepository>,
    handler: Arc<dyn SideEffectHandler>,
    batch_size: usize,
}

impl OutboxWorker {
    pub fn new(repo: Arc<OutboxRepository>, handler: Arc<dyn SideEffectHandler>) -> Self {
        Self {
            repo,
            handler,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// 处理一批待处理事件 (最早入队优先)
    ///
    /// # 返回
    /// - Ok(DrainStats): 本轮统计
    /// - Err: 发件箱读写失败 (处理者失败不算错误)
    pub async fn drain_once(&self) -> RepositoryResult<DrainStats> {
        let events = self.repo.list_pending(self.batch_size)?;
        let mut stats = DrainStats::default();

        for event in events {
            match self.handler.handle(&event).await {
                Ok(()) => {
                    self.repo.mark_done(&event.event_id)?;
                    stats.processed += 1;
                }
                Err(err) => {
                    let message = err.to_string();
                    match self.repo.mark_failed_attempt(&event.event_id, &message)? {
                        OutboxStatus::Failed => {
                            tracing::error!(
                                event_id = %event.event_id,
                                event_type = %event.event_type,
                                error = %message,
                                "副作用超过重试上限, 进入死信"
                            );
                            stats.dead_lettered += 1;
                        }
                        _ => {
                            tracing::warn!(
                                event_id = %event.event_id,
                                event_type = %event.event_type,
                                retry_count = event.retry_count + 1,
                                error = %message,
                                "副作用处理失败, 等待重试"
                            );
                            stats.retried += 1;
                        }
                    }
                }
            }
        }

        if stats.total() > 0 {
            tracing::info!(
                processed = stats.processed,
                retried = stats.retried,
                dead_lettered = stats.dead_lettered,
                "发件箱本轮处理完成"
            );
        }
        Ok(stats)
    }

    /// 周期运行直到收到停止信号
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        tracing::info!(interval_ms = interval.as_millis() as u64, "发件箱 worker 启动");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.drain_once().await {
                        tracing::error!(error = %err, "发件箱处理失败");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("发件箱 worker 停止");
    }
}
