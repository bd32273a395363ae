// ==========================================
// 铁路罐车检修排程系统 - 后台服务层
// ==========================================

pub mod outbox_worker;

pub use outbox_worker::{DrainStats, OutboxWorker, DEFAULT_BATCH_SIZE};
