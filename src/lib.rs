// ==========================================
// 铁路罐车检修排程系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 厂修分配与检修生命周期引擎
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 配置层 - 引擎常量与方案权重
pub mod config;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 后台服务 - 发件箱 worker
pub mod services;

// API 层 - 业务接口
pub mod api;

// 应用层 - 装配
pub mod app;

// 数据库基础设施（连接初始化/PRAGMA 统一/建库）
pub mod db;

// 日志系统
pub mod logging;

// SQL 性能埋点
pub mod perf;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{AllocationStatus, DemandStatus, Disposition, ShoppingState, WorkType};

// 领域实体
pub use domain::{
    Allocation, AllocationBatchResult, CapacityRecord, CarProfile, CostBreakdown, Demand,
    PlanMonth, ShopProfile, ShoppingEvent,
};

// 引擎
pub use engine::{
    AllocationEngine, CostEstimator, EligibilityEvaluator, ShopEvaluator, ShoppingStateMachine,
};

// API
pub use api::{AllocationApi, ApiError, CapacityApi, ShopApi, ShoppingEventApi};

// ==========================================
// 版本信息
// ==========================================

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "铁路罐车检修排程系统";
