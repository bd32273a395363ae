// ==========================================
// 铁路罐车检修排程系统 - 配置层
// ==========================================
// 职责: 引擎常量与方案权重的管理
// 存储: config_kv 表 (引擎配置), scenario 表 (方案)
// ==========================================

pub mod config_manager;
pub mod engine_config;
pub mod scenario_profile;

// 重导出核心配置类型
pub use config_manager::{config_keys, ConfigManager};
pub use engine_config::{
    CapacityConfig, CleaningClassFactors, CostConfig, EngineConfig, FreightConfig,
    LifecycleConfig, NormalizationBounds, RegionDistance, RegionFlatRate, ScoringConfig,
    ENGINE_CONFIG_VERSION,
};
pub use scenario_profile::ScenarioWeights;
