// ==========================================
// 铁路罐车检修排程系统 - 引擎配置
// ==========================================
// 职责: 工时表/材料表/归一化边界/超额比例等常量的唯一来源
// 存储: config_kv('global', 'engine_config') JSON
// ==========================================
// 说明: 配置对象带版本号, 方案对比时可引用不同版本
// ==========================================

use crate::config::scenario_profile::ScenarioWeights;
use crate::domain::types::{CleaningClass, WorkType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 当前配置结构版本
pub const ENGINE_CONFIG_VERSION: u32 = 1;

// ==========================================
// EngineConfig - 引擎配置根对象
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default)]
    pub cost: CostConfig,
    #[serde(default)]
    pub freight: FreightConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub capacity: CapacityConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default = "default_outbox_max_retries")]
    pub outbox_max_retries: i32,
    #[serde(default)]
    pub default_scenario: ScenarioWeights,
}

fn default_config_version() -> u32 {
    ENGINE_CONFIG_VERSION
}

fn default_outbox_max_retries() -> i32 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            config_version: ENGINE_CONFIG_VERSION,
            cost: CostConfig::default(),
            freight: FreightConfig::default(),
            scoring: ScoringConfig::default(),
            capacity: CapacityConfig::default(),
            lifecycle: LifecycleConfig::default(),
            outbox_max_retries: default_outbox_max_retries(),
            default_scenario: ScenarioWeights::default(),
        }
    }
}

// ==========================================
// CostConfig - 成本估算常量
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub labor_hours: BTreeMap<WorkType, f64>,        // 标准工时
    pub min_billable_hours: BTreeMap<WorkType, f64>, // 最低计费工时
    pub cleaning_class_factors: CleaningClassFactors,
    pub default_cleaning_price: f64,
    pub lining_unit_costs: BTreeMap<String, f64>,    // 内衬类型 → 单价
    pub default_lining_unit_cost: f64,
    pub flat_material_costs: BTreeMap<WorkType, f64>,
    pub default_flat_material_cost: f64,
    pub kosher_premium: f64,
    pub abatement_cost: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        let labor_hours = BTreeMap::from([
            (WorkType::Cleaning, 8.0),
            (WorkType::Blast, 16.0),
            (WorkType::Lining, 24.0),
            (WorkType::Paint, 12.0),
        ]);
        let min_billable_hours = BTreeMap::from([
            (WorkType::Cleaning, 4.0),
            (WorkType::Blast, 8.0),
            (WorkType::Lining, 12.0),
            (WorkType::Paint, 6.0),
        ]);
        let lining_unit_costs = BTreeMap::from([
            ("EPOXY".to_string(), 3500.0),
            ("PHENOLIC".to_string(), 4200.0),
            ("RUBBER".to_string(), 6000.0),
            ("GLASS".to_string(), 7500.0),
        ]);
        let flat_material_costs = BTreeMap::from([
            (WorkType::Blast, 800.0),
            (WorkType::Paint, 1200.0),
        ]);

        Self {
            labor_hours,
            min_billable_hours,
            cleaning_class_factors: CleaningClassFactors::default(),
            default_cleaning_price: 450.0,
            lining_unit_costs,
            default_lining_unit_cost: 3000.0,
            flat_material_costs,
            default_flat_material_cost: 500.0,
            kosher_premium: 750.0,
            abatement_cost: 15000.0,
        }
    }
}

impl CostConfig {
    pub fn hours_for(&self, work_type: WorkType) -> f64 {
        self.labor_hours.get(&work_type).copied().unwrap_or(0.0)
    }

    pub fn min_hours_for(&self, work_type: WorkType) -> f64 {
        self.min_billable_hours.get(&work_type).copied().unwrap_or(0.0)
    }
}

/// 清洗等级系数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningClassFactors {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Default for CleaningClassFactors {
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 1.25,
            c: 1.5,
            d: 2.0,
        }
    }
}

impl CleaningClassFactors {
    pub fn factor(&self, class: CleaningClass) -> f64 {
        match class {
            CleaningClass::A => self.a,
            CleaningClass::B => self.b,
            CleaningClass::C => self.c,
            CleaningClass::D => self.d,
        }
    }
}

// ==========================================
// FreightConfig - 运费常量
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreightConfig {
    pub rate_per_mile: f64,
    pub same_region_miles: f64,
    pub region_distances: Vec<RegionDistance>, // 双向查找
    pub flat_rates: Vec<RegionFlatRate>,       // 距离计算失败时的回退
    pub default_freight: f64,                  // 最终回退值
}

impl Default for FreightConfig {
    fn default() -> Self {
        Self {
            rate_per_mile: 3.25,
            same_region_miles: 150.0,
            region_distances: Vec::new(),
            flat_rates: Vec::new(),
            default_freight: 1500.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDistance {
    pub from_region: String,
    pub to_region: String,
    pub miles: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionFlatRate {
    pub from_region: String,
    pub to_region: String,
    pub amount: f64,
}

// ==========================================
// ScoringConfig - 评分常量
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub cost_bounds: NormalizationBounds,
    pub backlog_bounds: NormalizationBounds,
    pub preferred_network_score: f64,
    pub non_preferred_network_score: f64,
    pub default_quality_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            cost_bounds: NormalizationBounds {
                min: 1000.0,
                max: 40000.0,
            },
            backlog_bounds: NormalizationBounds {
                min: 0.0,
                max: 2000.0,
            },
            preferred_network_score: 100.0,
            non_preferred_network_score: 25.0,
            default_quality_score: 50.0,
        }
    }
}

/// 线性归一化边界
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationBounds {
    pub min: f64,
    pub max: f64,
}

// ==========================================
// CapacityConfig - 产能台账常量
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub overcommit_percent: u32,
    pub overcommit_percent_by_shop: BTreeMap<String, u32>,
    pub default_shop_capacity: i64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            overcommit_percent: 10,
            overcommit_percent_by_shop: BTreeMap::new(),
            default_shop_capacity: 50,
        }
    }
}

impl CapacityConfig {
    /// 解析厂修的超额比例 (按厂覆写优先)
    pub fn overcommit_percent_for(&self, shop_code: &str) -> u32 {
        self.overcommit_percent_by_shop
            .get(shop_code)
            .copied()
            .unwrap_or(self.overcommit_percent)
    }
}

// ==========================================
// LifecycleConfig - 生命周期常量
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub minor_repair_classification_codes: Vec<String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            minor_repair_classification_codes: vec!["MRU".to_string()],
        }
    }
}

impl LifecycleConfig {
    pub fn is_minor_repair(&self, classification_code: Option<&str>) -> bool {
        match classification_code.map(str::trim) {
            Some(code) if !code.is_empty() => self
                .minor_repair_classification_codes
                .iter()
                .any(|c| c.eq_ignore_ascii_case(code)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{"capacity":{"overcommit_percent":20}}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.config_version, ENGINE_CONFIG_VERSION);
        assert_eq!(config.capacity.overcommit_percent, 20);
        assert_eq!(config.capacity.default_shop_capacity, 50);
        assert_eq!(config.cost.hours_for(WorkType::Lining), 24.0);
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_overcommit_override_per_shop() {
        let mut capacity = CapacityConfig::default();
        capacity.overcommit_percent_by_shop.insert("S9".to_string(), 0);
        assert_eq!(capacity.overcommit_percent_for("S9"), 0);
        assert_eq!(capacity.overcommit_percent_for("S1"), 10);
    }

    #[test]
    fn test_minor_repair_classification() {
        let lifecycle = LifecycleConfig::default();
        assert!(lifecycle.is_minor_repair(Some("mru")));
        assert!(!lifecycle.is_minor_repair(Some("HEAVY")));
        assert!(!lifecycle.is_minor_repair(None));
    }
}
