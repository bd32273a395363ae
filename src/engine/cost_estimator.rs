// ==========================================
// 铁路罐车检修排程系统 - 成本估算器
// ==========================================
// 红线: 确定性 (无随机、无时间依赖), 相同输入 → 相同输出
// 红线: 子计算失败一律降级 (回退值), 不向上传播
// ==========================================
// 分量:
// - 工时: Σ max(标准工时, 最低计费工时) × 厂修单价
// - 材料: 清洗(货物价 × 等级系数) / 内衬(类型单价) / 其他(固定价), 均 × 厂修材料系数
//         + 犹太洁食清洗溢价
// - 石棉处理: 固定金额
// - 运费: 距离 × 每英里单价 → 区域固定运费 → 默认运费
// ==========================================

use crate::config::engine_config::{CostConfig, FreightConfig};
use crate::domain::car::{required_work_types, CarProfile, CommodityCatalog, ShoppingOverrides};
use crate::domain::cost::{CostBreakdown, LaborLine};
use crate::domain::shop::ShopProfile;
use crate::domain::types::{CleaningClass, WorkType};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

// ==========================================
// 运费距离接口
// ==========================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FreightError {
    #[error("起点区域缺失")]
    MissingOrigin,

    #[error("无距离数据: {from} → {to}")]
    UnknownRoute { from: String, to: String },

    #[error("距离无效: {0}")]
    InvalidDistance(f64),
}

/// 区域间距离 (英里)
pub trait DistanceProvider: Send + Sync {
    fn distance_miles(&self, from_region: &str, to_region: &str) -> Result<f64, FreightError>;
}

/// 基于配置表的区域距离 (双向查找, 区域名不区分大小写)
pub struct RegionDistanceTable {
    same_region_miles: f64,
    distances: HashMap<(String, String), f64>,
}

impl RegionDistanceTable {
    pub fn from_config(config: &FreightConfig) -> Self {
        let distances = config
            .region_distances
            .iter()
            .map(|d| (route_key(&d.from_region, &d.to_region), d.miles))
            .collect();
        Self {
            same_region_miles: config.same_region_miles,
            distances,
        }
    }
}

impl DistanceProvider for RegionDistanceTable {
    fn distance_miles(&self, from_region: &str, to_region: &str) -> Result<f64, FreightError> {
        if from_region.eq_ignore_ascii_case(to_region) {
            return Ok(self.same_region_miles);
        }
        self.distances
            .get(&route_key(from_region, to_region))
            .copied()
            .ok_or_else(|| FreightError::UnknownRoute {
                from: from_region.to_string(),
                to: to_region.to_string(),
            })
    }
}

/// 无向路线键 (字典序小者在前)
fn route_key(a: &str, b: &str) -> (String, String) {
    let a = a.trim().to_uppercase();
    let b = b.trim().to_uppercase();
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

// ==========================================
// CostEstimator - 成本估算器
// ==========================================
pub struct CostEstimator {
    cost: CostConfig,
    freight: FreightConfig,
    commodities: Arc<CommodityCatalog>,
    distances: Arc<dyn DistanceProvider>,
}

impl CostEstimator {
    pub fn new(
        cost: CostConfig,
        freight: FreightConfig,
        commodities: Arc<CommodityCatalog>,
        distances: Arc<dyn DistanceProvider>,
    ) -> Self {
        Self {
            cost,
            freight,
            commodities,
            distances,
        }
    }

    /// 使用配置表距离的估算器
    pub fn with_region_table(
        cost: CostConfig,
        freight: FreightConfig,
        commodities: Arc<CommodityCatalog>,
    ) -> Self {
        let distances = Arc::new(RegionDistanceTable::from_config(&freight));
        Self::new(cost, freight, commodities, distances)
    }

    /// 估算单个 (车, 厂) 的成本明细
    pub fn estimate(
        &self,
        car: &CarProfile,
        shop: &ShopProfile,
        overrides: &ShoppingOverrides,
        origin_region: Option<&str>,
    ) -> CostBreakdown {
        let mut fallbacks = Vec::new();
        let work_types = required_work_types(car, overrides);

        let multiplier = if shop.material_multiplier.is_finite() && shop.material_multiplier > 0.0 {
            shop.material_multiplier
        } else {
            fallbacks.push(format!(
                "material_multiplier 无效 ({}), 使用 1.0",
                shop.material_multiplier
            ));
            1.0
        };

        let labor_lines = self.labor_lines(shop, &work_types, &mut fallbacks);
        let labor_cost: f64 = labor_lines.iter().map(|l| l.amount).sum();
        let material_cost = self.material_cost(car, overrides, &work_types, multiplier, &mut fallbacks);
        let abatement_cost = if car.requires_asbestos_abatement || overrides.asbestos_abatement {
            self.cost.abatement_cost
        } else {
            0.0
        };
        let freight_cost = self.freight_cost(origin_region, &shop.region, &mut fallbacks);

        if !fallbacks.is_empty() {
            tracing::debug!(
                car_number = %car.car_number,
                shop_code = %shop.shop_code,
                fallbacks = ?fallbacks,
                "成本估算触发降级"
            );
        }

        CostBreakdown::from_components(
            labor_cost,
            material_cost,
            abatement_cost,
            freight_cost,
            work_types,
            labor_lines,
            fallbacks,
        )
    }

    fn labor_lines(
        &self,
        shop: &ShopProfile,
        work_types: &[WorkType],
        fallbacks: &mut Vec<String>,
    ) -> Vec<LaborLine> {
        work_types
            .iter()
            .map(|&work_type| {
                let billed_hours = self
                    .cost
                    .hours_for(work_type)
                    .max(self.cost.min_hours_for(work_type));
                let mut rate = shop.rate_for(work_type);
                if !rate.is_finite() || rate < 0.0 {
                    fallbacks.push(format!("{} 工时单价无效, 按 0 计", work_type));
                    rate = 0.0;
                }
                LaborLine {
                    work_type,
                    billed_hours,
                    rate,
                    amount: billed_hours * rate,
                }
            })
            .collect()
    }

    fn material_cost(
        &self,
        car: &CarProfile,
        overrides: &ShoppingOverrides,
        work_types: &[WorkType],
        multiplier: f64,
        fallbacks: &mut Vec<String>,
    ) -> f64 {
        let commodity = car
            .commodity_code
            .as_deref()
            .and_then(|code| self.commodities.get(code));

        let mut total = 0.0;
        for work_type in work_types {
            total += match work_type {
                WorkType::Cleaning => {
                    let price = match commodity.and_then(|c| c.recommended_cleaning_price) {
                        Some(p) if p.is_finite() && p >= 0.0 => p,
                        _ => {
                            fallbacks.push("清洗价缺失, 使用默认清洗价".to_string());
                            self.cost.default_cleaning_price
                        }
                    };
                    let class = commodity
                        .and_then(|c| c.cleaning_class)
                        .unwrap_or(CleaningClass::A);
                    price * self.cost.cleaning_class_factors.factor(class) * multiplier
                }
                WorkType::Lining => {
                    let unit = car
                        .lining_type
                        .as_deref()
                        .map(|t| t.trim().to_uppercase())
                        .and_then(|t| self.cost.lining_unit_costs.get(&t).copied());
                    let unit = unit.unwrap_or_else(|| {
                        fallbacks.push("内衬类型无单价, 使用默认内衬单价".to_string());
                        self.cost.default_lining_unit_cost
                    });
                    unit * multiplier
                }
                other => {
                    let flat = self
                        .cost
                        .flat_material_costs
                        .get(other)
                        .copied()
                        .unwrap_or(self.cost.default_flat_material_cost);
                    flat * multiplier
                }
            };
        }

        let kosher = overrides.kosher || commodity.map(|c| c.kosher_required).unwrap_or(false);
        if kosher {
            total += self.cost.kosher_premium;
        }
        total
    }

    /// 运费回退链: 距离计算 → 区域固定运费 → 默认运费
    fn freight_cost(
        &self,
        origin_region: Option<&str>,
        shop_region: &str,
        fallbacks: &mut Vec<String>,
    ) -> f64 {
        let origin = origin_region.map(str::trim).filter(|o| !o.is_empty());

        let by_distance = origin
            .ok_or(FreightError::MissingOrigin)
            .and_then(|o| self.distances.distance_miles(o, shop_region))
            .and_then(|miles| {
                if miles.is_finite() && miles >= 0.0 {
                    Ok(miles * self.freight.rate_per_mile)
                } else {
                    Err(FreightError::InvalidDistance(miles))
                }
            });

        match by_distance {
            Ok(cost) => cost,
            Err(err) => {
                fallbacks.push(format!("运费距离计算失败: {}", err));
                if let Some(flat) = origin.and_then(|o| self.flat_rate(o, shop_region)) {
                    return flat;
                }
                fallbacks.push("无区域固定运费, 使用默认运费".to_string());
                self.freight.default_freight
            }
        }
    }

    fn flat_rate(&self, origin: &str, shop_region: &str) -> Option<f64> {
        let key = route_key(origin, shop_region);
        self.freight
            .flat_rates
            .iter()
            .find(|r| route_key(&r.from_region, &r.to_region) == key)
            .map(|r| r.amount)
            .filter(|a| a.is_finite() && *a >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::engine_config::{RegionDistance, RegionFlatRate};
    use crate::domain::car::Commodity;
    use std::collections::BTreeMap;

    fn shop() -> ShopProfile {
        ShopProfile {
            shop_code: "S1".to_string(),
            shop_name: "Shop 1".to_string(),
            region: "GULF".to_string(),
            is_preferred_network: true,
            labor_rate: 100.0,
            labor_rates_by_work: BTreeMap::from([(WorkType::Lining, 150.0)]),
            material_multiplier: 1.0,
            capabilities: None,
            backlog_hours: None,
            quality_score: None,
            is_active: true,
        }
    }

    fn estimator(catalog: CommodityCatalog, freight: FreightConfig) -> CostEstimator {
        CostEstimator::with_region_table(CostConfig::default(), freight, Arc::new(catalog))
    }

    #[test]
    fn test_cleaning_only_with_defaults() {
        let est = estimator(CommodityCatalog::new(), FreightConfig::default());
        let cost = est.estimate(
            &CarProfile::new("C1"),
            &shop(),
            &ShoppingOverrides::default(),
            Some("GULF"),
        );
        // 工时 8h × 100 = 800; 清洗 450 × 1.0; 同区域运费 150 × 3.25 = 487.5
        assert_eq!(cost.work_types, vec![WorkType::Cleaning]);
        assert_eq!(cost.labor_cost, 800.0);
        assert_eq!(cost.material_cost, 450.0);
        assert_eq!(cost.abatement_cost, 0.0);
        assert_eq!(cost.freight_cost, 487.5);
        assert_eq!(cost.total_cost, 1737.5);
        assert!(cost.is_consistent());
    }

    #[test]
    fn test_lined_car_adds_blast_and_lining() {
        let est = estimator(CommodityCatalog::new(), FreightConfig::default());
        let mut car = CarProfile::new("C1");
        car.lining_type = Some("epoxy".to_string());
        let cost = est.estimate(&car, &shop(), &ShoppingOverrides::default(), Some("GULF"));

        assert_eq!(
            cost.work_types,
            vec![WorkType::Cleaning, WorkType::Blast, WorkType::Lining]
        );
        // 800 + 16×100 + 24×150 = 6000
        assert_eq!(cost.labor_cost, 6000.0);
        // 450 + 800 + 3500 = 4750
        assert_eq!(cost.material_cost, 4750.0);
    }

    #[test]
    fn test_commodity_price_class_and_kosher() {
        let mut catalog = CommodityCatalog::new();
        catalog.insert(
            "CORN_SYRUP".to_string(),
            Commodity {
                commodity_code: "CORN_SYRUP".to_string(),
                name: None,
                cleaning_class: Some(CleaningClass::C),
                kosher_required: true,
                recommended_cleaning_price: Some(600.0),
                excluded_shops: Vec::new(),
                required_capabilities: Vec::new(),
            },
        );
        let est = estimator(catalog, FreightConfig::default());
        let mut car = CarProfile::new("C1");
        car.commodity_code = Some("CORN_SYRUP".to_string());
        let mut s = shop();
        s.material_multiplier = 1.1;

        let cost = est.estimate(&car, &s, &ShoppingOverrides::default(), Some("GULF"));
        // 600 × 1.5 × 1.1 + 750 = 1740
        assert_eq!(cost.material_cost, 1740.0);
    }

    #[test]
    fn test_minimum_billable_hours_floor() {
        let mut config = CostConfig::default();
        config.labor_hours.insert(WorkType::Cleaning, 1.0);
        let est = CostEstimator::with_region_table(
            config,
            FreightConfig::default(),
            Arc::new(CommodityCatalog::new()),
        );
        let cost = est.estimate(
            &CarProfile::new("C1"),
            &shop(),
            &ShoppingOverrides::default(),
            Some("GULF"),
        );
        assert_eq!(cost.labor_lines[0].billed_hours, 4.0);
        assert_eq!(cost.labor_cost, 400.0);
    }

    #[test]
    fn test_abatement_override() {
        let est = estimator(CommodityCatalog::new(), FreightConfig::default());
        let overrides = ShoppingOverrides {
            asbestos_abatement: true,
            ..Default::default()
        };
        let cost = est.estimate(&CarProfile::new("C1"), &shop(), &overrides, Some("GULF"));
        assert_eq!(cost.abatement_cost, 15000.0);
        assert!(cost.is_consistent());
    }

    #[test]
    fn test_freight_fallback_chain() {
        let freight = FreightConfig {
            region_distances: vec![RegionDistance {
                from_region: "MIDWEST".to_string(),
                to_region: "GULF".to_string(),
                miles: 900.0,
            }],
            flat_rates: vec![RegionFlatRate {
                from_region: "WEST".to_string(),
                to_region: "GULF".to_string(),
                amount: 2200.0,
            }],
            ..FreightConfig::default()
        };
        // 清洗价齐全, 降级说明只来自运费
        let mut catalog = CommodityCatalog::new();
        catalog.insert(
            "WATER".to_string(),
            Commodity {
                commodity_code: "WATER".to_string(),
                name: None,
                cleaning_class: None,
                kosher_required: false,
                recommended_cleaning_price: Some(400.0),
                excluded_shops: Vec::new(),
                required_capabilities: Vec::new(),
            },
        );
        let est = estimator(catalog, freight);
        let mut car = CarProfile::new("C1");
        car.commodity_code = Some("WATER".to_string());
        let overrides = ShoppingOverrides::default();

        // 距离 (反向查找)
        let cost = est.estimate(&car, &shop(), &overrides, Some("midwest"));
        assert_eq!(cost.freight_cost, 2925.0);
        assert!(cost.fallbacks.is_empty());

        // 固定运费
        let cost = est.estimate(&car, &shop(), &overrides, Some("WEST"));
        assert_eq!(cost.freight_cost, 2200.0);
        assert_eq!(cost.fallbacks.len(), 1);

        // 默认运费
        let cost = est.estimate(&car, &shop(), &overrides, None);
        assert_eq!(cost.freight_cost, 1500.0);
        assert_eq!(cost.fallbacks.len(), 2);
        assert!(cost.fallbacks.iter().all(|note| note.contains("运费")));
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let est = estimator(CommodityCatalog::new(), FreightConfig::default());
        let mut car = CarProfile::new("C1");
        car.lining_type = Some("GLASS".to_string());
        let overrides = ShoppingOverrides {
            paint: true,
            ..Default::default()
        };
        let a = est.estimate(&car, &shop(), &overrides, Some("EAST"));
        let b = est.estimate(&car, &shop(), &overrides, Some("EAST"));
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
