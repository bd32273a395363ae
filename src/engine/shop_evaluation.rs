// ==========================================
// 铁路罐车检修排程系统 - 厂修评估
// ==========================================
// 职责: 对一辆车评估全部厂修 (准入 + 成本)
// 排序: 可准入优先 → 总成本升序 → (可选) 同成本协议网络优先
// ==========================================

use crate::domain::car::{CarProfile, CommodityCatalog, ShoppingOverrides};
use crate::domain::cost::CostBreakdown;
use crate::domain::rule::{EligibilityVerdict, RuleResult};
use crate::domain::shop::ShopProfile;
use crate::engine::cost_estimator::CostEstimator;
use crate::engine::eligibility::EligibilityEvaluator;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::instrument;

/// 单个厂修的评估结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub shop_code: String,
    pub shop_name: String,
    pub region: String,
    pub is_preferred_network: bool,
    pub eligible: bool,
    pub failed_rules: Vec<RuleResult>,
    pub results: Vec<RuleResult>,
    pub cost: CostBreakdown,
}

impl EvaluationResult {
    fn new(shop: &ShopProfile, verdict: EligibilityVerdict, cost: CostBreakdown) -> Self {
        let failed_rules = verdict.failed_rules().into_iter().cloned().collect();
        Self {
            shop_code: shop.shop_code.clone(),
            shop_name: shop.shop_name.clone(),
            region: shop.region.clone(),
            is_preferred_network: shop.is_preferred_network,
            eligible: verdict.eligible,
            failed_rules,
            results: verdict.results,
            cost,
        }
    }
}

pub struct ShopEvaluator {
    evaluator: EligibilityEvaluator,
    estimator: CostEstimator,
    commodities: Arc<CommodityCatalog>,
}

impl ShopEvaluator {
    pub fn new(
        evaluator: EligibilityEvaluator,
        estimator: CostEstimator,
        commodities: Arc<CommodityCatalog>,
    ) -> Self {
        Self {
            evaluator,
            estimator,
            commodities,
        }
    }

    /// 评估单个厂修 (准入 + 成本), 不排序
    pub fn evaluate_one(
        &self,
        car: &CarProfile,
        shop: &ShopProfile,
        overrides: &ShoppingOverrides,
        origin_region: Option<&str>,
    ) -> EvaluationResult {
        let verdict = self
            .evaluator
            .evaluate(car, shop, &self.commodities, overrides);
        let cost = self.estimator.estimate(car, shop, overrides, origin_region);
        EvaluationResult::new(shop, verdict, cost)
    }

    /// 评估全部厂修并排序
    ///
    /// # 参数
    /// - prefer_network_on_tie: 总成本相同时协议网络厂修优先
    #[instrument(skip(self, car, shops, overrides), fields(car_number = %car.car_number, shops = shops.len()))]
    pub fn evaluate_shops(
        &self,
        car: &CarProfile,
        shops: &[ShopProfile],
        overrides: &ShoppingOverrides,
        origin_region: Option<&str>,
        prefer_network_on_tie: bool,
    ) -> Vec<EvaluationResult> {
        let mut results: Vec<EvaluationResult> = shops
            .iter()
            .map(|shop| self.evaluate_one(car, shop, overrides, origin_region))
            .collect();

        results.sort_by(|a, b| {
            b.eligible
                .cmp(&a.eligible)
                .then_with(|| {
                    a.cost
                        .total_cost
                        .partial_cmp(&b.cost.total_cost)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| {
                    if prefer_network_on_tie {
                        b.is_preferred_network.cmp(&a.is_preferred_network)
                    } else {
                        Ordering::Equal
                    }
                })
        });

        let eligible = results.iter().filter(|r| r.eligible).count();
        tracing::info!(eligible, total = results.len(), "厂修评估完成");
        results
    }
}
