// ==========================================
// 铁路罐车检修排程系统 - 厂修评估 API
// ==========================================
// 职责: evaluateShops (按车号或内联车辆档案)
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::config::engine_config::EngineConfig;
use crate::domain::car::{CarProfile, ShoppingOverrides};
use crate::engine::cost_estimator::{CostEstimator, DistanceProvider, RegionDistanceTable};
use crate::engine::eligibility::EligibilityEvaluator;
use crate::engine::shop_evaluation::{EvaluationResult, ShopEvaluator};
use crate::repository::ReferenceDataRepository;

/// 车辆引用: 车号 (从车辆档案读取) 或内联档案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarRef {
    CarNumber(String),
    Profile(CarProfile),
}

/// 评估请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateShopsRequest {
    pub car: CarRef,
    #[serde(default)]
    pub overrides: ShoppingOverrides,
    #[serde(default)]
    pub origin_region: Option<String>,
    #[serde(default)]
    pub prefer_network_on_tie: bool,
}

// ==========================================
// ShopApi - 厂修评估 API
// ==========================================
pub struct ShopApi {
    reference_repo: Arc<ReferenceDataRepository>,
    config: Arc<EngineConfig>,
    distances: Arc<dyn DistanceProvider>,
}

impl ShopApi {
    pub fn new(reference_repo: Arc<ReferenceDataRepository>, config: Arc<EngineConfig>) -> Self {
        let distances = Arc::new(RegionDistanceTable::from_config(&config.freight));
        Self {
            reference_repo,
            config,
            distances,
        }
    }

    /// 替换运费距离来源
    pub fn with_distance_provider(mut self, distances: Arc<dyn DistanceProvider>) -> Self {
        self.distances = distances;
        self
    }

    /// 评估全部在用厂修
    ///
    /// # 返回
    /// - Ok(Vec<EvaluationResult>): 可准入优先, 总成本升序
    /// - Err(ApiError::NotFound): 车号不存在
    pub fn evaluate_shops(&self, request: &EvaluateShopsRequest) -> ApiResult<Vec<EvaluationResult>> {
        let car = self.resolve_car(&request.car)?;

        let shops = self.reference_repo.list_shops()?;
        let rules = self.reference_repo.list_active_rules()?;
        let commodities = Arc::new(self.reference_repo.list_commodities()?);

        let evaluator = ShopEvaluator::new(
            EligibilityEvaluator::new(rules),
            CostEstimator::new(
                self.config.cost.clone(),
                self.config.freight.clone(),
                commodities.clone(),
                self.distances.clone(),
            ),
            commodities,
        );

        Ok(evaluator.evaluate_shops(
            &car,
            &shops,
            &request.overrides,
            request.origin_region.as_deref(),
            request.prefer_network_on_tie,
        ))
    }

    fn resolve_car(&self, car: &CarRef) -> ApiResult<CarProfile> {
        match car {
            CarRef::Profile(profile) => Ok(profile.clone()),
            CarRef::CarNumber(number) => {
                if number.trim().is_empty() {
                    return Err(ApiError::InvalidInput("车号不能为空".to_string()));
                }
                self.reference_repo
                    .find_car(number.trim())?
                    .ok_or_else(|| ApiError::NotFound(format!("车辆(car_number={})不存在", number)))
            }
        }
    }
}
