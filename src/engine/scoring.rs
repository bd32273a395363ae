// ==========================================
// 铁路罐车检修排程系统 - 厂修评分
// ==========================================
// score = (w_cost × N(cost, 反向) + w_capacity × N(backlog, 反向)
//        + w_network × (协议 100 / 非协议 25) + w_quality × 质量基线) / 100
// N: 在配置边界间线性映射到 0–100, 超出边界饱和
// 排序: 分数降序, 同分保持扫描顺序 (稳定排序)
// ==========================================

use crate::config::engine_config::{NormalizationBounds, ScoringConfig};
use crate::config::scenario_profile::ScenarioWeights;
use crate::domain::shop::ShopProfile;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// 中性分 (边界退化或输入无效时使用)
pub const NEUTRAL_SCORE: f64 = 50.0;

/// 线性归一化到 0–100 (饱和)
///
/// # 参数
/// - invert: true 时值越小得分越高 (成本、积压)
pub fn normalize(value: f64, bounds: NormalizationBounds, invert: bool) -> f64 {
    let NormalizationBounds { min, max } = bounds;
    if !value.is_finite() || !min.is_finite() || !max.is_finite() || max <= min {
        return NEUTRAL_SCORE;
    }
    let ratio = ((value - min) / (max - min)).clamp(0.0, 1.0);
    let score = ratio * 100.0;
    if invert {
        100.0 - score
    } else {
        score
    }
}

/// 分项得分
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub cost_score: f64,
    pub capacity_score: f64,
    pub network_score: f64,
    pub quality_score: f64,
    pub total: f64,
}

// ==========================================
// ShopScorer - 按方案权重评分
// ==========================================
pub struct ShopScorer {
    config: ScoringConfig,
    weights: ScenarioWeights,
}

impl ShopScorer {
    pub fn new(config: ScoringConfig, weights: ScenarioWeights) -> Self {
        Self { config, weights }
    }

    pub fn weights(&self) -> &ScenarioWeights {
        &self.weights
    }

    pub fn score(&self, total_cost: f64, shop: &ShopProfile) -> ScoreBreakdown {
        let cost_score = normalize(total_cost, self.config.cost_bounds, true);
        let capacity_score = shop
            .backlog_hours
            .map(|h| normalize(h, self.config.backlog_bounds, true))
            .unwrap_or(NEUTRAL_SCORE);
        let network_score = if shop.is_preferred_network {
            self.config.preferred_network_score
        } else {
            self.config.non_preferred_network_score
        };
        let quality_score = shop
            .quality_score
            .filter(|q| q.is_finite())
            .map(|q| q.clamp(0.0, 100.0))
            .unwrap_or(self.config.default_quality_score);

        let w = &self.weights;
        let total = (w.cost * cost_score
            + w.capacity_balance * capacity_score
            + w.network_preference * network_score
            + w.quality * quality_score)
            / 100.0;

        ScoreBreakdown {
            cost_score,
            capacity_score,
            network_score,
            quality_score,
            total,
        }
    }
}

/// 按分数降序稳定排序 (同分保持原顺序)
pub fn rank_by_score<T>(items: &mut [T], score: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| score(b).partial_cmp(&score(a)).unwrap_or(Ordering::Equal));
}
