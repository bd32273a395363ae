// ==========================================
// 铁路罐车检修排程系统 - 检修需求领域模型
// ==========================================
// 生命周期: 计划创建 → 被一次分配运行消费 → 标记已分配/残量
// ==========================================

use crate::domain::capacity::PlanMonth;
use crate::domain::car::{CarProfile, ShoppingOverrides};
use crate::domain::types::DemandStatus;
use serde::{Deserialize, Serialize};

// ==========================================
// Demand - 检修需求 (N 辆同类车, 目标月份)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demand {
    pub demand_id: String,
    pub car_count: i64,
    pub target_month: PlanMonth,
    pub car_profile: CarProfile,         // 代表车型
    #[serde(default)]
    pub overrides: ShoppingOverrides,

    // ===== 约束 =====
    #[serde(default)]
    pub allowed_shops: Option<Vec<String>>,
    #[serde(default)]
    pub allowed_regions: Option<Vec<String>>,
    #[serde(default)]
    pub origin_region: Option<String>,   // 运费起点

    pub priority: i32,                   // 仅记录, 不影响处理顺序
    pub status: DemandStatus,
}

impl Demand {
    /// 厂修是否满足需求级约束
    pub fn accepts_shop(&self, shop_code: &str, region: &str) -> bool {
        let shop_ok = self
            .allowed_shops
            .as_ref()
            .map(|shops| shops.iter().any(|s| s == shop_code))
            .unwrap_or(true);
        let region_ok = self
            .allowed_regions
            .as_ref()
            .map(|regions| regions.iter().any(|r| r.eq_ignore_ascii_case(region)))
            .unwrap_or(true);
        shop_ok && region_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demand() -> Demand {
        Demand {
            demand_id: "D1".to_string(),
            car_count: 3,
            target_month: PlanMonth::new(2026, 4).unwrap(),
            car_profile: CarProfile::new("REP-1"),
            overrides: ShoppingOverrides::default(),
            allowed_shops: None,
            allowed_regions: None,
            origin_region: None,
            priority: 0,
            status: DemandStatus::Pending,
        }
    }

    #[test]
    fn test_unconstrained_demand_accepts_any_shop() {
        assert!(demand().accepts_shop("S1", "GULF"));
    }

    #[test]
    fn test_shop_and_region_constraints() {
        let mut d = demand();
        d.allowed_shops = Some(vec!["S1".to_string(), "S2".to_string()]);
        d.allowed_regions = Some(vec!["gulf".to_string()]);
        assert!(d.accepts_shop("S1", "GULF"));
        assert!(!d.accepts_shop("S3", "GULF"));
        assert!(!d.accepts_shop("S2", "MIDWEST"));
    }
}
