// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、AppState 装配、种子数据
// ==========================================

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;

use railcar_shopping::app::AppState;
use railcar_shopping::domain::capacity::{CapacityRecord, PlanMonth};
use railcar_shopping::domain::car::{CarFlag, CarProfile, ShoppingOverrides};
use railcar_shopping::domain::demand::Demand;
use railcar_shopping::domain::rule::{EligibilityRule, RuleCondition};
use railcar_shopping::domain::shop::{ShopCapabilities, ShopProfile};
use railcar_shopping::domain::types::DemandStatus;
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_string_lossy().to_string();

    let conn = railcar_shopping::db::open_sqlite_connection(&db_path)?;
    railcar_shopping::db::init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 创建测试用 AppState
pub fn create_test_state() -> (NamedTempFile, AppState) {
    railcar_shopping::logging::init_test();
    let (temp_file, db_path) = create_test_db().unwrap();
    let state = AppState::new(db_path).unwrap();
    (temp_file, state)
}

pub fn month(raw: &str) -> PlanMonth {
    PlanMonth::parse(raw).unwrap()
}

/// 协议网络厂修, 能力标签可选
pub fn shop(code: &str, labor_rate: f64, tags: &[&str]) -> ShopProfile {
    ShopProfile {
        shop_code: code.to_string(),
        shop_name: format!("{} 检修厂", code),
        region: "GULF".to_string(),
        is_preferred_network: true,
        labor_rate,
        labor_rates_by_work: BTreeMap::new(),
        material_multiplier: 1.0,
        capabilities: Some(ShopCapabilities {
            tags: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
            levels: BTreeMap::new(),
        }),
        backlog_hours: Some(100.0),
        quality_score: Some(80.0),
        is_active: true,
    }
}

/// 危险品车必须送具备 hazmat 能力的厂修
pub fn hazmat_rule() -> EligibilityRule {
    EligibilityRule {
        rule_id: "R_HAZMAT".to_string(),
        category: "CAPABILITY".to_string(),
        priority: 10,
        is_blocking: true,
        description: Some("危险品车需 hazmat 能力".to_string()),
        condition: RuleCondition::WhenCarFlag {
            flag: CarFlag::Hazmat,
            then: Box::new(RuleCondition::ShopHasCapability {
                capability: "hazmat".to_string(),
            }),
        },
    }
}

pub fn hazmat_car(car_number: &str) -> CarProfile {
    let mut car = CarProfile::new(car_number);
    car.is_hazmat = true;
    car
}

pub fn demand(demand_id: &str, car_count: i64, target_month: &str) -> Demand {
    Demand {
        demand_id: demand_id.to_string(),
        car_count,
        target_month: month(target_month),
        car_profile: hazmat_car(&format!("{}-REP", demand_id)),
        overrides: ShoppingOverrides::default(),
        allowed_shops: None,
        allowed_regions: None,
        origin_region: Some("GULF".to_string()),
        priority: 0,
        status: DemandStatus::Pending,
    }
}

pub fn capacity(shop_code: &str, target_month: &str, total: i64, allocated: i64) -> CapacityRecord {
    CapacityRecord {
        shop_code: shop_code.to_string(),
        month: month(target_month),
        total_capacity: total,
        allocated_count: allocated,
        completed_count: 0,
    }
}

/// 两个具备 hazmat 能力的厂修: A (便宜, 产能 4) / B (较贵, 产能 10)
pub fn seed_two_hazmat_shops(state: &AppState, target_month: &str) {
    state.reference_repo.upsert_rule(&hazmat_rule()).unwrap();
    state
        .reference_repo
        .upsert_shop(&shop("SHOP_A", 80.0, &["hazmat"]))
        .unwrap();
    state
        .reference_repo
        .upsert_shop(&shop("SHOP_B", 120.0, &["hazmat"]))
        .unwrap();
    state
        .capacity_repo
        .upsert_record(&capacity("SHOP_A", target_month, 4, 0))
        .unwrap();
    state
        .capacity_repo
        .upsert_record(&capacity("SHOP_B", target_month, 10, 0))
        .unwrap();
}
