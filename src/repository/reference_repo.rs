// ==========================================
// 铁路罐车检修排程系统 - 参考数据仓储
// ==========================================
// 范围: 车辆档案 / 厂修档案 / 准入规则 / 货物
// 红线: 引擎只读; upsert 仅供主数据同步与种子数据使用
// ==========================================

use crate::domain::car::{CarProfile, Commodity, CommodityCatalog};
use crate::domain::rule::{EligibilityRule, RuleCondition};
use crate::domain::shop::{ShopCapabilities, ShopProfile};
use crate::domain::types::CleaningClass;
use crate::repository::error::{conversion_error, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

pub struct ReferenceDataRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReferenceDataRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 车辆档案
    // ==========================================

    pub fn find_car(&self, car_number: &str) -> RepositoryResult<Option<CarProfile>> {
        let conn = self.get_conn()?;
        let car = conn
            .query_row(
                r#"
                SELECT car_number, product_type, lining_type, commodity_code,
                       is_hazmat, requires_asbestos_abatement, nitrogen_pad_stage
                FROM car_profile WHERE car_number = ?1
                "#,
                params![car_number],
                |row| {
                    Ok(CarProfile {
                        car_number: row.get(0)?,
                        product_type: row.get(1)?,
                        lining_type: row.get(2)?,
                        commodity_code: row.get(3)?,
                        is_hazmat: row.get::<_, i32>(4)? != 0,
                        requires_asbestos_abatement: row.get::<_, i32>(5)? != 0,
                        nitrogen_pad_stage: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(car)
    }

    pub fn upsert_car(&self, car: &CarProfile) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO car_profile (
                car_number, product_type, lining_type, commodity_code,
                is_hazmat, requires_asbestos_abatement, nitrogen_pad_stage
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                car.car_number,
                car.product_type,
                car.lining_type,
                car.commodity_code,
                car.is_hazmat as i32,
                car.requires_asbestos_abatement as i32,
                car.nitrogen_pad_stage,
            ],
        )?;
        Ok(())
    }

    // ==========================================
    // 厂修档案
    // ==========================================

    /// 全部启用厂修 (按 shop_code 排序, 即扫描顺序)
    pub fn list_shops(&self) -> RepositoryResult<Vec<ShopProfile>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT shop_code, shop_name, region, is_preferred_network, labor_rate,
                   labor_rates_json, material_multiplier, capabilities_json,
                   backlog_hours, quality_score, is_active
            FROM shop_profile
            WHERE is_active = 1
            ORDER BY shop_code
            "#,
        )?;
        let shops = stmt
            .query_map([], map_shop)?
            .collect::<rusqlite::Result<Vec<ShopProfile>>>()?;
        Ok(shops)
    }

    pub fn upsert_shop(&self, shop: &ShopProfile) -> RepositoryResult<()> {
        let labor_rates_json = serde_json::to_string(&shop.labor_rates_by_work)?;
        let capabilities_json = shop
            .capabilities
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO shop_profile (
                shop_code, shop_name, region, is_preferred_network, labor_rate,
                labor_rates_json, material_multiplier, capabilities_json,
                backlog_hours, quality_score, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                shop.shop_code,
                shop.shop_name,
                shop.region,
                shop.is_preferred_network as i32,
                shop.labor_rate,
                labor_rates_json,
                shop.material_multiplier,
                capabilities_json,
                shop.backlog_hours,
                shop.quality_score,
                shop.is_active as i32,
            ],
        )?;
        Ok(())
    }

    // ==========================================
    // 准入规则
    // ==========================================

    /// 启用中的规则 (priority 升序)
    ///
    /// condition_json 无法解析时降级为 Unrecognized, 由评估器报告为不适用
    pub fn list_active_rules(&self) -> RepositoryResult<Vec<EligibilityRule>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT rule_id, category, priority, is_blocking, description, condition_json
            FROM eligibility_rule
            WHERE is_active = 1
            ORDER BY priority ASC, rule_id ASC
            "#,
        )?;
        let rules = stmt
            .query_map([], |row| {
                let raw: String = row.get(5)?;
                Ok(EligibilityRule {
                    rule_id: row.get(0)?,
                    category: row.get(1)?,
                    priority: row.get(2)?,
                    is_blocking: row.get::<_, i32>(3)? != 0,
                    description: row.get(4)?,
                    condition: RuleCondition::from_json(&raw),
                })
            })?
            .collect::<rusqlite::Result<Vec<EligibilityRule>>>()?;

        let unrecognized = rules
            .iter()
            .filter(|r| matches!(r.condition, RuleCondition::Unrecognized { .. }))
            .count();
        if unrecognized > 0 {
            tracing::warn!(unrecognized, "存在无法解析的准入规则条件");
        }
        Ok(rules)
    }

    pub fn upsert_rule(&self, rule: &EligibilityRule) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO eligibility_rule (
                rule_id, category, priority, is_blocking, description, condition_json, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
            "#,
            params![
                rule.rule_id,
                rule.category,
                rule.priority,
                rule.is_blocking as i32,
                rule.description,
                rule.condition.to_json(),
            ],
        )?;
        Ok(())
    }

    /// 直接写入原始条件 JSON (用于导入外部规则)
    pub fn upsert_rule_raw(
        &self,
        rule_id: &str,
        category: &str,
        priority: i32,
        is_blocking: bool,
        condition_json: &str,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO eligibility_rule (
                rule_id, category, priority, is_blocking, description, condition_json, is_active
            ) VALUES (?1, ?2, ?3, ?4, NULL, ?5, 1)
            "#,
            params![rule_id, category, priority, is_blocking as i32, condition_json],
        )?;
        Ok(())
    }

    // ==========================================
    // 货物
    // ==========================================

    pub fn list_commodities(&self) -> RepositoryResult<CommodityCatalog> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT commodity_code, name, cleaning_class, kosher_required,
                   recommended_cleaning_price, excluded_shops_json, required_capabilities_json
            FROM commodity
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            let class: Option<String> = row.get(2)?;
            let excluded: String = row.get(5)?;
            let required: String = row.get(6)?;
            Ok(Commodity {
                commodity_code: row.get(0)?,
                name: row.get(1)?,
                cleaning_class: class.as_deref().and_then(CleaningClass::from_str),
                kosher_required: row.get::<_, i32>(3)? != 0,
                recommended_cleaning_price: row.get(4)?,
                excluded_shops: serde_json::from_str(&excluded)
                    .map_err(|e| conversion_error(5, e.to_string()))?,
                required_capabilities: serde_json::from_str(&required)
                    .map_err(|e| conversion_error(6, e.to_string()))?,
            })
        })?;

        let mut catalog = CommodityCatalog::new();
        for row in rows {
            let commodity = row?;
            catalog.insert(commodity.commodity_code.clone(), commodity);
        }
        Ok(catalog)
    }

    pub fn upsert_commodity(&self, commodity: &Commodity) -> RepositoryResult<()> {
        let excluded = serde_json::to_string(&commodity.excluded_shops)?;
        let required = serde_json::to_string(&commodity.required_capabilities)?;

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO commodity (
                commodity_code, name, cleaning_class, kosher_required,
                recommended_cleaning_price, excluded_shops_json, required_capabilities_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                commodity.commodity_code,
                commodity.name,
                commodity.cleaning_class.map(|c| c.to_db_str()),
                commodity.kosher_required as i32,
                commodity.recommended_cleaning_price,
                excluded,
                required,
            ],
        )?;
        Ok(())
    }
}

fn map_shop(row: &Row<'_>) -> rusqlite::Result<ShopProfile> {
    let labor_rates_json: String = row.get(5)?;
    let capabilities_json: Option<String> = row.get(7)?;

    // 能力数据损坏按缺失处理 (评估器将相关规则判为不适用)
    let capabilities = capabilities_json.and_then(|raw| {
        serde_json::from_str::<ShopCapabilities>(&raw)
            .map_err(|e| tracing::warn!(error = %e, "厂修能力数据无法解析"))
            .ok()
    });

    Ok(ShopProfile {
        shop_code: row.get(0)?,
        shop_name: row.get(1)?,
        region: row.get(2)?,
        is_preferred_network: row.get::<_, i32>(3)? != 0,
        labor_rate: row.get(4)?,
        labor_rates_by_work: serde_json::from_str(&labor_rates_json).unwrap_or_default(),
        material_multiplier: row.get(6)?,
        capabilities,
        backlog_hours: row.get(8)?,
        quality_score: row.get(9)?,
        is_active: row.get::<_, i32>(10)? != 0,
    })
}
