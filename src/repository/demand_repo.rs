// ==========================================
// 铁路罐车检修排程系统 - 检修需求仓储
// ==========================================

use crate::domain::capacity::PlanMonth;
use crate::domain::demand::Demand;
use crate::domain::types::DemandStatus;
use crate::repository::error::{conversion_error, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

pub struct DemandRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DemandRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, demand: &Demand) -> RepositoryResult<()> {
        if demand.car_count < 0 {
            return Err(RepositoryError::ValidationError(format!(
                "需求车数不能为负: demand_id={}, car_count={}",
                demand.demand_id, demand.car_count
            )));
        }

        let car_profile_json = serde_json::to_string(&demand.car_profile)?;
        let overrides_json = serde_json::to_string(&demand.overrides)?;
        let allowed_shops_json = demand
            .allowed_shops
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let allowed_regions_json = demand
            .allowed_regions
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO demand (
                demand_id, car_count, target_month, car_profile_json, overrides_json,
                allowed_shops_json, allowed_regions_json, origin_region, priority, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                demand.demand_id,
                demand.car_count,
                demand.target_month.to_string(),
                car_profile_json,
                overrides_json,
                allowed_shops_json,
                allowed_regions_json,
                demand.origin_region,
                demand.priority,
                demand.status.to_db_str(),
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, demand_id: &str) -> RepositoryResult<Option<Demand>> {
        let conn = self.get_conn()?;
        let demand = conn
            .query_row(
                r#"
                SELECT demand_id, car_count, target_month, car_profile_json, overrides_json,
                       allowed_shops_json, allowed_regions_json, origin_region, priority, status
                FROM demand WHERE demand_id = ?1
                "#,
                params![demand_id],
                map_demand,
            )
            .optional()?;
        Ok(demand)
    }

    /// 更新需求状态 (分配提交后推进)
    pub fn update_status(&self, demand_id: &str, status: DemandStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE demand SET status = ?2, updated_at = datetime('now') WHERE demand_id = ?1",
            params![demand_id, status.to_db_str()],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Demand".to_string(),
                id: demand_id.to_string(),
            });
        }
        Ok(())
    }
}

fn map_demand(row: &Row<'_>) -> rusqlite::Result<Demand> {
    let month_str: String = row.get(2)?;
    let car_profile_json: String = row.get(3)?;
    let overrides_json: String = row.get(4)?;
    let allowed_shops_json: Option<String> = row.get(5)?;
    let allowed_regions_json: Option<String> = row.get(6)?;
    let status: String = row.get(9)?;

    Ok(Demand {
        demand_id: row.get(0)?,
        car_count: row.get(1)?,
        target_month: PlanMonth::parse(&month_str)
            .ok_or_else(|| conversion_error(2, format!("无效的月份: {}", month_str)))?,
        car_profile: serde_json::from_str(&car_profile_json)
            .map_err(|e| conversion_error(3, e.to_string()))?,
        overrides: serde_json::from_str(&overrides_json)
            .map_err(|e| conversion_error(4, e.to_string()))?,
        allowed_shops: allowed_shops_json
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| conversion_error(5, e.to_string()))?,
        allowed_regions: allowed_regions_json
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| conversion_error(6, e.to_string()))?,
        origin_region: row.get(7)?,
        priority: row.get(8)?,
        status: DemandStatus::from_str(&status),
    })
}
