// ==========================================
// 铁路罐车检修排程系统 - 方案权重仓储
// ==========================================
// 红线: 已锁定方案 (被已提交分配引用) 不可修改权重
// ==========================================

use crate::config::scenario_profile::ScenarioWeights;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT scenario_id, name, description, w_cost, w_capacity_balance,
           w_network_preference, w_quality, is_default, locked
    FROM scenario
"#;

pub struct ScenarioRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScenarioRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_by_id(&self, scenario_id: &str) -> RepositoryResult<Option<ScenarioWeights>> {
        let conn = self.get_conn()?;
        let scenario = conn
            .query_row(
                &format!("{} WHERE scenario_id = ?1", SELECT_COLUMNS),
                params![scenario_id],
                map_scenario,
            )
            .optional()?;
        Ok(scenario)
    }

    /// 系统默认方案 (is_default=1, 多条时取 scenario_id 最小者)
    pub fn find_default(&self) -> RepositoryResult<Option<ScenarioWeights>> {
        let conn = self.get_conn()?;
        let scenario = conn
            .query_row(
                &format!(
                    "{} WHERE is_default = 1 ORDER BY scenario_id LIMIT 1",
                    SELECT_COLUMNS
                ),
                [],
                map_scenario,
            )
            .optional()?;
        Ok(scenario)
    }

    /// 插入或更新方案
    ///
    /// # 错误
    /// - BusinessRuleViolation: 方案已锁定
    /// - ValidationError: 权重无效
    pub fn upsert(&self, scenario: &ScenarioWeights) -> RepositoryResult<()> {
        scenario
            .validate()
            .map_err(RepositoryError::ValidationError)?;

        let conn = self.get_conn()?;
        let locked: Option<bool> = conn
            .query_row(
                "SELECT locked FROM scenario WHERE scenario_id = ?1",
                params![scenario.scenario_id],
                |row| Ok(row.get::<_, i32>(0)? != 0),
            )
            .optional()?;
        if locked == Some(true) {
            return Err(RepositoryError::BusinessRuleViolation(format!(
                "方案已锁定, 不可修改: {}",
                scenario.scenario_id
            )));
        }

        conn.execute(
            r#"
            INSERT INTO scenario (
                scenario_id, name, description, w_cost, w_capacity_balance,
                w_network_preference, w_quality, is_default, locked
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)
            ON CONFLICT(scenario_id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                w_cost = excluded.w_cost,
                w_capacity_balance = excluded.w_capacity_balance,
                w_network_preference = excluded.w_network_preference,
                w_quality = excluded.w_quality,
                is_default = excluded.is_default,
                updated_at = datetime('now')
            "#,
            params![
                scenario.scenario_id,
                scenario.name,
                scenario.description,
                scenario.cost,
                scenario.capacity_balance,
                scenario.network_preference,
                scenario.quality,
                scenario.is_default as i32,
            ],
        )?;
        Ok(())
    }
}

/// 锁定方案 (事务内调用, 已锁定时无操作)
///
/// 方案不在表中 (内置默认方案) 时先落库再锁定, 保证历史分配可追溯
pub(crate) fn lock_in(conn: &Connection, scenario: &ScenarioWeights) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO scenario (
            scenario_id, name, description, w_cost, w_capacity_balance,
            w_network_preference, w_quality, is_default, locked
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)
        ON CONFLICT(scenario_id) DO UPDATE SET locked = 1
        "#,
        params![
            scenario.scenario_id,
            scenario.name,
            scenario.description,
            scenario.cost,
            scenario.capacity_balance,
            scenario.network_preference,
            scenario.quality,
            scenario.is_default as i32,
        ],
    )?;
    Ok(())
}

fn map_scenario(row: &Row<'_>) -> rusqlite::Result<ScenarioWeights> {
    Ok(ScenarioWeights {
        scenario_id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        cost: row.get(3)?,
        capacity_balance: row.get(4)?,
        network_preference: row.get(5)?,
        quality: row.get(6)?,
        is_default: row.get::<_, i32>(7)? != 0,
        locked: row.get::<_, i32>(8)? != 0,
    })
}
