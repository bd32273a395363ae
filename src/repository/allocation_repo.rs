// ==========================================
// 铁路罐车检修排程系统 - 分配结果仓储
// ==========================================
// 提交: 分配行 + 实时预留 (含上限检查) + 发件箱 同一事务
// 红线: 成本快照写入后不再更新
// ==========================================

use crate::config::scenario_profile::ScenarioWeights;
use crate::domain::allocation::Allocation;
use crate::domain::capacity::{PlanMonth, ReserveOutcome};
use crate::domain::outbox::{OutboxEvent, OutboxEventType};
use crate::domain::types::AllocationStatus;
use crate::repository::capacity_repo::{release_in, reserve_in, unreserve_in};
use crate::repository::error::{conversion_error, RepositoryError, RepositoryResult};
use crate::repository::outbox_repo::{enqueue_in, parse_timestamp};
use crate::repository::scenario_repo::lock_in;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::json;
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT allocation_id, run_id, demand_id, scenario_id, car_number, shop_code,
           is_preferred_network, target_month, cost_snapshot_json, score, rank_no,
           status, created_at
    FROM allocation
"#;

pub struct AllocationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AllocationRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 提交单条分配
    ///
    /// 同一事务内: 实时预留 1 个槽位 (按当前台账重新校验上限) → 写分配行 (PLANNED)
    /// → 锁定方案 → 入队 ALLOCATION_COMMITTED
    ///
    /// # 错误
    /// - OvercommitRejected: 实时预留被拒, 事务回滚, 无任何写入
    pub fn commit_allocation(
        &self,
        allocation: &Allocation,
        scenario: &ScenarioWeights,
        overcommit_percent: u32,
        outbox_max_retries: i32,
    ) -> RepositoryResult<Allocation> {
        let mut committed = allocation.clone();
        committed.status = AllocationStatus::Planned;

        let cost_snapshot_json = serde_json::to_string(&committed.cost)?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        match reserve_in(
            &tx,
            &committed.shop_code,
            committed.target_month,
            1,
            overcommit_percent,
        )? {
            ReserveOutcome::Reserved { .. } => {}
            ReserveOutcome::Rejected {
                total_capacity,
                allocated_count,
                ceiling,
            } => {
                // tx 在 drop 时回滚
                return Err(RepositoryError::OvercommitRejected {
                    shop_code: committed.shop_code.clone(),
                    month: committed.target_month.to_string(),
                    total_capacity,
                    allocated_count,
                    requested: 1,
                    ceiling,
                });
            }
        }

        tx.execute(
            r#"
            INSERT INTO allocation (
                allocation_id, run_id, demand_id, scenario_id, car_number, shop_code,
                is_preferred_network, target_month, labor_cost, material_cost,
                abatement_cost, freight_cost, total_cost, cost_snapshot_json,
                score, rank_no, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
            params![
                committed.allocation_id,
                committed.run_id,
                committed.demand_id,
                committed.scenario_id,
                committed.car_number,
                committed.shop_code,
                committed.is_preferred_network as i32,
                committed.target_month.to_string(),
                committed.cost.labor_cost,
                committed.cost.material_cost,
                committed.cost.abatement_cost,
                committed.cost.freight_cost,
                committed.cost.total_cost,
                cost_snapshot_json,
                committed.score,
                committed.rank as i64,
                committed.status.to_db_str(),
                committed.created_at.to_rfc3339(),
            ],
        )?;

        lock_in(&tx, scenario)?;

        let outbox = OutboxEvent::new(
            OutboxEventType::AllocationCommitted,
            committed.allocation_id.clone(),
            json!({
                "allocation_id": committed.allocation_id,
                "run_id": committed.run_id,
                "demand_id": committed.demand_id,
                "shop_code": committed.shop_code,
                "target_month": committed.target_month.to_string(),
                "total_cost": committed.cost.total_cost,
            }),
            outbox_max_retries,
        );
        enqueue_in(&tx, &outbox)?;

        tx.commit()?;
        Ok(committed)
    }

    pub fn find_by_id(&self, allocation_id: &str) -> RepositoryResult<Option<Allocation>> {
        let conn = self.get_conn()?;
        find_in(&conn, allocation_id)
    }

    pub fn list_by_run(&self, run_id: &str) -> RepositoryResult<Vec<Allocation>> {
        self.list_where("run_id", run_id)
    }

    pub fn list_by_demand(&self, demand_id: &str) -> RepositoryResult<Vec<Allocation>> {
        self.list_where("demand_id", demand_id)
    }

    fn list_where(&self, column: &'static str, value: &str) -> RepositoryResult<Vec<Allocation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE {} = ?1 ORDER BY created_at ASC, rowid ASC",
            SELECT_COLUMNS, column
        ))?;
        let allocations = stmt
            .query_map(params![value], map_allocation)?
            .collect::<rusqlite::Result<Vec<Allocation>>>()?;
        Ok(allocations)
    }

    /// 完工: PLANNED → COMPLETED, 同事务释放 1 个槽位
    pub fn complete(&self, allocation_id: &str, outbox_max_retries: i32) -> RepositoryResult<Allocation> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let allocation = finish_in(
            &tx,
            allocation_id,
            AllocationStatus::Completed,
            outbox_max_retries,
        )?;
        tx.commit()?;
        Ok(allocation)
    }

    /// 取消: PLANNED → CANCELLED, 同事务退回 1 个槽位
    pub fn cancel(&self, allocation_id: &str, outbox_max_retries: i32) -> RepositoryResult<Allocation> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let allocation = finish_in(
            &tx,
            allocation_id,
            AllocationStatus::Cancelled,
            outbox_max_retries,
        )?;
        tx.commit()?;
        Ok(allocation)
    }
}

pub(crate) fn find_in(conn: &Connection, allocation_id: &str) -> RepositoryResult<Option<Allocation>> {
    let allocation = conn
        .query_row(
            &format!("{} WHERE allocation_id = ?1", SELECT_COLUMNS),
            params![allocation_id],
            map_allocation,
        )
        .optional()?;
    Ok(allocation)
}

/// 分配浅层终结 (事务内调用)
///
/// COMPLETED 走 release (completed +1), CANCELLED 走 unreserve
pub(crate) fn finish_in(
    conn: &Connection,
    allocation_id: &str,
    target: AllocationStatus,
    outbox_max_retries: i32,
) -> RepositoryResult<Allocation> {
    let mut allocation = find_in(conn, allocation_id)?.ok_or_else(|| RepositoryError::NotFound {
        entity: "Allocation".to_string(),
        id: allocation_id.to_string(),
    })?;

    if allocation.status != AllocationStatus::Planned
        || !matches!(target, AllocationStatus::Completed | AllocationStatus::Cancelled)
    {
        return Err(RepositoryError::InvalidStateTransition {
            from: allocation.status.to_string(),
            to: target.to_string(),
        });
    }

    let updated = conn.execute(
        r#"
        UPDATE allocation SET status = ?2, updated_at = datetime('now')
        WHERE allocation_id = ?1 AND status = 'PLANNED'
        "#,
        params![allocation_id, target.to_db_str()],
    )?;
    if updated == 0 {
        return Err(RepositoryError::InvalidStateTransition {
            from: allocation.status.to_string(),
            to: target.to_string(),
        });
    }

    match target {
        AllocationStatus::Completed => {
            release_in(conn, &allocation.shop_code, allocation.target_month, 1)?
        }
        _ => unreserve_in(conn, &allocation.shop_code, allocation.target_month, 1)?,
    }

    let outbox = OutboxEvent::new(
        OutboxEventType::AllocationStatusChanged,
        allocation_id,
        json!({
            "allocation_id": allocation_id,
            "from": allocation.status.to_db_str(),
            "to": target.to_db_str(),
            "shop_code": allocation.shop_code,
            "target_month": allocation.target_month.to_string(),
        }),
        outbox_max_retries,
    );
    enqueue_in(conn, &outbox)?;

    tracing::info!(
        allocation_id,
        shop_code = %allocation.shop_code,
        status = %target,
        "分配状态已变更"
    );
    allocation.status = target;
    Ok(allocation)
}

fn map_allocation(row: &Row<'_>) -> rusqlite::Result<Allocation> {
    let month_str: String = row.get(7)?;
    let cost_json: String = row.get(8)?;
    let rank: i64 = row.get(10)?;
    let status: String = row.get(11)?;
    let created_at: String = row.get(12)?;

    Ok(Allocation {
        allocation_id: row.get(0)?,
        run_id: row.get(1)?,
        demand_id: row.get(2)?,
        scenario_id: row.get(3)?,
        car_number: row.get(4)?,
        shop_code: row.get(5)?,
        is_preferred_network: row.get::<_, i32>(6)? != 0,
        target_month: PlanMonth::parse(&month_str)
            .ok_or_else(|| conversion_error(7, format!("无效的月份: {}", month_str)))?,
        cost: serde_json::from_str(&cost_json).map_err(|e| conversion_error(8, e.to_string()))?,
        score: row.get(9)?,
        rank: rank.max(0) as usize,
        status: AllocationStatus::from_str(&status),
        created_at: parse_timestamp(12, &created_at)?,
    })
}
