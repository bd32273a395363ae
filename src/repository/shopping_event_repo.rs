// ==========================================
// 铁路罐车检修排程系统 - 检修事件仓储
// ==========================================
// 并发控制: 乐观锁 (version 字段)
//   UPDATE ... WHERE event_id = ? AND version = ?
//   0 行 → 区分记录不存在 / 版本冲突
// 红线: state 只通过 commit_transition 写入
// ==========================================

use crate::domain::outbox::{OutboxEvent, OutboxEventType};
use crate::domain::shopping_event::ShoppingEvent;
use crate::domain::types::{AllocationStatus, Disposition, ShoppingState};
use crate::repository::allocation_repo;
use crate::repository::error::{conversion_error, RepositoryError, RepositoryResult};
use crate::repository::outbox_repo::{enqueue_in, parse_timestamp};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub struct ShoppingEventRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ShoppingEventRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入新事件并入队 SHOPPING_EVENT_CREATED
    pub fn insert(&self, event: &ShoppingEvent, outbox_max_retries: i32) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let columns = timestamp_columns();
        let sql = format!(
            r#"
            INSERT INTO shopping_event (
                event_id, car_number, state, disposition, classification_code,
                allocation_id, version, created_at, updated_at, {}
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, {})
            "#,
            columns.join(", "),
            (10..10 + columns.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>()
                .join(", "),
        );

        let mut values: Vec<Value> = vec![
            Value::Text(event.event_id.clone()),
            Value::Text(event.car_number.clone()),
            Value::Text(event.state.to_db_str().to_string()),
            optional_text(event.disposition.map(|d| d.to_db_str().to_string())),
            optional_text(event.classification_code.clone()),
            optional_text(event.allocation_id.clone()),
            Value::Integer(event.version),
            Value::Text(event.created_at.to_rfc3339()),
            Value::Text(event.updated_at.to_rfc3339()),
        ];
        values.extend(timestamp_values(event));
        tx.execute(&sql, params_from_iter(values))?;

        let outbox = OutboxEvent::new(
            OutboxEventType::ShoppingEventCreated,
            event.event_id.clone(),
            json!({
                "event_id": event.event_id,
                "car_number": event.car_number,
                "allocation_id": event.allocation_id,
            }),
            outbox_max_retries,
        );
        enqueue_in(&tx, &outbox)?;

        tx.commit()?;
        Ok(())
    }

    pub fn find_by_id(&self, event_id: &str) -> RepositoryResult<Option<ShoppingEvent>> {
        let conn = self.get_conn()?;
        find_in(&conn, event_id)
    }

    /// 提交一次已校验的转换 (带乐观锁)
    ///
    /// 同一事务内:
    /// - 版本检查 + 状态/时间戳/版本写入
    /// - 进入 CLOSED: 关联分配 PLANNED→COMPLETED 并释放产能
    /// - 进入 CANCELLED: 关联分配 PLANNED→CANCELLED 并退回产能
    /// - 入队 SHOPPING_EVENT_TRANSITIONED
    ///
    /// # 参数
    /// - next: 状态机生成的新事件 (version = expected_version + 1)
    /// - expected_version: 调用方读取时的版本
    ///
    /// # 错误
    /// - OptimisticLockFailure: 存储版本已前进
    /// - NotFound: 事件不存在
    pub fn commit_transition(
        &self,
        next: &ShoppingEvent,
        from_state: ShoppingState,
        expected_version: i64,
        outbox_max_retries: i32,
    ) -> RepositoryResult<ShoppingEvent> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let columns = timestamp_columns();
        let assignments = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", c, i + 6))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            UPDATE shopping_event
            SET state = ?1, disposition = ?2, version = version + 1, updated_at = ?3, {}
            WHERE event_id = ?4 AND version = ?5
            "#,
            assignments
        );

        let mut values: Vec<Value> = vec![
            Value::Text(next.state.to_db_str().to_string()),
            optional_text(next.disposition.map(|d| d.to_db_str().to_string())),
            Value::Text(next.updated_at.to_rfc3339()),
            Value::Text(next.event_id.clone()),
            Value::Integer(expected_version),
        ];
        values.extend(timestamp_values(next));
        let rows_affected = tx.execute(&sql, params_from_iter(values))?;

        if rows_affected == 0 {
            // 判断是记录不存在还是版本冲突
            let actual: Option<i64> = tx
                .query_row(
                    "SELECT version FROM shopping_event WHERE event_id = ?1",
                    params![next.event_id],
                    |row| row.get(0),
                )
                .optional()?;
            return match actual {
                Some(actual) => Err(RepositoryError::OptimisticLockFailure {
                    entity_id: next.event_id.clone(),
                    expected: expected_version,
                    actual,
                }),
                None => Err(RepositoryError::NotFound {
                    entity: "ShoppingEvent".to_string(),
                    id: next.event_id.clone(),
                }),
            };
        }

        if let Some(allocation_id) = next.allocation_id.as_deref() {
            let target = match next.state {
                ShoppingState::Closed => Some(AllocationStatus::Completed),
                ShoppingState::Cancelled => Some(AllocationStatus::Cancelled),
                _ => None,
            };
            if let Some(target) = target {
                finish_linked_allocation(&tx, allocation_id, target, outbox_max_retries)?;
            }
        }

        let outbox = OutboxEvent::new(
            OutboxEventType::ShoppingEventTransitioned,
            next.event_id.clone(),
            json!({
                "event_id": next.event_id,
                "car_number": next.car_number,
                "from": from_state.to_db_str(),
                "to": next.state.to_db_str(),
                "version": expected_version + 1,
                "disposition": next.disposition.map(|d| d.to_db_str()),
            }),
            outbox_max_retries,
        );
        enqueue_in(&tx, &outbox)?;

        let committed = find_in(&tx, &next.event_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "ShoppingEvent".to_string(),
            id: next.event_id.clone(),
        })?;
        tx.commit()?;
        Ok(committed)
    }
}

/// 关联分配仍为 PLANNED 时才终结; 已终结的分配不再重复释放
fn finish_linked_allocation(
    conn: &Connection,
    allocation_id: &str,
    target: AllocationStatus,
    outbox_max_retries: i32,
) -> RepositoryResult<()> {
    match allocation_repo::find_in(conn, allocation_id)? {
        Some(allocation) if allocation.status == AllocationStatus::Planned => {
            allocation_repo::finish_in(conn, allocation_id, target, outbox_max_retries)?;
        }
        Some(allocation) => {
            tracing::warn!(
                allocation_id,
                status = %allocation.status,
                "关联分配已非 PLANNED, 跳过产能变更"
            );
        }
        None => {
            tracing::warn!(allocation_id, "关联分配不存在, 跳过产能变更");
        }
    }
    Ok(())
}

fn timestamp_columns() -> Vec<&'static str> {
    ShoppingState::ALL
        .iter()
        .map(|s| s.timestamp_column())
        .collect()
}

fn timestamp_values(event: &ShoppingEvent) -> Vec<Value> {
    ShoppingState::ALL
        .iter()
        .map(|s| optional_text(event.reached_at(*s).map(|t| t.to_rfc3339())))
        .collect()
}

fn optional_text(value: Option<String>) -> Value {
    value.map(Value::Text).unwrap_or(Value::Null)
}

pub(crate) fn find_in(conn: &Connection, event_id: &str) -> RepositoryResult<Option<ShoppingEvent>> {
    let sql = format!(
        r#"
        SELECT event_id, car_number, state, disposition, classification_code,
               allocation_id, version, created_at, updated_at, {}
        FROM shopping_event WHERE event_id = ?1
        "#,
        timestamp_columns().join(", ")
    );
    let event = conn
        .query_row(&sql, params![event_id], map_event)
        .optional()?;
    Ok(event)
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<ShoppingEvent> {
    let state: String = row.get(2)?;
    let disposition: Option<String> = row.get(3)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    let mut state_timestamps = BTreeMap::new();
    for (offset, s) in ShoppingState::ALL.iter().enumerate() {
        let column = 9 + offset;
        let raw: Option<String> = row.get(column)?;
        if let Some(raw) = raw {
            state_timestamps.insert(*s, parse_timestamp(column, &raw)?);
        }
    }

    Ok(ShoppingEvent {
        event_id: row.get(0)?,
        car_number: row.get(1)?,
        state: ShoppingState::from_str(&state)
            .ok_or_else(|| conversion_error(2, format!("未知的检修状态: {}", state)))?,
        state_timestamps,
        disposition: disposition
            .map(|raw| {
                Disposition::from_str(&raw)
                    .ok_or_else(|| conversion_error(3, format!("未知的处置去向: {}", raw)))
            })
            .transpose()?,
        classification_code: row.get(4)?,
        allocation_id: row.get(5)?,
        version: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
        updated_at: parse_timestamp(8, &updated_at)?,
    })
}
