// ==========================================
// 铁路罐车检修排程系统 - 发件箱仓储
// ==========================================
// 入队: 与主操作同事务 (enqueue_in)
// 出队: 由 OutboxWorker 独立处理, 失败计数重试, 超限转死信
// ==========================================

use crate::domain::outbox::{OutboxEvent, OutboxEventType, OutboxStatus};
use crate::repository::error::{conversion_error, RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT event_id, event_type, aggregate_id, payload_json, status,
           retry_count, max_retries, last_error, created_at, processed_at
    FROM outbox_event
"#;

pub struct OutboxRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OutboxRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn enqueue(&self, event: &OutboxEvent) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        enqueue_in(&conn, event)
    }

    /// 待处理记录 (created_at 升序, 最多 limit 条)
    pub fn list_pending(&self, limit: usize) -> RepositoryResult<Vec<OutboxEvent>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE status = 'PENDING' ORDER BY created_at ASC, rowid ASC LIMIT ?1",
            SELECT_COLUMNS
        ))?;
        let events = stmt
            .query_map(params![limit as i64], map_event)?
            .collect::<rusqlite::Result<Vec<OutboxEvent>>>()?;
        Ok(events)
    }

    pub fn find_by_id(&self, event_id: &str) -> RepositoryResult<Option<OutboxEvent>> {
        let conn = self.get_conn()?;
        let event = conn
            .query_row(
                &format!("{} WHERE event_id = ?1", SELECT_COLUMNS),
                params![event_id],
                map_event,
            )
            .optional()?;
        Ok(event)
    }

    /// 按聚合 ID 查询 (created_at 升序)
    pub fn list_by_aggregate(&self, aggregate_id: &str) -> RepositoryResult<Vec<OutboxEvent>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE aggregate_id = ?1 ORDER BY created_at ASC, rowid ASC",
            SELECT_COLUMNS
        ))?;
        let events = stmt
            .query_map(params![aggregate_id], map_event)?
            .collect::<rusqlite::Result<Vec<OutboxEvent>>>()?;
        Ok(events)
    }

    pub fn mark_done(&self, event_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE outbox_event SET status = 'DONE', processed_at = ?2, last_error = NULL WHERE event_id = ?1",
            params![event_id, Utc::now().to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(not_found(event_id));
        }
        Ok(())
    }

    /// 记录一次失败: retry_count +1, 达到 max_retries 时转为 FAILED
    ///
    /// # 返回
    /// - Ok(OutboxStatus): 更新后的状态
    pub fn mark_failed_attempt(&self, event_id: &str, error: &str) -> RepositoryResult<OutboxStatus> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            r#"
            UPDATE outbox_event
            SET retry_count = retry_count + 1,
                last_error = ?2,
                status = CASE WHEN retry_count + 1 >= max_retries THEN 'FAILED' ELSE 'PENDING' END,
                processed_at = CASE WHEN retry_count + 1 >= max_retries THEN ?3 ELSE NULL END
            WHERE event_id = ?1 AND status = 'PENDING'
            "#,
            params![event_id, error, Utc::now().to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(not_found(event_id));
        }

        let status: String = conn.query_row(
            "SELECT status FROM outbox_event WHERE event_id = ?1",
            params![event_id],
            |row| row.get(0),
        )?;
        Ok(OutboxStatus::from_str(&status))
    }

    pub fn count_by_status(&self, status: OutboxStatus) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM outbox_event WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// 事务内入队
pub(crate) fn enqueue_in(conn: &Connection, event: &OutboxEvent) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO outbox_event (
            event_id, event_type, aggregate_id, payload_json, status,
            retry_count, max_retries, last_error, created_at, processed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            event.event_id,
            event.event_type.to_db_str(),
            event.aggregate_id,
            event.payload.to_string(),
            event.status.as_str(),
            event.retry_count,
            event.max_retries,
            event.last_error,
            event.created_at.to_rfc3339(),
            event.processed_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

fn not_found(event_id: &str) -> RepositoryError {
    RepositoryError::NotFound {
        entity: "OutboxEvent".to_string(),
        id: event_id.to_string(),
    }
}

pub(crate) fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, format!("无效的时间戳 {}: {}", raw, e)))
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<OutboxEvent> {
    let event_type: String = row.get(1)?;
    let payload: String = row.get(3)?;
    let status: String = row.get(4)?;
    let created_at: String = row.get(8)?;
    let processed_at: Option<String> = row.get(9)?;

    Ok(OutboxEvent {
        event_id: row.get(0)?,
        event_type: OutboxEventType::from_str(&event_type)
            .ok_or_else(|| conversion_error(1, format!("未知的事件类型: {}", event_type)))?,
        aggregate_id: row.get(2)?,
        payload: serde_json::from_str(&payload).map_err(|e| conversion_error(3, e.to_string()))?,
        status: OutboxStatus::from_str(&status),
        retry_count: row.get(5)?,
        max_retries: row.get(6)?,
        last_error: row.get(7)?,
        created_at: parse_timestamp(8, &created_at)?,
        processed_at: processed_at
            .map(|raw| parse_timestamp(9, &raw))
            .transpose()?,
    })
}
