// ==========================================
// 铁路罐车检修排程系统 - 产能台账数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 例外: 超额上限检查必须与计数更新在同一条 SQL 中执行 (原子性)
// ==========================================

use crate::domain::capacity::{overcommit_ceiling, CapacityRecord, PlanMonth, ReserveOutcome};
use crate::repository::error::{conversion_error, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str =
    "SELECT shop_code, month, total_capacity, allocated_count, completed_count FROM capacity_record";

// ==========================================
// CapacityLedgerRepository - 产能台账仓储
// ==========================================

/// 产能台账仓储
/// 职责: 管理 capacity_record 表, 提供原子的预留/释放/退回
pub struct CapacityLedgerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CapacityLedgerRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 初始化 (厂修 × 月份) 产能记录
    ///
    /// 幂等: 已存在的记录不会被重置或重复插入
    ///
    /// # 返回
    /// - Ok(usize): 新插入的记录数
    pub fn initialize(
        &self,
        shop_codes: &[String],
        months: &[PlanMonth],
        default_capacity: i64,
    ) -> RepositoryResult<usize> {
        if default_capacity < 0 {
            return Err(RepositoryError::ValidationError(format!(
                "默认产能不能为负: {}",
                default_capacity
            )));
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO capacity_record (shop_code, month, total_capacity)
                VALUES (?1, ?2, ?3)
                "#,
            )?;
            for shop_code in shop_codes {
                for month in months {
                    inserted += stmt.execute(params![shop_code, month.to_string(), default_capacity])?;
                }
            }
        }
        tx.commit()?;

        tracing::info!(
            shops = shop_codes.len(),
            months = months.len(),
            inserted,
            "产能台账初始化完成"
        );
        Ok(inserted)
    }

    /// 写入或覆盖一条产能记录 (种子数据/主数据同步用)
    pub fn upsert_record(&self, record: &CapacityRecord) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO capacity_record (shop_code, month, total_capacity, allocated_count, completed_count)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(shop_code, month) DO UPDATE SET
                total_capacity = excluded.total_capacity,
                allocated_count = excluded.allocated_count,
                completed_count = excluded.completed_count,
                updated_at = datetime('now')
            "#,
            params![
                record.shop_code,
                record.month.to_string(),
                record.total_capacity,
                record.allocated_count,
                record.completed_count,
            ],
        )?;
        Ok(())
    }

    /// 在超额上限内预留槽位
    ///
    /// # 返回
    /// - Ok(Reserved): 已占用
    /// - Ok(Rejected): 超出上限或记录不存在, 计数未变
    pub fn reserve(
        &self,
        shop_code: &str,
        month: PlanMonth,
        count: i64,
        overcommit_percent: u32,
    ) -> RepositoryResult<ReserveOutcome> {
        let conn = self.get_conn()?;
        reserve_in(&conn, shop_code, month, count, overcommit_percent)
    }

    /// 完工释放: allocated -count, completed +count (单步原子)
    pub fn release(&self, shop_code: &str, month: PlanMonth, count: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        release_in(&conn, shop_code, month, count)
    }

    /// 取消退回: allocated -count, completed 不变
    pub fn unreserve(&self, shop_code: &str, month: PlanMonth, count: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        unreserve_in(&conn, shop_code, month, count)
    }

    /// 查询单条记录
    pub fn find(&self, shop_code: &str, month: PlanMonth) -> RepositoryResult<Option<CapacityRecord>> {
        let conn = self.get_conn()?;
        find_in(&conn, shop_code, month)
    }

    /// 查询计划窗口内的全部记录 (按 shop_code, month 排序)
    pub fn list_window(&self, months: &[PlanMonth]) -> RepositoryResult<Vec<CapacityRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE month = ?1 ORDER BY shop_code",
            SELECT_COLUMNS
        ))?;

        let mut records = Vec::new();
        for month in months {
            let rows = stmt.query_map(params![month.to_string()], map_record)?;
            for row in rows {
                records.push(row?);
            }
        }
        records.sort_by(|a, b| a.shop_code.cmp(&b.shop_code).then(a.month.cmp(&b.month)));
        Ok(records)
    }
}

// ==========================================
// 事务内可复用的台账操作
// ==========================================
// 调用方可传入 Transaction (Deref 为 Connection), 与其他写入同事务提交

pub(crate) fn find_in(
    conn: &Connection,
    shop_code: &str,
    month: PlanMonth,
) -> RepositoryResult<Option<CapacityRecord>> {
    let record = conn
        .query_row(
            &format!("{} WHERE shop_code = ?1 AND month = ?2", SELECT_COLUMNS),
            params![shop_code, month.to_string()],
            map_record,
        )
        .optional()?;
    Ok(record)
}

pub(crate) fn reserve_in(
    conn: &Connection,
    shop_code: &str,
    month: PlanMonth,
    count: i64,
    overcommit_percent: u32,
) -> RepositoryResult<ReserveOutcome> {
    if count <= 0 {
        return Err(RepositoryError::ValidationError(format!(
            "预留数量必须为正: {}",
            count
        )));
    }

    // 检查与自增在同一语句内完成; 整数除法与 overcommit_ceiling 一致
    let updated = conn.execute(
        r#"
        UPDATE capacity_record
        SET allocated_count = allocated_count + ?3, updated_at = datetime('now')
        WHERE shop_code = ?1 AND month = ?2
          AND allocated_count + ?3 - total_capacity <= (total_capacity * ?4 + 99) / 100
        "#,
        params![shop_code, month.to_string(), count, overcommit_percent as i64],
    )?;

    let current = find_in(conn, shop_code, month)?;
    if updated == 0 {
        let (total_capacity, allocated_count) = current
            .map(|r| (r.total_capacity, r.allocated_count))
            .unwrap_or((0, 0));
        tracing::warn!(
            shop_code,
            month = %month,
            count,
            total_capacity,
            allocated_count,
            "产能预留被拒绝"
        );
        return Ok(ReserveOutcome::Rejected {
            total_capacity,
            allocated_count,
            ceiling: overcommit_ceiling(total_capacity, overcommit_percent),
        });
    }

    let allocated_count = current.map(|r| r.allocated_count).unwrap_or(count);
    tracing::info!(shop_code, month = %month, count, allocated_count, "产能已预留");
    Ok(ReserveOutcome::Reserved { allocated_count })
}

pub(crate) fn release_in(
    conn: &Connection,
    shop_code: &str,
    month: PlanMonth,
    count: i64,
) -> RepositoryResult<()> {
    decrement(
        conn,
        shop_code,
        month,
        count,
        r#"
        UPDATE capacity_record
        SET allocated_count = allocated_count - ?3,
            completed_count = completed_count + ?3,
            updated_at = datetime('now')
        WHERE shop_code = ?1 AND month = ?2 AND allocated_count >= ?3
        "#,
    )?;
    tracing::info!(shop_code, month = %month, count, "产能已释放 (完工)");
    Ok(())
}

pub(crate) fn unreserve_in(
    conn: &Connection,
    shop_code: &str,
    month: PlanMonth,
    count: i64,
) -> RepositoryResult<()> {
    decrement(
        conn,
        shop_code,
        month,
        count,
        r#"
        UPDATE capacity_record
        SET allocated_count = allocated_count - ?3, updated_at = datetime('now')
        WHERE shop_code = ?1 AND month = ?2 AND allocated_count >= ?3
        "#,
    )?;
    tracing::info!(shop_code, month = %month, count, "产能已退回 (取消)");
    Ok(())
}

fn decrement(
    conn: &Connection,
    shop_code: &str,
    month: PlanMonth,
    count: i64,
    sql: &str,
) -> RepositoryResult<()> {
    if count <= 0 {
        return Err(RepositoryError::ValidationError(format!(
            "释放数量必须为正: {}",
            count
        )));
    }

    let updated = conn.execute(sql, params![shop_code, month.to_string(), count])?;
    if updated == 0 {
        return match find_in(conn, shop_code, month)? {
            Some(record) => Err(RepositoryError::BusinessRuleViolation(format!(
                "释放数量超过已占用: shop={}, month={}, allocated={}, count={}",
                shop_code, month, record.allocated_count, count
            ))),
            None => Err(RepositoryError::NotFound {
                entity: "CapacityRecord".to_string(),
                id: format!("{}/{}", shop_code, month),
            }),
        };
    }
    Ok(())
}

fn map_record(row: &Row<'_>) -> rusqlite::Result<CapacityRecord> {
    let month_str: String = row.get(1)?;
    let month = PlanMonth::parse(&month_str)
        .ok_or_else(|| conversion_error(1, format!("无效的月份: {}", month_str)))?;
    Ok(CapacityRecord {
        shop_code: row.get(0)?,
        month,
        total_capacity: row.get(2)?,
        allocated_count: row.get(3)?,
        completed_count: row.get(4)?,
    })
}
