// ==========================================
// 铁路罐车检修排程系统 - SQL 性能统计
// ==========================================
// 开关:
// - Debug 默认开启; Release 默认关闭
// - RAILCAR_SHOPPING_PERF_SQL=1 强制开启
// - RAILCAR_SHOPPING_SLOW_SQL_MS=50 慢 SQL 阈值 (毫秒)
// ==========================================

use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

static SQL_TRACE_ON: AtomicBool = AtomicBool::new(false);
static SLOW_SQL_MS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static GUARD_DEPTH: Cell<u32> = Cell::new(0);
    static STATEMENTS: Cell<u64> = Cell::new(0);
    static SLOW_STATEMENTS: Cell<u64> = Cell::new(0);
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn guard_active() -> bool {
    GUARD_DEPTH.with(|d| d.get() > 0)
}

/// 在连接上安装语句计数与慢查询回调
pub fn install_sqlite_tracing(conn: &mut Connection) {
    let enabled = env_flag("RAILCAR_SHOPPING_PERF_SQL").unwrap_or(cfg!(debug_assertions));
    SQL_TRACE_ON.store(enabled, Ordering::Relaxed);

    if !enabled {
        conn.trace(None);
        conn.profile(None);
        return;
    }

    let threshold = std::env::var("RAILCAR_SHOPPING_SLOW_SQL_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(if cfg!(debug_assertions) { 50 } else { 200 });
    SLOW_SQL_MS.store(threshold, Ordering::Relaxed);

    conn.trace(Some(on_statement));
    conn.profile(Some(on_statement_profiled));
}

fn on_statement(_sql: &str) {
    if SQL_TRACE_ON.load(Ordering::Relaxed) && guard_active() {
        STATEMENTS.with(|c| c.set(c.get().saturating_add(1)));
    }
}

fn on_statement_profiled(sql: &str, duration: Duration) {
    if !SQL_TRACE_ON.load(Ordering::Relaxed) {
        return;
    }
    let ms = duration.as_millis() as u64;
    let threshold = SLOW_SQL_MS.load(Ordering::Relaxed);
    if threshold == 0 || ms < threshold {
        return;
    }

    let mut statement: String = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if statement.len() > 400 {
        let mut cut = 400;
        while !statement.is_char_boundary(cut) {
            cut -= 1;
        }
        statement.truncate(cut);
        statement.push('…');
    }
    tracing::warn!(target: "slow_sql", duration_ms = ms, sql = %statement, "slow sql");

    if guard_active() {
        SLOW_STATEMENTS.with(|c| c.set(c.get().saturating_add(1)));
    }
}

/// 操作级性能 Guard: drop 时记录耗时、SQL 条数、慢 SQL 条数
///
/// ```ignore
/// let _perf = railcar_shopping::perf::PerfGuard::new("generate_allocations");
/// ```
pub struct PerfGuard {
    op: &'static str,
    started: Instant,
    statements_before: u64,
    slow_before: u64,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        GUARD_DEPTH.with(|d| d.set(d.get().saturating_add(1)));
        Self {
            op,
            started: Instant::now(),
            statements_before: STATEMENTS.with(|c| c.get()),
            slow_before: SLOW_STATEMENTS.with(|c| c.get()),
        }
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let sql_count = STATEMENTS.with(|c| c.get()).saturating_sub(self.statements_before);
        let slow_sql_count = SLOW_STATEMENTS.with(|c| c.get()).saturating_sub(self.slow_before);
        tracing::info!(
            target: "perf",
            op = self.op,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            sql_count,
            slow_sql_count,
            "done"
        );
        GUARD_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}
