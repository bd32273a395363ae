// ==========================================
// 铁路罐车检修排程系统 - SQLite 连接与建库
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout, 减少并发写入时的偶发 busy 错误
// - 幂等建库 (CREATE TABLE IF NOT EXISTS)
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// foreign_keys 与 busy_timeout 均需“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let mut conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    crate::perf::install_sqlite_tracing(&mut conn);
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 幂等建库
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    let version = read_schema_version(conn)?;
    if version != Some(CURRENT_SCHEMA_VERSION) {
        tracing::warn!(
            expected = CURRENT_SCHEMA_VERSION,
            actual = ?version,
            "schema_version 与代码期望不一致"
        );
    }
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

-- ===== 参考数据 (只读, 由外部主数据维护) =====
CREATE TABLE IF NOT EXISTS car_profile (
    car_number TEXT PRIMARY KEY,
    product_type TEXT,
    lining_type TEXT,
    commodity_code TEXT,
    is_hazmat INTEGER NOT NULL DEFAULT 0,
    requires_asbestos_abatement INTEGER NOT NULL DEFAULT 0,
    nitrogen_pad_stage INTEGER
);

CREATE TABLE IF NOT EXISTS shop_profile (
    shop_code TEXT PRIMARY KEY,
    shop_name TEXT NOT NULL,
    region TEXT NOT NULL,
    is_preferred_network INTEGER NOT NULL DEFAULT 0,
    labor_rate REAL NOT NULL,
    labor_rates_json TEXT NOT NULL DEFAULT '{}',
    material_multiplier REAL NOT NULL DEFAULT 1.0,
    capabilities_json TEXT,
    backlog_hours REAL,
    quality_score REAL,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS commodity (
    commodity_code TEXT PRIMARY KEY,
    name TEXT,
    cleaning_class TEXT,
    kosher_required INTEGER NOT NULL DEFAULT 0,
    recommended_cleaning_price REAL,
    excluded_shops_json TEXT NOT NULL DEFAULT '[]',
    required_capabilities_json TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS eligibility_rule (
    rule_id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    priority INTEGER NOT NULL,
    is_blocking INTEGER NOT NULL DEFAULT 1,
    description TEXT,
    condition_json TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);

-- ===== 计划数据 =====
CREATE TABLE IF NOT EXISTS scenario (
    scenario_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    w_cost REAL NOT NULL,
    w_capacity_balance REAL NOT NULL,
    w_network_preference REAL NOT NULL,
    w_quality REAL NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    locked INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS demand (
    demand_id TEXT PRIMARY KEY,
    car_count INTEGER NOT NULL CHECK (car_count >= 0),
    target_month TEXT NOT NULL,
    car_profile_json TEXT NOT NULL,
    overrides_json TEXT NOT NULL DEFAULT '{}',
    allowed_shops_json TEXT,
    allowed_regions_json TEXT,
    origin_region TEXT,
    priority INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'PENDING',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS capacity_record (
    shop_code TEXT NOT NULL,
    month TEXT NOT NULL,
    total_capacity INTEGER NOT NULL CHECK (total_capacity >= 0),
    allocated_count INTEGER NOT NULL DEFAULT 0 CHECK (allocated_count >= 0),
    completed_count INTEGER NOT NULL DEFAULT 0 CHECK (completed_count >= 0),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (shop_code, month)
);

CREATE TABLE IF NOT EXISTS allocation (
    allocation_id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    demand_id TEXT NOT NULL,
    scenario_id TEXT NOT NULL,
    car_number TEXT,
    shop_code TEXT NOT NULL,
    is_preferred_network INTEGER NOT NULL DEFAULT 0,
    target_month TEXT NOT NULL,
    labor_cost REAL NOT NULL,
    material_cost REAL NOT NULL,
    abatement_cost REAL NOT NULL,
    freight_cost REAL NOT NULL,
    total_cost REAL NOT NULL,
    cost_snapshot_json TEXT NOT NULL,
    score REAL NOT NULL,
    rank_no INTEGER NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_allocation_demand ON allocation(demand_id);
CREATE INDEX IF NOT EXISTS idx_allocation_shop_month ON allocation(shop_code, target_month);

-- ===== 检修事件 (每个状态一列首次到达时间) =====
CREATE TABLE IF NOT EXISTS shopping_event (
    event_id TEXT PRIMARY KEY,
    car_number TEXT NOT NULL,
    state TEXT NOT NULL,
    disposition TEXT,
    classification_code TEXT,
    allocation_id TEXT,
    version INTEGER NOT NULL DEFAULT 0,
    event_at TEXT,
    packet_at TEXT,
    sow_at TEXT,
    shop_assigned_at TEXT,
    dispo_to_shop_at TEXT,
    enroute_at TEXT,
    arrived_at TEXT,
    estimate_received_at TEXT,
    estimate_approved_at TEXT,
    work_in_progress_at TEXT,
    final_estimate_received_at TEXT,
    final_approved_at TEXT,
    dispo_to_destination_at TEXT,
    closed_at TEXT,
    cancelled_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_shopping_event_car ON shopping_event(car_number);

-- ===== 发件箱 =====
CREATE TABLE IF NOT EXISTS outbox_event (
    event_id TEXT PRIMARY KEY,
    event_type TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'PENDING',
    retry_count INTEGER NOT NULL DEFAULT 0,
    max_retries INTEGER NOT NULL DEFAULT 5,
    last_error TEXT,
    created_at TEXT NOT NULL,
    processed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_outbox_status ON outbox_event(status, created_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_schema_version_absent_before_init() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
