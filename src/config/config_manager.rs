// ==========================================
// 铁路罐车检修排程系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写、快照
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::engine_config::EngineConfig;
use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// 配置键
pub mod config_keys {
    /// 引擎配置 (JSON)
    pub const ENGINE_CONFIG: &str = "engine_config";
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    pub fn get_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值 (UPSERT)
    pub fn set_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 加载引擎配置
    ///
    /// 配置不存在时返回默认值; JSON 损坏时报错 (不静默使用默认值)
    pub fn load_engine_config(&self) -> RepositoryResult<EngineConfig> {
        match self.get_config_value(config_keys::ENGINE_CONFIG)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                RepositoryError::FieldValueError {
                    field: config_keys::ENGINE_CONFIG.to_string(),
                    message: e.to_string(),
                }
            }),
            None => Ok(EngineConfig::default()),
        }
    }

    /// 保存引擎配置
    pub fn save_engine_config(&self, config: &EngineConfig) -> RepositoryResult<()> {
        let raw = serde_json::to_string(config)
            .map_err(|e| RepositoryError::InternalError(e.to_string()))?;
        self.set_config_value(config_keys::ENGINE_CONFIG, &raw)?;
        tracing::info!(config_version = config.config_version, "引擎配置已保存");
        Ok(())
    }

    /// 仅当配置不存在时写入默认引擎配置
    ///
    /// # 返回
    /// - true: 已写入默认值
    /// - false: 已存在, 未改动
    pub fn ensure_engine_config(&self) -> RepositoryResult<bool> {
        if self.get_config_value(config_keys::ENGINE_CONFIG)?.is_some() {
            return Ok(false);
        }
        self.save_engine_config(&EngineConfig::default())?;
        Ok(true)
    }

    /// 获取所有 global 配置的快照 (JSON)
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        serde_json::to_string(&config_map).map_err(|e| RepositoryError::InternalError(e.to_string()))
    }

    /// 从配置快照恢复配置 (覆盖现有 global 配置)
    ///
    /// # 返回
    /// - Ok(usize): 恢复的配置项数量
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> RepositoryResult<usize> {
        let config_map: BTreeMap<String, String> = serde_json::from_str(snapshot_json)
            .map_err(|e| RepositoryError::ValidationError(e.to_string()))?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut count = 0;
        for (key, value) in config_map.iter() {
            count += tx.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
                params![key, value],
            )?;
        }
        tx.commit()?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_missing_engine_config_returns_default() {
        let manager = manager();
        assert_eq!(manager.load_engine_config().unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_save_and_load_engine_config() {
        let manager = manager();
        let mut config = EngineConfig::default();
        config.capacity.overcommit_percent = 15;
        manager.save_engine_config(&config).unwrap();
        assert_eq!(manager.load_engine_config().unwrap().capacity.overcommit_percent, 15);
        assert!(!manager.ensure_engine_config().unwrap());
    }

    #[test]
    fn test_corrupt_engine_config_is_an_error() {
        let manager = manager();
        manager.set_config_value(config_keys::ENGINE_CONFIG, "{not json").unwrap();
        assert!(manager.load_engine_config().is_err());
    }

    #[test]
    fn test_snapshot_and_restore() {
        let manager = manager();
        manager.set_config_value("a", "1").unwrap();
        let snapshot = manager.get_config_snapshot().unwrap();
        manager.set_config_value("a", "2").unwrap();
        assert_eq!(manager.restore_config_from_snapshot(&snapshot).unwrap(), 1);
        assert_eq!(manager.get_config_value("a").unwrap(), Some("1".to_string()));
    }
}
