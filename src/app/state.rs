// ==========================================
// 铁路罐车检修排程系统 - 应用状态
// ==========================================
// 职责: 由一个数据库路径装配全部仓储、引擎与 API
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{AllocationApi, CapacityApi, ShopApi, ShoppingEventApi};
use crate::config::config_manager::ConfigManager;
use crate::config::engine_config::EngineConfig;
use crate::engine::events::SideEffectHandler;
use crate::engine::repositories::AllocationRepositories;
use crate::repository::{
    AllocationRepository, CapacityLedgerRepository, DemandRepository, OutboxRepository,
    ReferenceDataRepository, ScenarioRepository, ShoppingEventRepository,
};
use crate::services::outbox_worker::OutboxWorker;

/// 应用状态
///
/// 所有仓储共享同一个连接 (Arc<Mutex<Connection>>)
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 启动时加载的引擎配置
    pub config: Arc<EngineConfig>,

    pub config_manager: Arc<ConfigManager>,

    /// 厂修评估 API
    pub shop_api: Arc<ShopApi>,

    /// 分配 API
    pub allocation_api: Arc<AllocationApi>,

    /// 产能台账 API
    pub capacity_api: Arc<CapacityApi>,

    /// 检修事件 API
    pub shopping_event_api: Arc<ShoppingEventApi>,

    /// 参考数据仓储 (种子数据/主数据同步)
    pub reference_repo: Arc<ReferenceDataRepository>,

    /// 需求仓储
    pub demand_repo: Arc<DemandRepository>,

    /// 方案仓储
    pub scenario_repo: Arc<ScenarioRepository>,

    /// 产能台账仓储
    pub capacity_repo: Arc<CapacityLedgerRepository>,

    /// 分配仓储
    pub allocation_repo: Arc<AllocationRepository>,

    /// 检修事件仓储
    pub shopping_event_repo: Arc<ShoppingEventRepository>,

    /// 发件箱仓储
    pub outbox_repo: Arc<OutboxRepository>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 该方法会:
    /// 1. 打开连接并幂等建库
    /// 2. 写入默认引擎配置 (若不存在) 并加载
    /// 3. 初始化全部 Repository 与 API
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!(db_path = %db_path, "初始化AppState");

        let conn = crate::db::open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        crate::db::init_schema(&conn).map_err(|e| format!("建库失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(ConfigManager::from_connection(conn.clone()));
        config_manager
            .ensure_engine_config()
            .map_err(|e| format!("无法写入默认引擎配置: {}", e))?;
        let config = Arc::new(
            config_manager
                .load_engine_config()
                .map_err(|e| format!("无法加载引擎配置: {}", e))?,
        );

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let reference_repo = Arc::new(ReferenceDataRepository::from_connection(conn.clone()));
        let demand_repo = Arc::new(DemandRepository::from_connection(conn.clone()));
        let scenario_repo = Arc::new(ScenarioRepository::from_connection(conn.clone()));
        let capacity_repo = Arc::new(CapacityLedgerRepository::from_connection(conn.clone()));
        let allocation_repo = Arc::new(AllocationRepository::from_connection(conn.clone()));
        let event_repo = Arc::new(ShoppingEventRepository::from_connection(conn.clone()));
        let outbox_repo = Arc::new(OutboxRepository::from_connection(conn));

        // ==========================================
        // 初始化API层
        // ==========================================
        let repos = AllocationRepositories::new(
            reference_repo.clone(),
            demand_repo.clone(),
            scenario_repo.clone(),
            capacity_repo.clone(),
            allocation_repo.clone(),
        );

        let shop_api = Arc::new(ShopApi::new(reference_repo.clone(), config.clone()));
        let allocation_api = Arc::new(AllocationApi::new(repos, config.clone()));
        let capacity_api = Arc::new(CapacityApi::new(
            capacity_repo.clone(),
            reference_repo.clone(),
            config.clone(),
        ));
        let shopping_event_api = Arc::new(ShoppingEventApi::new(
            event_repo.clone(),
            allocation_repo.clone(),
            config.clone(),
        ));

        tracing::info!(config_version = config.config_version, "AppState初始化完成");

        Ok(Self {
            db_path,
            config,
            config_manager,
            shop_api,
            allocation_api,
            capacity_api,
            shopping_event_api,
            reference_repo,
            demand_repo,
            scenario_repo,
            capacity_repo,
            allocation_repo,
            shopping_event_repo: event_repo,
            outbox_repo,
        })
    }

    /// 创建发件箱 worker
    pub fn outbox_worker(&self, handler: Arc<dyn SideEffectHandler>) -> OutboxWorker {
        OutboxWorker::new(self.outbox_repo.clone(), handler)
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 RAILCAR_SHOPPING_DB_PATH → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("RAILCAR_SHOPPING_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./railcar_shopping.db");

    if let Some(data_dir) = dirs::data_dir() {
        #[cfg(debug_assertions)]
        let dir = data_dir.join("railcar-shopping-dev");

        #[cfg(not(debug_assertions))]
        let dir = data_dir.join("railcar-shopping");

        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("railcar_shopping.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_app_state_bootstraps_empty_db() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let state = AppState::new(file.path().to_string_lossy().to_string()).unwrap();
        assert_eq!(*state.config, EngineConfig::default());
        assert!(state.reference_repo.list_shops().unwrap().is_empty());
    }
}
