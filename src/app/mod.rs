// ==========================================
// 铁路罐车检修排程系统 - 应用层
// ==========================================
// 职责: 装配仓储/引擎/API, 供二进制与集成方使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
