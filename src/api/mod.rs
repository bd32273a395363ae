// ==========================================
// 铁路罐车检修排程系统 - API 层
// ==========================================
// 职责: 对外暴露的四组操作, 统一转换为 ApiError
// ==========================================

pub mod allocation_api;
pub mod capacity_api;
pub mod error;
pub mod shop_api;
pub mod shopping_event_api;

// 重导出核心类型
pub use allocation_api::AllocationApi;
pub use capacity_api::CapacityApi;
pub use error::{ApiError, ApiResult};
pub use shop_api::{CarRef, EvaluateShopsRequest, ShopApi};
pub use shopping_event_api::{CreateEventRequest, ShoppingEventApi};
