// ==========================================
// 铁路罐车检修排程系统 - 领域类型定义
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 检修状态 (Shopping State)
// ==========================================
// 顺序: 声明顺序即正向顺序, CANCELLED 不参与排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShoppingState {
    Event,                 // 检修事件创建
    Packet,                // 资料包
    Sow,                   // 工作范围 (Scope of Work)
    ShopAssigned,          // 已分配厂修
    DispoToShop,           // 发往厂修
    Enroute,               // 在途
    Arrived,               // 已到厂
    EstimateReceived,      // 收到预估
    EstimateApproved,      // 预估已批准
    WorkInProgress,        // 施工中
    FinalEstimateReceived, // 收到最终结算
    FinalApproved,         // 最终结算已批准
    DispoToDestination,    // 出厂处置
    Closed,                // 已关闭
    Cancelled,             // 已取消
}

impl ShoppingState {
    /// 全部状态 (正向顺序 + CANCELLED)
    pub const ALL: [ShoppingState; 15] = [
        ShoppingState::Event,
        ShoppingState::Packet,
        ShoppingState::Sow,
        ShoppingState::ShopAssigned,
        ShoppingState::DispoToShop,
        ShoppingState::Enroute,
        ShoppingState::Arrived,
        ShoppingState::EstimateReceived,
        ShoppingState::EstimateApproved,
        ShoppingState::WorkInProgress,
        ShoppingState::FinalEstimateReceived,
        ShoppingState::FinalApproved,
        ShoppingState::DispoToDestination,
        ShoppingState::Closed,
        ShoppingState::Cancelled,
    ];

    /// 正向序号 (CANCELLED 无序号)
    pub fn ordinal(&self) -> Option<u8> {
        match self {
            ShoppingState::Cancelled => None,
            other => ShoppingState::ALL.iter().position(|s| s == other).map(|i| i as u8),
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShoppingState::Closed | ShoppingState::Cancelled)
    }

    /// 时间戳列名 (每个状态一列)
    pub fn timestamp_column(&self) -> &'static str {
        match self {
            ShoppingState::Event => "event_at",
            ShoppingState::Packet => "packet_at",
            ShoppingState::Sow => "sow_at",
            ShoppingState::ShopAssigned => "shop_assigned_at",
            ShoppingState::DispoToShop => "dispo_to_shop_at",
            ShoppingState::Enroute => "enroute_at",
            ShoppingState::Arrived => "arrived_at",
            ShoppingState::EstimateReceived => "estimate_received_at",
            ShoppingState::EstimateApproved => "estimate_approved_at",
            ShoppingState::WorkInProgress => "work_in_progress_at",
            ShoppingState::FinalEstimateReceived => "final_estimate_received_at",
            ShoppingState::FinalApproved => "final_approved_at",
            ShoppingState::DispoToDestination => "dispo_to_destination_at",
            ShoppingState::Closed => "closed_at",
            ShoppingState::Cancelled => "cancelled_at",
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ShoppingState::Event => "EVENT",
            ShoppingState::Packet => "PACKET",
            ShoppingState::Sow => "SOW",
            ShoppingState::ShopAssigned => "SHOP_ASSIGNED",
            ShoppingState::DispoToShop => "DISPO_TO_SHOP",
            ShoppingState::Enroute => "ENROUTE",
            ShoppingState::Arrived => "ARRIVED",
            ShoppingState::EstimateReceived => "ESTIMATE_RECEIVED",
            ShoppingState::EstimateApproved => "ESTIMATE_APPROVED",
            ShoppingState::WorkInProgress => "WORK_IN_PROGRESS",
            ShoppingState::FinalEstimateReceived => "FINAL_ESTIMATE_RECEIVED",
            ShoppingState::FinalApproved => "FINAL_APPROVED",
            ShoppingState::DispoToDestination => "DISPO_TO_DESTINATION",
            ShoppingState::Closed => "CLOSED",
            ShoppingState::Cancelled => "CANCELLED",
        }
    }

    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Option<Self> {
        let upper = s.trim().to_uppercase();
        ShoppingState::ALL
            .iter()
            .copied()
            .find(|state| state.to_db_str() == upper)
    }
}

impl fmt::Display for ShoppingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 出厂处置 (Disposition)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    ToCustomer,    // 返还客户
    ToStorage,     // 入库存放
    ToAnotherShop, // 转其他厂修
    ToScrap,       // 报废
}

impl Disposition {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Disposition::ToCustomer => "to_customer",
            Disposition::ToStorage => "to_storage",
            Disposition::ToAnotherShop => "to_another_shop",
            Disposition::ToScrap => "to_scrap",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "to_customer" => Some(Disposition::ToCustomer),
            "to_storage" => Some(Disposition::ToStorage),
            "to_another_shop" => Some(Disposition::ToAnotherShop),
            "to_scrap" => Some(Disposition::ToScrap),
            _ => None,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 规则评估结果 (Rule Outcome)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleOutcome {
    Pass,
    Fail,
    NotApplicable,
}

impl fmt::Display for RuleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleOutcome::Pass => write!(f, "PASS"),
            RuleOutcome::Fail => write!(f, "FAIL"),
            RuleOutcome::NotApplicable => write!(f, "NOT_APPLICABLE"),
        }
    }
}

// ==========================================
// 作业类型 (Work Type)
// ==========================================
// 顺序: cleaning 总是第一个
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    Cleaning, // 清洗
    Blast,    // 喷砂
    Lining,   // 内衬
    Paint,    // 涂装
}

impl WorkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkType::Cleaning => "cleaning",
            WorkType::Blast => "blast",
            WorkType::Lining => "lining",
            WorkType::Paint => "paint",
        }
    }
}

impl fmt::Display for WorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 清洗等级 (Cleaning Class)
// ==========================================
// 系数: A=1.0, B=1.25, C=1.5, D=2.0 (见 EngineConfig)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CleaningClass {
    A,
    B,
    C,
    D,
}

impl CleaningClass {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "A" => Some(CleaningClass::A),
            "B" => Some(CleaningClass::B),
            "C" => Some(CleaningClass::C),
            "D" => Some(CleaningClass::D),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            CleaningClass::A => "A",
            CleaningClass::B => "B",
            CleaningClass::C => "C",
            CleaningClass::D => "D",
        }
    }
}

impl fmt::Display for CleaningClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 分配状态 (Allocation Status)
// ==========================================
// 浅层状态: 不走完整生命周期状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStatus {
    Proposed,  // 预览 (未落库)
    Planned,   // 已落库, 占用产能
    Completed, // 已完工, 释放产能
    Cancelled, // 已取消, 退回产能
}

impl AllocationStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AllocationStatus::Proposed => "PROPOSED",
            AllocationStatus::Planned => "PLANNED",
            AllocationStatus::Completed => "COMPLETED",
            AllocationStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "PLANNED" => AllocationStatus::Planned,
            "COMPLETED" => AllocationStatus::Completed,
            "CANCELLED" => AllocationStatus::Cancelled,
            _ => AllocationStatus::Proposed,
        }
    }
}

impl fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 需求状态 (Demand Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DemandStatus {
    Pending,            // 待分配
    Allocated,          // 已全部分配
    PartiallyAllocated, // 部分分配 (有残量)
    Unallocated,        // 未能分配
}

impl DemandStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            DemandStatus::Pending => "PENDING",
            DemandStatus::Allocated => "ALLOCATED",
            DemandStatus::PartiallyAllocated => "PARTIALLY_ALLOCATED",
            DemandStatus::Unallocated => "UNALLOCATED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "ALLOCATED" => DemandStatus::Allocated,
            "PARTIALLY_ALLOCATED" => DemandStatus::PartiallyAllocated,
            "UNALLOCATED" => DemandStatus::Unallocated,
            _ => DemandStatus::Pending,
        }
    }

    /// 根据分配结果推导需求状态
    pub fn from_counts(requested: i64, allocated: i64) -> Self {
        if allocated >= requested {
            DemandStatus::Allocated
        } else if allocated <= 0 {
            DemandStatus::Unallocated
        } else {
            DemandStatus::PartiallyAllocated
        }
    }
}

impl fmt::Display for DemandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}
