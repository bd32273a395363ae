// ==========================================
// 铁路罐车检修排程系统 - 厂修档案领域模型
// ==========================================
// 红线: 参考数据, 只读
// ==========================================

use crate::domain::types::WorkType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ==========================================
// ShopProfile - 厂修档案
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopProfile {
    pub shop_code: String,
    pub shop_name: String,
    pub region: String,
    pub is_preferred_network: bool,

    // ===== 成本参数 =====
    pub labor_rate: f64,                              // 默认工时单价
    #[serde(default)]
    pub labor_rates_by_work: BTreeMap<WorkType, f64>, // 按作业类型的工时单价
    pub material_multiplier: f64,                     // 材料成本系数

    // ===== 能力与质量 =====
    #[serde(default)]
    pub capabilities: Option<ShopCapabilities>,       // None 表示能力数据缺失
    #[serde(default)]
    pub backlog_hours: Option<f64>,                   // 积压工时
    #[serde(default)]
    pub quality_score: Option<f64>,                   // 质量基线 (0-100)

    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl ShopProfile {
    /// 作业类型对应工时单价, 无专用单价时回退默认单价
    pub fn rate_for(&self, work_type: WorkType) -> f64 {
        self.labor_rates_by_work
            .get(&work_type)
            .copied()
            .filter(|r| r.is_finite() && *r >= 0.0)
            .unwrap_or(self.labor_rate)
    }
}

// ==========================================
// ShopCapabilities - 厂修能力集
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShopCapabilities {
    #[serde(default)]
    pub tags: BTreeSet<String>,          // 能力标签, 如 "hazmat", "lining:EPOXY"
    #[serde(default)]
    pub levels: BTreeMap<String, i32>,   // 分级能力, 如 "nitrogen_stage" → 3
}

impl ShopCapabilities {
    pub fn has(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn level(&self, name: &str) -> Option<i32> {
        self.levels.get(name).copied()
    }
}
