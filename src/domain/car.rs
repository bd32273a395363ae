// ==========================================
// 铁路罐车检修排程系统 - 车辆档案领域模型
// ==========================================
// 红线: 车辆档案为只读快照, 本核心从不修改
// ==========================================

use crate::domain::types::{CleaningClass, WorkType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

// ==========================================
// CarProfile - 车辆档案快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarProfile {
    pub car_number: String,                 // 车号
    #[serde(default)]
    pub product_type: Option<String>,       // 车型/材质类型
    #[serde(default)]
    pub lining_type: Option<String>,        // 现有内衬类型
    #[serde(default)]
    pub commodity_code: Option<String>,     // 装载货物代码
    #[serde(default)]
    pub is_hazmat: bool,                    // 危险品
    #[serde(default)]
    pub requires_asbestos_abatement: bool,  // 需石棉处理
    #[serde(default)]
    pub nitrogen_pad_stage: Option<i32>,    // 氮封阶段
}

impl CarProfile {
    pub fn new(car_number: impl Into<String>) -> Self {
        Self {
            car_number: car_number.into(),
            product_type: None,
            lining_type: None,
            commodity_code: None,
            is_hazmat: false,
            requires_asbestos_abatement: false,
            nitrogen_pad_stage: None,
        }
    }

    /// 读取车辆属性值 (空串视为缺失)
    pub fn attribute(&self, attribute: CarAttribute) -> Option<&str> {
        let value = match attribute {
            CarAttribute::ProductType => self.product_type.as_deref(),
            CarAttribute::LiningType => self.lining_type.as_deref(),
            CarAttribute::CommodityCode => self.commodity_code.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    /// 车辆标志位
    pub fn flag(&self, flag: CarFlag) -> bool {
        match flag {
            CarFlag::Hazmat => self.is_hazmat,
            CarFlag::AsbestosAbatement => self.requires_asbestos_abatement,
            CarFlag::Lined => self.attribute(CarAttribute::LiningType).is_some(),
            CarFlag::NitrogenPadded => self.nitrogen_pad_stage.map(|s| s > 0).unwrap_or(false),
        }
    }
}

/// 可被规则引用的车辆属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarAttribute {
    ProductType,
    LiningType,
    CommodityCode,
}

/// 可被规则引用的车辆标志位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarFlag {
    Hazmat,
    AsbestosAbatement,
    Lined,
    NitrogenPadded,
}

// ==========================================
// Commodity - 货物参考数据 (含限制)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commodity {
    pub commodity_code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cleaning_class: Option<CleaningClass>,
    #[serde(default)]
    pub kosher_required: bool,
    #[serde(default)]
    pub recommended_cleaning_price: Option<f64>,
    #[serde(default)]
    pub excluded_shops: Vec<String>,        // 禁止承接的厂修
    #[serde(default)]
    pub required_capabilities: Vec<String>, // 承接厂修必须具备的能力
}

/// 货物代码 → 货物参考数据
pub type CommodityCatalog = HashMap<String, Commodity>;

// ==========================================
// ShoppingOverrides - 人工覆写
// ==========================================
// 同时作用于准入评估与成本估算
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShoppingOverrides {
    #[serde(default)]
    pub blast: bool,
    #[serde(default)]
    pub lining: bool,
    #[serde(default)]
    pub paint: bool,
    #[serde(default)]
    pub kosher: bool,
    #[serde(default)]
    pub asbestos_abatement: bool,
    #[serde(default)]
    pub waived_rule_ids: BTreeSet<String>,
}

/// 推导所需作业类型
///
/// 规则:
/// - cleaning 总是需要
/// - lining: 覆写要求 或 车辆已有内衬
/// - blast: 覆写要求 或 需要 lining (内衬前必须喷砂)
/// - paint: 仅覆写要求
pub fn required_work_types(car: &CarProfile, overrides: &ShoppingOverrides) -> Vec<WorkType> {
    let mut work = vec![WorkType::Cleaning];
    let lining = overrides.lining || car.flag(CarFlag::Lined);
    if overrides.blast || lining {
        work.push(WorkType::Blast);
    }
    if lining {
        work.push(WorkType::Lining);
    }
    if overrides.paint {
        work.push(WorkType::Paint);
    }
    work
}
