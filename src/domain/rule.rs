// ==========================================
// 铁路罐车检修排程系统 - 准入规则领域模型
// ==========================================
// 红线: 规则是数据, 不是代码; 评估器只做通用解释
// ==========================================

use crate::domain::car::{CarAttribute, CarFlag};
use crate::domain::types::{RuleOutcome, WorkType};
use serde::{Deserialize, Serialize};

// ==========================================
// EligibilityRule - 准入规则
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityRule {
    pub rule_id: String,
    pub category: String,        // 规则类别, 如 CAPABILITY / COMMODITY / NETWORK
    pub priority: i32,           // 评估与输出顺序 (小者优先)
    pub is_blocking: bool,       // 阻断规则: FAIL 即不可准入
    #[serde(default)]
    pub description: Option<String>,
    pub condition: RuleCondition,
}

// ==========================================
// RuleCondition - 规则条件 (可序列化的条件树)
// ==========================================
// 存储: eligibility_rule.condition_json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    /// 厂修必须具备指定能力标签
    ShopHasCapability { capability: String },

    /// 厂修必须具备 `<prefix><车辆属性值>` 能力 (属性缺失 → 不适用)
    CarAttributeCapability {
        attribute: CarAttribute,
        capability_prefix: String,
    },

    /// 货物限制: 排除厂修 + 必备能力 (货物未知 → 不适用)
    CommodityAllowed,

    /// 厂修氮封能力等级 ≥ 车辆氮封阶段
    NitrogenStageSupported { level_name: String },

    /// 厂修所在区域在列表内
    ShopRegionIn { regions: Vec<String> },

    /// 仅限协议网络厂修
    PreferredNetworkOnly,

    /// 车辆标志位为真时才评估子条件, 否则不适用
    WhenCarFlag {
        flag: CarFlag,
        then: Box<RuleCondition>,
    },

    /// 需要指定作业类型时才评估子条件, 否则不适用
    WhenWorkRequired {
        work_type: WorkType,
        then: Box<RuleCondition>,
    },

    /// 全部满足 (忽略不适用项; 全部不适用 → 不适用)
    AllOf { conditions: Vec<RuleCondition> },

    /// 任一满足 (全部不适用 → 不适用)
    AnyOf { conditions: Vec<RuleCondition> },

    /// 无法解析的条件, 恒为不适用
    Unrecognized { raw: String },
}

impl RuleCondition {
    /// 从 JSON 解析条件, 解析失败时降级为 Unrecognized
    pub fn from_json(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|_| RuleCondition::Unrecognized {
            raw: raw.to_string(),
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// ==========================================
// RuleResult - 单条规则评估结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub category: String,
    pub priority: i32,
    pub is_blocking: bool,
    pub outcome: RuleOutcome,
    pub reason: String,
}

impl RuleResult {
    /// 阻断型失败
    pub fn is_blocking_failure(&self) -> bool {
        self.is_blocking && self.outcome == RuleOutcome::Fail
    }
}

// ==========================================
// EligibilityVerdict - 单个 (车, 厂) 评估结论
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityVerdict {
    pub eligible: bool,
    pub results: Vec<RuleResult>, // 按 priority 升序, 完整诊断列表
}

impl EligibilityVerdict {
    /// 全部失败规则 (含非阻断)
    pub fn failed_rules(&self) -> Vec<&RuleResult> {
        self.results
            .iter()
            .filter(|r| r.outcome == RuleOutcome::Fail)
            .collect()
    }

    /// 阻断型失败规则
    pub fn blocking_failures(&self) -> Vec<&RuleResult> {
        self.results.iter().filter(|r| r.is_blocking_failure()).collect()
    }
}
