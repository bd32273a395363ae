use serde::{Deserialize, Serialize};

/// 方案权重配置（持久化对象）
///
/// 存储位置：scenario 表；被已提交分配引用后锁定（locked=1），不可再改权重，
/// 以保证历史方案对比可复现。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioWeights {
    /// 方案 ID（用于选择/引用）
    pub scenario_id: String,

    /// 显示名称
    pub name: String,

    /// 说明（可选）
    #[serde(default)]
    pub description: Option<String>,

    /// 成本权重（百分比）
    pub cost: f64,

    /// 产能均衡权重（百分比，积压越少得分越高）
    pub capacity_balance: f64,

    /// 协议网络偏好权重（百分比）
    pub network_preference: f64,

    /// 质量权重（百分比）
    pub quality: f64,

    /// 是否系统默认方案
    #[serde(default)]
    pub is_default: bool,

    /// 是否已锁定
    #[serde(default)]
    pub locked: bool,
}

impl Default for ScenarioWeights {
    fn default() -> Self {
        Self {
            scenario_id: "balanced".to_string(),
            name: "均衡".to_string(),
            description: None,
            cost: 40.0,
            capacity_balance: 20.0,
            network_preference: 20.0,
            quality: 20.0,
            is_default: true,
            locked: false,
        }
    }
}

impl ScenarioWeights {
    /// 权重合计（概念上为 100）
    pub fn total(&self) -> f64 {
        self.cost + self.capacity_balance + self.network_preference + self.quality
    }

    /// 校验：权重非负、有限且合计大于 0
    pub fn validate(&self) -> Result<(), String> {
        let weights = [
            ("cost", self.cost),
            ("capacity_balance", self.capacity_balance),
            ("network_preference", self.network_preference),
            ("quality", self.quality),
        ];
        for (name, w) in weights {
            if !w.is_finite() || w < 0.0 {
                return Err(format!("权重 {} 无效: {}", name, w));
            }
        }
        if self.total() <= 0.0 {
            return Err("权重合计必须大于 0".to_string());
        }
        Ok(())
    }
}
