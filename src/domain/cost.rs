// ==========================================
// 铁路罐车检修排程系统 - 成本明细领域模型
// ==========================================
// 红线: total = 四项分量之和 (各分量先取两位小数)
// ==========================================

use crate::domain::types::WorkType;
use serde::{Deserialize, Serialize};

/// 按货币最小单位 (分) 四舍五入
pub fn round_currency(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0).round() / 100.0
}

// ==========================================
// CostBreakdown - 成本明细
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub labor_cost: f64,
    pub material_cost: f64,
    pub abatement_cost: f64,
    pub freight_cost: f64,
    pub total_cost: f64,

    pub work_types: Vec<WorkType>,   // 本次估算包含的作业类型
    pub labor_lines: Vec<LaborLine>, // 工时明细
    #[serde(default)]
    pub fallbacks: Vec<String>,      // 触发的降级路径说明
}

/// 单项作业工时明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaborLine {
    pub work_type: WorkType,
    pub billed_hours: f64,
    pub rate: f64,
    pub amount: f64,
}

impl CostBreakdown {
    /// 由四项分量构造, 统一取整并计算合计
    pub fn from_components(
        labor_cost: f64,
        material_cost: f64,
        abatement_cost: f64,
        freight_cost: f64,
        work_types: Vec<WorkType>,
        labor_lines: Vec<LaborLine>,
        fallbacks: Vec<String>,
    ) -> Self {
        let labor_cost = round_currency(labor_cost);
        let material_cost = round_currency(material_cost);
        let abatement_cost = round_currency(abatement_cost);
        let freight_cost = round_currency(freight_cost);
        let total_cost = round_currency(labor_cost + material_cost + abatement_cost + freight_cost);

        Self {
            labor_cost,
            material_cost,
            abatement_cost,
            freight_cost,
            total_cost,
            work_types,
            labor_lines,
            fallbacks,
        }
    }

    /// 合计是否与分量一致
    pub fn is_consistent(&self) -> bool {
        let expected = round_currency(
            self.labor_cost + self.material_cost + self.abatement_cost + self.freight_cost,
        );
        (expected - self.total_cost).abs() < 0.005
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_currency() {
        assert_eq!(round_currency(10.006), 10.01);
        assert_eq!(round_currency(10.004), 10.0);
        assert_eq!(round_currency(f64::NAN), 0.0);
    }

    #[test]
    fn test_total_is_sum_of_rounded_components() {
        let breakdown = CostBreakdown::from_components(
            100.333,
            200.336,
            0.0,
            50.111,
            vec![WorkType::Cleaning],
            vec![],
            vec![],
        );
        assert_eq!(breakdown.labor_cost, 100.33);
        assert_eq!(breakdown.material_cost, 200.34);
        assert_eq!(breakdown.freight_cost, 50.11);
        assert_eq!(breakdown.total_cost, 350.78);
        assert!(breakdown.is_consistent());
    }
}
