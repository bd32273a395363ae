// ==========================================
// 铁路罐车检修排程系统 - 产能台账领域模型
// ==========================================
// 红线: allocated_count - total_capacity ≤ ceil(total_capacity × 超额比例)
// 用途: (厂修, 月份) 槽位计数, 有界超额承诺
// ==========================================

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// PlanMonth - 计划月份 (YYYY-MM)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlanMonth {
    year: i32,
    month: u32,
}

impl PlanMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && (1900..=9999).contains(&year) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// 解析 "YYYY-MM"
    pub fn parse(s: &str) -> Option<Self> {
        let (y, m) = s.trim().split_once('-')?;
        if y.len() != 4 || m.len() != 2 {
            return None;
        }
        Self::new(y.parse().ok()?, m.parse().ok()?)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// 下一个月
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for PlanMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl TryFrom<String> for PlanMonth {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PlanMonth::parse(&value).ok_or_else(|| format!("无效的月份格式: {}", value))
    }
}

impl From<PlanMonth> for String {
    fn from(value: PlanMonth) -> Self {
        value.to_string()
    }
}

/// 超额上限: ceil(total × percent / 100), 整数运算
pub fn overcommit_ceiling(total_capacity: i64, overcommit_percent: u32) -> i64 {
    if total_capacity <= 0 {
        return 0;
    }
    (total_capacity * overcommit_percent as i64 + 99) / 100
}

// ==========================================
// CapacityRecord - (厂修, 月份) 产能记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityRecord {
    pub shop_code: String,
    pub month: PlanMonth,
    pub total_capacity: i64,  // 名义产能 (车数)
    pub allocated_count: i64, // 已占用
    pub completed_count: i64, // 已完工 (只增不减)
}

// ==========================================
// Trait: CapacityConstraint
// ==========================================
// 用途: 台账预留检查接口
pub trait CapacityConstraint {
    /// 检查是否可在超额上限内预留 count 个槽位
    fn can_reserve(&self, count: i64, overcommit_percent: u32) -> bool;

    /// 名义剩余产能 (不含超额部分)
    fn available(&self) -> i64;

    /// 是否已超出名义产能
    fn is_overcommitted(&self) -> bool;

    /// 占用率 (allocated / total)
    fn utilization(&self) -> f64;
}

impl CapacityConstraint for CapacityRecord {
    fn can_reserve(&self, count: i64, overcommit_percent: u32) -> bool {
        if count <= 0 {
            return false;
        }
        self.allocated_count + count - self.total_capacity
            <= overcommit_ceiling(self.total_capacity, overcommit_percent)
    }

    fn available(&self) -> i64 {
        (self.total_capacity - self.allocated_count).max(0)
    }

    fn is_overcommitted(&self) -> bool {
        self.allocated_count > self.total_capacity
    }

    fn utilization(&self) -> f64 {
        if self.total_capacity <= 0 {
            return 0.0;
        }
        self.allocated_count as f64 / self.total_capacity as f64
    }
}

/// 预留结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReserveOutcome {
    Reserved {
        allocated_count: i64,
    },
    Rejected {
        total_capacity: i64,
        allocated_count: i64,
        ceiling: i64,
    },
}

impl ReserveOutcome {
    pub fn is_reserved(&self) -> bool {
        matches!(self, ReserveOutcome::Reserved { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(total: i64, allocated: i64) -> CapacityRecord {
        CapacityRecord {
            shop_code: "S1".to_string(),
            month: PlanMonth::new(2026, 3).unwrap(),
            total_capacity: total,
            allocated_count: allocated,
            completed_count: 0,
        }
    }

    #[test]
    fn test_overcommit_ceiling_rounds_up() {
        assert_eq!(overcommit_ceiling(50, 10), 5);
        assert_eq!(overcommit_ceiling(30, 10), 3);
        assert_eq!(overcommit_ceiling(31, 10), 4);
        assert_eq!(overcommit_ceiling(1, 10), 1);
        assert_eq!(overcommit_ceiling(0, 10), 0);
    }

    #[test]
    fn test_can_reserve_within_ceiling() {
        assert!(record(50, 50).can_reserve(5, 10));
        assert!(!record(50, 50).can_reserve(6, 10));
        assert!(!record(0, 0).can_reserve(1, 10));
        assert!(!record(50, 0).can_reserve(0, 10));
    }

    #[test]
    fn test_available_never_negative() {
        assert_eq!(record(10, 4).available(), 6);
        assert_eq!(record(10, 11).available(), 0);
        assert!(record(10, 11).is_overcommitted());
    }

    #[test]
    fn test_plan_month_parse_and_display() {
        let month = PlanMonth::parse("2026-03").unwrap();
        assert_eq!(month.to_string(), "2026-03");
        assert_eq!(PlanMonth::parse("2026-12").unwrap().next().to_string(), "2027-01");
        assert!(PlanMonth::parse("2026-13").is_none());
        assert!(PlanMonth::parse("26-03").is_none());
    }
}
