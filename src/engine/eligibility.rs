// ==========================================
// 铁路罐车检修排程系统 - 准入规则评估器
// ==========================================
// 红线: 全部规则都评估 (不短路), 输出完整诊断列表
// 红线: 条件无法求值 (数据缺失/条件无法解析) → NOT_APPLICABLE, 绝不抛错
// ==========================================
// 输入: 车辆档案 + 厂修档案 (含能力集) + 货物限制 + 人工覆写
// 输出: EligibilityVerdict (eligible + 按 priority 升序的 RuleResult)
// ==========================================

use crate::domain::car::{required_work_types, CarProfile, CommodityCatalog, ShoppingOverrides};
use crate::domain::rule::{EligibilityRule, EligibilityVerdict, RuleCondition, RuleResult};
use crate::domain::shop::ShopProfile;
use crate::domain::types::RuleOutcome;
use tracing::instrument;

/// 单次评估的输入上下文
struct RuleContext<'a> {
    car: &'a CarProfile,
    shop: &'a ShopProfile,
    commodities: &'a CommodityCatalog,
    overrides: &'a ShoppingOverrides,
}

type ConditionOutcome = (RuleOutcome, String);

fn pass(reason: impl Into<String>) -> ConditionOutcome {
    (RuleOutcome::Pass, reason.into())
}

fn fail(reason: impl Into<String>) -> ConditionOutcome {
    (RuleOutcome::Fail, reason.into())
}

fn not_applicable(reason: impl Into<String>) -> ConditionOutcome {
    (RuleOutcome::NotApplicable, reason.into())
}

// ==========================================
// EligibilityEvaluator - 准入规则评估器
// ==========================================
pub struct EligibilityEvaluator {
    rules: Vec<EligibilityRule>,
}

impl EligibilityEvaluator {
    /// 创建评估器, 规则按 priority 升序 (同优先级保持输入顺序)
    pub fn new(mut rules: Vec<EligibilityRule>) -> Self {
        rules.sort_by_key(|r| r.priority);
        Self { rules }
    }

    pub fn rules(&self) -> &[EligibilityRule] {
        &self.rules
    }

    /// 评估单个 (车, 厂) 组合
    ///
    /// # 返回
    /// - eligible: 无阻断规则 FAIL
    /// - results: 每条规则一个结果, 顺序与规则 priority 一致
    #[instrument(skip_all, fields(car_number = %car.car_number, shop_code = %shop.shop_code))]
    pub fn evaluate(
        &self,
        car: &CarProfile,
        shop: &ShopProfile,
        commodities: &CommodityCatalog,
        overrides: &ShoppingOverrides,
    ) -> EligibilityVerdict {
        let ctx = RuleContext {
            car,
            shop,
            commodities,
            overrides,
        };

        let results: Vec<RuleResult> = self
            .rules
            .iter()
            .map(|rule| {
                let (outcome, reason) = if overrides.waived_rule_ids.contains(&rule.rule_id) {
                    not_applicable("waived")
                } else {
                    evaluate_condition(&rule.condition, &ctx)
                };
                tracing::debug!(rule_id = %rule.rule_id, outcome = %outcome, reason = %reason, "规则评估");
                RuleResult {
                    rule_id: rule.rule_id.clone(),
                    category: rule.category.clone(),
                    priority: rule.priority,
                    is_blocking: rule.is_blocking,
                    outcome,
                    reason,
                }
            })
            .collect();

        let eligible = !results.iter().any(RuleResult::is_blocking_failure);
        EligibilityVerdict { eligible, results }
    }
}

// ==========================================
// 条件解释器
// ==========================================
fn evaluate_condition(condition: &RuleCondition, ctx: &RuleContext<'_>) -> ConditionOutcome {
    match condition {
        RuleCondition::ShopHasCapability { capability } => {
            let Some(caps) = ctx.shop.capabilities.as_ref() else {
                return not_applicable("厂修能力数据缺失");
            };
            if caps.has(capability) {
                pass(format!("具备能力 {}", capability))
            } else {
                fail(format!("缺少能力 {}", capability))
            }
        }

        RuleCondition::CarAttributeCapability {
            attribute,
            capability_prefix,
        } => {
            let Some(value) = ctx.car.attribute(*attribute) else {
                return not_applicable(format!("车辆属性 {:?} 缺失", attribute));
            };
            let Some(caps) = ctx.shop.capabilities.as_ref() else {
                return not_applicable("厂修能力数据缺失");
            };
            let tag = format!("{}{}", capability_prefix, value);
            if caps.has(&tag) {
                pass(format!("具备能力 {}", tag))
            } else {
                fail(format!("缺少能力 {}", tag))
            }
        }

        RuleCondition::CommodityAllowed => {
            let Some(code) = ctx.car.commodity_code.as_deref() else {
                return not_applicable("车辆无货物代码");
            };
            let Some(commodity) = ctx.commodities.get(code) else {
                return not_applicable(format!("货物 {} 无参考数据", code));
            };
            if commodity
                .excluded_shops
                .iter()
                .any(|s| s == &ctx.shop.shop_code)
            {
                return fail(format!("货物 {} 禁止在 {} 检修", code, ctx.shop.shop_code));
            }
            if commodity.required_capabilities.is_empty() {
                return pass(format!("货物 {} 无限制", code));
            }
            let Some(caps) = ctx.shop.capabilities.as_ref() else {
                return not_applicable("厂修能力数据缺失");
            };
            let missing: Vec<&str> = commodity
                .required_capabilities
                .iter()
                .filter(|c| !caps.has(c))
                .map(String::as_str)
                .collect();
            if missing.is_empty() {
                pass(format!("满足货物 {} 的能力要求", code))
            } else {
                fail(format!("货物 {} 要求能力: {}", code, missing.join(", ")))
            }
        }

        RuleCondition::NitrogenStageSupported { level_name } => {
            let stage = match ctx.car.nitrogen_pad_stage {
                Some(stage) if stage > 0 => stage,
                _ => return not_applicable("车辆无氮封"),
            };
            let Some(caps) = ctx.shop.capabilities.as_ref() else {
                return not_applicable("厂修能力数据缺失");
            };
            let level = caps.level(level_name).unwrap_or(0);
            if level >= stage {
                pass(format!("{}={} ≥ 氮封阶段 {}", level_name, level, stage))
            } else {
                fail(format!("{}={} < 氮封阶段 {}", level_name, level, stage))
            }
        }

        RuleCondition::ShopRegionIn { regions } => {
            if regions.is_empty() {
                return not_applicable("区域列表为空");
            }
            if regions
                .iter()
                .any(|r| r.eq_ignore_ascii_case(&ctx.shop.region))
            {
                pass(format!("区域 {} 在允许列表内", ctx.shop.region))
            } else {
                fail(format!("区域 {} 不在允许列表内", ctx.shop.region))
            }
        }

        RuleCondition::PreferredNetworkOnly => {
            if ctx.shop.is_preferred_network {
                pass("协议网络厂修")
            } else {
                fail("非协议网络厂修")
            }
        }

        RuleCondition::WhenCarFlag { flag, then } => {
            if ctx.car.flag(*flag) {
                evaluate_condition(then, ctx)
            } else {
                not_applicable(format!("车辆标志 {:?} 未置位", flag))
            }
        }

        RuleCondition::WhenWorkRequired { work_type, then } => {
            if required_work_types(ctx.car, ctx.overrides).contains(work_type) {
                evaluate_condition(then, ctx)
            } else {
                not_applicable(format!("无需 {} 作业", work_type))
            }
        }

        RuleCondition::AllOf { conditions } => {
            let outcomes: Vec<ConditionOutcome> =
                conditions.iter().map(|c| evaluate_condition(c, ctx)).collect();
            let failures: Vec<&str> = outcomes
                .iter()
                .filter(|(o, _)| *o == RuleOutcome::Fail)
                .map(|(_, r)| r.as_str())
                .collect();
            if !failures.is_empty() {
                fail(failures.join("; "))
            } else if outcomes.iter().any(|(o, _)| *o == RuleOutcome::Pass) {
                pass("全部条件满足")
            } else {
                not_applicable("全部子条件不适用")
            }
        }

        RuleCondition::AnyOf { conditions } => {
            let outcomes: Vec<ConditionOutcome> =
                conditions.iter().map(|c| evaluate_condition(c, ctx)).collect();
            if let Some((_, reason)) = outcomes.iter().find(|(o, _)| *o == RuleOutcome::Pass) {
                pass(reason.clone())
            } else if outcomes.iter().any(|(o, _)| *o == RuleOutcome::Fail) {
                let reasons: Vec<&str> = outcomes
                    .iter()
                    .filter(|(o, _)| *o == RuleOutcome::Fail)
                    .map(|(_, r)| r.as_str())
                    .collect();
                fail(format!("无一满足: {}", reasons.join("; ")))
            } else {
                not_applicable("全部子条件不适用")
            }
        }

        RuleCondition::Unrecognized { .. } => not_applicable("无法解析的规则条件"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::car::{CarAttribute, CarFlag, Commodity};
    use crate::domain::shop::ShopCapabilities;
    use std::collections::BTreeMap;

    fn shop(code: &str, tags: &[&str]) -> ShopProfile {
        ShopProfile {
            shop_code: code.to_string(),
            shop_name: format!("Shop {}", code),
            region: "GULF".to_string(),
            is_preferred_network: false,
            labor_rate: 100.0,
            labor_rates_by_work: BTreeMap::new(),
            material_multiplier: 1.0,
            capabilities: Some(ShopCapabilities {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                levels: BTreeMap::new(),
            }),
            backlog_hours: None,
            quality_score: None,
            is_active: true,
        }
    }

    fn rule(id: &str, priority: i32, blocking: bool, condition: RuleCondition) -> EligibilityRule {
        EligibilityRule {
            rule_id: id.to_string(),
            category: "CAPABILITY".to_string(),
            priority,
            is_blocking: blocking,
            description: None,
            condition,
        }
    }

    fn hazmat_car() -> CarProfile {
        let mut car = CarProfile::new("UTLX2001");
        car.is_hazmat = true;
        car.lining_type = Some("EPOXY".to_string());
        car
    }

    #[test]
    fn test_blocking_failure_makes_ineligible_and_is_reported() {
        let evaluator = EligibilityEvaluator::new(vec![
            rule(
                "R_HAZ",
                10,
                true,
                RuleCondition::WhenCarFlag {
                    flag: CarFlag::Hazmat,
                    then: Box::new(RuleCondition::ShopHasCapability {
                        capability: "hazmat".to_string(),
                    }),
                },
            ),
            rule("R_NET", 20, false, RuleCondition::PreferredNetworkOnly),
        ]);

        let verdict = evaluator.evaluate(
            &hazmat_car(),
            &shop("S1", &[]),
            &CommodityCatalog::new(),
            &ShoppingOverrides::default(),
        );
        assert!(!verdict.eligible);
        assert_eq!(verdict.results.len(), 2);
        assert_eq!(verdict.blocking_failures()[0].rule_id, "R_HAZ");
        assert_eq!(verdict.failed_rules().len(), 2);
    }

    #[test]
    fn test_non_blocking_failure_keeps_shop_eligible() {
        let evaluator =
            EligibilityEvaluator::new(vec![rule("R_NET", 1, false, RuleCondition::PreferredNetworkOnly)]);
        let verdict = evaluator.evaluate(
            &CarProfile::new("C1"),
            &shop("S1", &[]),
            &CommodityCatalog::new(),
            &ShoppingOverrides::default(),
        );
        assert!(verdict.eligible);
        assert_eq!(verdict.results[0].outcome, RuleOutcome::Fail);
    }

    #[test]
    fn test_results_ordered_by_priority() {
        let evaluator = EligibilityEvaluator::new(vec![
            rule("R3", 30, false, RuleCondition::PreferredNetworkOnly),
            rule("R1", 10, false, RuleCondition::PreferredNetworkOnly),
            rule("R2", 20, false, RuleCondition::PreferredNetworkOnly),
        ]);
        let verdict = evaluator.evaluate(
            &CarProfile::new("C1"),
            &shop("S1", &[]),
            &CommodityCatalog::new(),
            &ShoppingOverrides::default(),
        );
        let ids: Vec<&str> = verdict.results.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["R1", "R2", "R3"]);
    }

    #[test]
    fn test_missing_data_is_not_applicable() {
        let mut no_caps = shop("S1", &[]);
        no_caps.capabilities = None;
        let evaluator = EligibilityEvaluator::new(vec![
            rule(
                "R_CAP",
                1,
                true,
                RuleCondition::ShopHasCapability {
                    capability: "hazmat".to_string(),
                },
            ),
            rule(
                "R_BAD",
                2,
                true,
                RuleCondition::from_json(r#"{"type":"future_condition","x":1}"#),
            ),
            rule("R_COMM", 3, true, RuleCondition::CommodityAllowed),
        ]);
        let verdict = evaluator.evaluate(
            &hazmat_car(),
            &no_caps,
            &CommodityCatalog::new(),
            &ShoppingOverrides::default(),
        );
        assert!(verdict.eligible);
        assert!(verdict
            .results
            .iter()
            .all(|r| r.outcome == RuleOutcome::NotApplicable));
    }

    #[test]
    fn test_lining_capability_from_car_attribute() {
        let evaluator = EligibilityEvaluator::new(vec![rule(
            "R_LINING",
            1,
            true,
            RuleCondition::CarAttributeCapability {
                attribute: CarAttribute::LiningType,
                capability_prefix: "lining:".to_string(),
            },
        )]);
        let car = hazmat_car();
        let commodities = CommodityCatalog::new();
        let overrides = ShoppingOverrides::default();

        assert!(evaluator
            .evaluate(&car, &shop("S1", &["lining:EPOXY"]), &commodities, &overrides)
            .eligible);
        assert!(!evaluator
            .evaluate(&car, &shop("S2", &["lining:RUBBER"]), &commodities, &overrides)
            .eligible);
    }

    #[test]
    fn test_commodity_restrictions() {
        let mut catalog = CommodityCatalog::new();
        catalog.insert(
            "CHLORINE".to_string(),
            Commodity {
                commodity_code: "CHLORINE".to_string(),
                name: None,
                cleaning_class: None,
                kosher_required: false,
                recommended_cleaning_price: None,
                excluded_shops: vec!["S2".to_string()],
                required_capabilities: vec!["chlorine".to_string()],
            },
        );
        let mut car = CarProfile::new("C1");
        car.commodity_code = Some("CHLORINE".to_string());
        let evaluator =
            EligibilityEvaluator::new(vec![rule("R_COMM", 1, true, RuleCondition::CommodityAllowed)]);
        let overrides = ShoppingOverrides::default();

        assert!(evaluator
            .evaluate(&car, &shop("S1", &["chlorine"]), &catalog, &overrides)
            .eligible);
        assert!(!evaluator
            .evaluate(&car, &shop("S2", &["chlorine"]), &catalog, &overrides)
            .eligible);
        assert!(!evaluator
            .evaluate(&car, &shop("S3", &[]), &catalog, &overrides)
            .eligible);
    }

    #[test]
    fn test_waived_rule_is_not_applicable() {
        let evaluator =
            EligibilityEvaluator::new(vec![rule("R_NET", 1, true, RuleCondition::PreferredNetworkOnly)]);
        let mut overrides = ShoppingOverrides::default();
        overrides.waived_rule_ids.insert("R_NET".to_string());
        let verdict = evaluator.evaluate(
            &CarProfile::new("C1"),
            &shop("S1", &[]),
            &CommodityCatalog::new(),
            &overrides,
        );
        assert!(verdict.eligible);
        assert_eq!(verdict.results[0].reason, "waived");
    }

    #[test]
    fn test_nitrogen_stage_level() {
        let mut s = shop("S1", &[]);
        if let Some(caps) = s.capabilities.as_mut() {
            caps.levels.insert("nitrogen_stage".to_string(), 2);
        }
        let mut car = CarProfile::new("C1");
        car.nitrogen_pad_stage = Some(3);
        let evaluator = EligibilityEvaluator::new(vec![rule(
            "R_N2",
            1,
            true,
            RuleCondition::NitrogenStageSupported {
                level_name: "nitrogen_stage".to_string(),
            },
        )]);
        let verdict = evaluator.evaluate(&car, &s, &CommodityCatalog::new(), &ShoppingOverrides::default());
        assert!(!verdict.eligible);

        car.nitrogen_pad_stage = Some(2);
        let verdict = evaluator.evaluate(&car, &s, &CommodityCatalog::new(), &ShoppingOverrides::default());
        assert!(verdict.eligible);
    }
}
