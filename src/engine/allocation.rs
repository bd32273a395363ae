// ==========================================
// 铁路罐车检修排程系统 - 厂修排名与分配引擎
// ==========================================
// 流程 (逐需求, 按输入顺序):
// 1. 解析方案 (显式 ID 有效则用, 否则系统默认)
// 2. 计划窗口内台账快照 (available = total - allocated)
// 3. 准入评估 + 需求约束 + 快照有余量 → 候选厂修
// 4. 无候选: 警告 + 全部车数计入未分配, 继续下一个需求
// 5. 评分排序 (分数降序, 稳定)
// 6. 贪心消耗: 每厂 min(剩余需求, 剩余产能), 扣减快照; 残量警告
// 7. 非预览: 逐条提交 (实时预留重新校验上限), 首个硬错误即停止, 已提交不回滚
// ==========================================
// 红线: 单个需求失败不中断批次
// 红线: 提交阶段才写台账, 快照只用于计划
// ==========================================

use crate::config::engine_config::EngineConfig;
use crate::config::scenario_profile::ScenarioWeights;
use crate::domain::allocation::{
    Allocation, AllocationBatchResult, AllocationSummary, AllocationWarning, WarningCode,
};
use crate::domain::capacity::{CapacityRecord, PlanMonth};
use crate::domain::demand::Demand;
use crate::domain::shop::ShopProfile;
use crate::domain::types::{AllocationStatus, DemandStatus};
use crate::engine::cost_estimator::{CostEstimator, DistanceProvider, RegionDistanceTable};
use crate::engine::eligibility::EligibilityEvaluator;
use crate::engine::repositories::AllocationRepositories;
use crate::engine::scoring::{rank_by_score, ShopScorer};
use crate::engine::shop_evaluation::{EvaluationResult, ShopEvaluator};
use crate::perf::PerfGuard;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

// ==========================================
// CapacitySnapshot - 本次运行的本地台账快照
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CapacitySnapshot {
    available: HashMap<(String, PlanMonth), i64>,
}

impl CapacitySnapshot {
    pub fn from_records(records: &[CapacityRecord]) -> Self {
        let available = records
            .iter()
            .map(|r| {
                (
                    (r.shop_code.clone(), r.month),
                    (r.total_capacity - r.allocated_count).max(0),
                )
            })
            .collect();
        Self { available }
    }

    /// 剩余产能 (无记录视为 0)
    pub fn available(&self, shop_code: &str, month: PlanMonth) -> i64 {
        self.available
            .get(&(shop_code.to_string(), month))
            .copied()
            .unwrap_or(0)
    }

    fn consume(&mut self, shop_code: &str, month: PlanMonth, count: i64) {
        if let Some(v) = self.available.get_mut(&(shop_code.to_string(), month)) {
            *v = (*v - count).max(0);
        }
    }
}

/// 单个需求的计划结果
#[derive(Debug, Clone, Default)]
pub struct DemandPlan {
    pub allocations: Vec<Allocation>,
    pub warnings: Vec<AllocationWarning>,
    pub unallocated: i64,
}

/// 候选厂修 (准入 + 有产能 + 满足需求约束)
struct Candidate<'a> {
    shop: &'a ShopProfile,
    evaluation: EvaluationResult,
    score: f64,
}

// ==========================================
// DemandPlanner - 纯计算, 不访问数据库
// ==========================================
pub struct DemandPlanner<'a> {
    shop_evaluator: &'a ShopEvaluator,
    scorer: &'a ShopScorer,
    shops: &'a [ShopProfile],
}

impl<'a> DemandPlanner<'a> {
    pub fn new(
        shop_evaluator: &'a ShopEvaluator,
        scorer: &'a ShopScorer,
        shops: &'a [ShopProfile],
    ) -> Self {
        Self {
            shop_evaluator,
            scorer,
            shops,
        }
    }

    /// 为单个需求生成分配 (扣减快照)
    #[instrument(skip(self, snapshot, demand), fields(demand_id = %demand.demand_id, car_count = demand.car_count))]
    pub fn plan(&self, demand: &Demand, run_id: &str, snapshot: &mut CapacitySnapshot) -> DemandPlan {
        let mut plan = DemandPlan::default();
        if demand.car_count <= 0 {
            return plan;
        }

        let month = demand.target_month;
        let mut candidates: Vec<Candidate<'a>> = self
            .shops
            .iter()
            .filter(|shop| demand.accepts_shop(&shop.shop_code, &shop.region))
            .filter(|shop| snapshot.available(&shop.shop_code, month) > 0)
            .filter_map(|shop| {
                let evaluation = self.shop_evaluator.evaluate_one(
                    &demand.car_profile,
                    shop,
                    &demand.overrides,
                    demand.origin_region.as_deref(),
                );
                if !evaluation.eligible {
                    return None;
                }
                let score = self.scorer.score(evaluation.cost.total_cost, shop).total;
                Some(Candidate {
                    shop,
                    evaluation,
                    score,
                })
            })
            .collect();

        if candidates.is_empty() {
            tracing::warn!(demand_id = %demand.demand_id, "无准入且有产能的厂修");
            plan.warnings.push(AllocationWarning::new(
                Some(&demand.demand_id),
                WarningCode::NoEligibleShop,
                format!(
                    "需求 {} 无准入且有产能的厂修 (月份 {}), {} 辆未分配",
                    demand.demand_id, month, demand.car_count
                ),
            ));
            plan.unallocated = demand.car_count;
            return plan;
        }

        rank_by_score(&mut candidates, |c| c.score);

        let now = Utc::now();
        let mut remaining = demand.car_count;
        for (index, candidate) in candidates.iter().enumerate() {
            if remaining == 0 {
                break;
            }
            let shop_code = &candidate.shop.shop_code;
            let take = remaining.min(snapshot.available(shop_code, month));
            if take <= 0 {
                continue;
            }
            for _ in 0..take {
                plan.allocations.push(Allocation {
                    allocation_id: Uuid::new_v4().to_string(),
                    run_id: run_id.to_string(),
                    demand_id: demand.demand_id.clone(),
                    scenario_id: self.scorer.weights().scenario_id.clone(),
                    car_number: None,
                    shop_code: shop_code.clone(),
                    is_preferred_network: candidate.shop.is_preferred_network,
                    target_month: month,
                    cost: candidate.evaluation.cost.clone(),
                    score: candidate.score,
                    rank: index + 1,
                    status: AllocationStatus::Proposed,
                    created_at: now,
                });
            }
            snapshot.consume(shop_code, month, take);
            remaining -= take;
            tracing::debug!(shop_code = %shop_code, take, remaining, score = candidate.score, "分配到厂修");
        }

        if remaining > 0 {
            tracing::warn!(demand_id = %demand.demand_id, remaining, "产能不足, 需求有残量");
            plan.warnings.push(AllocationWarning::new(
                Some(&demand.demand_id),
                WarningCode::ResidualDemand,
                format!(
                    "需求 {} 产能不足, {} 辆未分配",
                    demand.demand_id, remaining
                ),
            ));
            plan.unallocated = remaining;
        }
        plan
    }
}

// ==========================================
// AllocationEngine - 分配运行编排
// ==========================================
pub struct AllocationEngine {
    repos: AllocationRepositories,
    config: EngineConfig,
    distances: Option<Arc<dyn DistanceProvider>>,
}

impl AllocationEngine {
    pub fn new(repos: AllocationRepositories, config: EngineConfig) -> Self {
        Self {
            repos,
            config,
            distances: None,
        }
    }

    /// 替换运费距离来源 (默认使用配置中的区域距离表)
    pub fn with_distance_provider(mut self, distances: Arc<dyn DistanceProvider>) -> Self {
        self.distances = Some(distances);
        self
    }

    /// 生成分配
    ///
    /// # 参数
    /// - demand_ids: 需求 ID (处理顺序即输入顺序)
    /// - scenario_id: 方案 ID, 无效时回退系统默认
    /// - preview_only: true 时不落库、不占用台账、不推进需求状态
    ///
    /// # 返回
    /// - Ok: 分配列表 + 汇总 + 警告 (单个需求失败只产生警告)
    /// - Err: 参考数据读取失败等基础设施错误
    #[instrument(skip(self, demand_ids), fields(demands = demand_ids.len()))]
    pub fn generate_allocations(
        &self,
        demand_ids: &[String],
        scenario_id: Option<&str>,
        preview_only: bool,
    ) -> RepositoryResult<AllocationBatchResult> {
        let _perf = PerfGuard::new("generate_allocations");
        let run_id = Uuid::new_v4().to_string();
        let mut warnings = Vec::new();

        // === 步骤 1: 方案 ===
        let scenario = self.resolve_scenario(scenario_id, &mut warnings)?;

        // === 步骤 2: 需求 (按输入顺序) ===
        let mut demands = Vec::new();
        let mut seen = HashSet::new();
        for demand_id in demand_ids {
            // 同一需求只由一次运行消费, 重复 ID 保留首次出现
            if !seen.insert(demand_id.as_str()) {
                tracing::warn!(demand_id = %demand_id, "需求在批次中重复出现");
                warnings.push(AllocationWarning::new(
                    Some(demand_id),
                    WarningCode::DuplicateDemand,
                    format!("需求 {} 在本批次中重复出现, 已忽略", demand_id),
                ));
                continue;
            }
            match self.repos.demand_repo.find_by_id(demand_id)? {
                None => {
                    tracing::warn!(demand_id = %demand_id, "需求不存在");
                    warnings.push(AllocationWarning::new(
                        Some(demand_id),
                        WarningCode::DemandNotFound,
                        format!("需求 {} 不存在", demand_id),
                    ));
                }
                Some(d) if d.status != DemandStatus::Pending => {
                    warnings.push(AllocationWarning::new(
                        Some(demand_id),
                        WarningCode::DemandNotPending,
                        format!("需求 {} 状态为 {}, 已跳过", demand_id, d.status),
                    ));
                }
                Some(d) => demands.push(d),
            }
        }

        // === 步骤 3: 参考数据 + 快照 ===
        let shops = self.repos.reference_repo.list_shops()?;
        let rules = self.repos.reference_repo.list_active_rules()?;
        let commodities = Arc::new(self.repos.reference_repo.list_commodities()?);

        let window: Vec<PlanMonth> = demands
            .iter()
            .map(|d| d.target_month)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut snapshot =
            CapacitySnapshot::from_records(&self.repos.capacity_repo.list_window(&window)?);

        let distances: Arc<dyn DistanceProvider> = match &self.distances {
            Some(d) => d.clone(),
            None => Arc::new(RegionDistanceTable::from_config(&self.config.freight)),
        };
        let shop_evaluator = ShopEvaluator::new(
            EligibilityEvaluator::new(rules),
            CostEstimator::new(
                self.config.cost.clone(),
                self.config.freight.clone(),
                commodities.clone(),
                distances,
            ),
            commodities,
        );
        let scorer = ShopScorer::new(self.config.scoring.clone(), scenario.clone());
        let planner = DemandPlanner::new(&shop_evaluator, &scorer, &shops);

        // === 步骤 4: 逐需求计划 ===
        let mut allocations = Vec::new();
        let mut unallocated = 0;
        for demand in &demands {
            let plan = planner.plan(demand, &run_id, &mut snapshot);
            allocations.extend(plan.allocations);
            warnings.extend(plan.warnings);
            unallocated += plan.unallocated;
        }

        // === 步骤 5: 提交 ===
        if !preview_only {
            let (committed, not_committed) = self.commit(allocations, &scenario, &mut warnings);
            allocations = committed;
            unallocated += not_committed;
            self.advance_demand_status(&demands, &allocations);
        }

        let summary = AllocationSummary::from_allocations(&allocations, unallocated);
        tracing::info!(
            run_id = %run_id,
            scenario_id = %scenario.scenario_id,
            preview_only,
            total_cars = summary.total_cars,
            unallocated_cars = summary.unallocated_cars,
            warnings = warnings.len(),
            "分配运行完成"
        );

        Ok(AllocationBatchResult {
            run_id,
            scenario_id: scenario.scenario_id.clone(),
            preview_only,
            allocations,
            summary,
            warnings,
        })
    }

    fn resolve_scenario(
        &self,
        scenario_id: Option<&str>,
        warnings: &mut Vec<AllocationWarning>,
    ) -> RepositoryResult<ScenarioWeights> {
        if let Some(id) = scenario_id {
            match self.repos.scenario_repo.find_by_id(id)? {
                Some(s) if s.validate().is_ok() => return Ok(s),
                Some(s) => {
                    warnings.push(AllocationWarning::new(
                        None,
                        WarningCode::ScenarioFallback,
                        format!("方案 {} 权重无效, 使用系统默认方案", s.scenario_id),
                    ));
                }
                None => {
                    warnings.push(AllocationWarning::new(
                        None,
                        WarningCode::ScenarioFallback,
                        format!("方案 {} 不存在, 使用系统默认方案", id),
                    ));
                }
            }
        }

        let default = self
            .repos
            .scenario_repo
            .find_default()?
            .filter(|s| s.validate().is_ok())
            .unwrap_or_else(|| self.config.default_scenario.clone());
        Ok(default)
    }

    /// 逐条提交, 首个硬错误即停止
    ///
    /// # 返回
    /// - (已提交, 未提交车数)
    fn commit(
        &self,
        allocations: Vec<Allocation>,
        scenario: &ScenarioWeights,
        warnings: &mut Vec<AllocationWarning>,
    ) -> (Vec<Allocation>, i64) {
        let total = allocations.len();
        let mut committed = Vec::with_capacity(total);

        for allocation in allocations {
            let percent = self
                .config
                .capacity
                .overcommit_percent_for(&allocation.shop_code);
            match self.repos.allocation_repo.commit_allocation(
                &allocation,
                scenario,
                percent,
                self.config.outbox_max_retries,
            ) {
                Ok(c) => committed.push(c),
                Err(err) => {
                    let not_committed = (total - committed.len()) as i64;
                    match &err {
                        RepositoryError::OvercommitRejected { .. } => {
                            tracing::warn!(error = %err, not_committed, "提交阶段实时预留被拒, 停止提交")
                        }
                        _ => tracing::error!(error = %err, not_committed, "提交阶段失败, 停止提交"),
                    }
                    warnings.push(AllocationWarning::new(
                        Some(&allocation.demand_id),
                        WarningCode::CommitRejected,
                        format!(
                            "提交在厂修 {} ({}) 停止: {}; {} 辆未提交, 已提交的 {} 条保留",
                            allocation.shop_code,
                            allocation.target_month,
                            err,
                            not_committed,
                            committed.len()
                        ),
                    ));
                    return (committed, not_committed);
                }
            }
        }
        (committed, 0)
    }

    /// 推进需求状态; 失败只记录日志, 不影响已提交的分配
    fn advance_demand_status(&self, demands: &[Demand], committed: &[Allocation]) {
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for allocation in committed {
            *counts.entry(allocation.demand_id.as_str()).or_default() += 1;
        }
        for demand in demands {
            let allocated = counts.get(demand.demand_id.as_str()).copied().unwrap_or(0);
            let status = DemandStatus::from_counts(demand.car_count, allocated);
            if let Err(err) = self.repos.demand_repo.update_status(&demand.demand_id, status) {
                tracing::error!(demand_id = %demand.demand_id, error = %err, "需求状态更新失败");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::engine_config::{CostConfig, FreightConfig, ScoringConfig};
    use crate::domain::car::{CarProfile, CommodityCatalog, ShoppingOverrides};
    use crate::domain::rule::{EligibilityRule, RuleCondition};
    use crate::domain::shop::ShopCapabilities;
    use std::collections::BTreeMap;

    fn month() -> PlanMonth {
        PlanMonth::new(2025, 6).unwrap()
    }

    fn shop(code: &str, rate: f64, tags: &[&str]) -> ShopProfile {
        ShopProfile {
            shop_code: code.to_string(),
            shop_name: code.to_string(),
            region: "GULF".to_string(),
            is_preferred_network: true,
            labor_rate: rate,
            labor_rates_by_work: BTreeMap::new(),
            material_multiplier: 1.0,
            capabilities: Some(ShopCapabilities {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                levels: BTreeMap::new(),
            }),
            backlog_hours: Some(0.0),
            quality_score: Some(80.0),
            is_active: true,
        }
    }

    fn demand(id: &str, cars: i64) -> Demand {
        let mut car = CarProfile::new("GATX100");
        car.is_hazmat = true;
        Demand {
            demand_id: id.to_string(),
            car_count: cars,
            target_month: month(),
            car_profile: car,
            overrides: ShoppingOverrides::default(),
            allowed_shops: None,
            allowed_regions: None,
            origin_region: Some("GULF".to_string()),
            priority: 0,
            status: DemandStatus::Pending,
        }
    }

    fn hazmat_rule() -> EligibilityRule {
        EligibilityRule {
            rule_id: "R_HAZ".to_string(),
            category: "CAPABILITY".to_string(),
            priority: 1,
            is_blocking: true,
            description: None,
            condition: RuleCondition::WhenCarFlag {
                flag: crate::domain::car::CarFlag::Hazmat,
                then: Box::new(RuleCondition::ShopHasCapability {
                    capability: "hazmat".to_string(),
                }),
            },
        }
    }

    fn record(shop: &str, total: i64, allocated: i64) -> CapacityRecord {
        CapacityRecord {
            shop_code: shop.to_string(),
            month: month(),
            total_capacity: total,
            allocated_count: allocated,
            completed_count: 0,
        }
    }

    fn run(shops: &[ShopProfile], records: &[CapacityRecord], demand: &Demand) -> (DemandPlan, CapacitySnapshot) {
        let commodities = Arc::new(CommodityCatalog::new());
        let evaluator = ShopEvaluator::new(
            EligibilityEvaluator::new(vec![hazmat_rule()]),
            CostEstimator::with_region_table(
                CostConfig::default(),
                FreightConfig::default(),
                commodities.clone(),
            ),
            commodities,
        );
        let scorer = ShopScorer::new(ScoringConfig::default(), ScenarioWeights::default());
        let planner = DemandPlanner::new(&evaluator, &scorer, shops);
        let mut snapshot = CapacitySnapshot::from_records(records);
        let plan = planner.plan(demand, "RUN1", &mut snapshot);
        (plan, snapshot)
    }

    #[test]
    fn test_greedy_fill_in_score_order() {
        let shops = vec![shop("B", 120.0, &["hazmat"]), shop("A", 80.0, &["hazmat"])];
        let records = vec![record("A", 4, 0), record("B", 10, 0)];
        let (plan, snapshot) = run(&shops, &records, &demand("D1", 10));

        let to_a = plan.allocations.iter().filter(|a| a.shop_code == "A").count();
        let to_b = plan.allocations.iter().filter(|a| a.shop_code == "B").count();
        assert_eq!((to_a, to_b), (4, 6));
        assert_eq!(plan.allocations[0].shop_code, "A");
        assert_eq!(plan.allocations[0].rank, 1);
        // 代表车只用于评估, 不绑定到分配
        assert!(plan.allocations.iter().all(|a| a.car_number.is_none()));
        assert!(plan.warnings.is_empty());
        assert_eq!(plan.unallocated, 0);
        assert_eq!(snapshot.available("A", month()), 0);
        assert_eq!(snapshot.available("B", month()), 4);
    }

    #[test]
    fn test_no_eligible_shop_warns_and_counts_unallocated() {
        let shops = vec![shop("A", 80.0, &[]), shop("B", 90.0, &[])];
        let records = vec![record("A", 10, 0), record("B", 10, 0)];
        let (plan, _) = run(&shops, &records, &demand("D2", 5));

        assert!(plan.allocations.is_empty());
        assert_eq!(plan.warnings.len(), 1);
        assert_eq!(plan.warnings[0].demand_id.as_deref(), Some("D2"));
        assert_eq!(plan.warnings[0].code, WarningCode::NoEligibleShop);
        assert_eq!(plan.unallocated, 5);
    }

    #[test]
    fn test_residual_demand_when_capacity_runs_out() {
        let shops = vec![shop("A", 80.0, &["hazmat"])];
        let records = vec![record("A", 10, 7)];
        let (plan, _) = run(&shops, &records, &demand("D3", 5));

        assert_eq!(plan.allocations.len(), 3);
        assert_eq!(plan.unallocated, 2);
        assert_eq!(plan.warnings[0].code, WarningCode::ResidualDemand);
    }

    #[test]
    fn test_full_shop_and_constraints_are_excluded() {
        let shops = vec![shop("A", 80.0, &["hazmat"]), shop("B", 90.0, &["hazmat"])];
        let records = vec![record("A", 10, 10), record("B", 10, 0)];
        let mut d = demand("D4", 2);
        let (plan, _) = run(&shops, &records, &d);
        assert!(plan.allocations.iter().all(|a| a.shop_code == "B"));

        d.allowed_shops = Some(vec!["A".to_string()]);
        let (plan, _) = run(&shops, &records, &d);
        assert_eq!(plan.unallocated, 2);
        assert_eq!(plan.warnings[0].code, WarningCode::NoEligibleShop);
    }
}
