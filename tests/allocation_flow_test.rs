// ==========================================
// 分配流程集成测试
// ==========================================
// 职责: 验证分配运行的计划、提交、警告与台账一致性
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod allocation_flow_test {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use railcar_shopping::api::ApiError;
    use railcar_shopping::config::scenario_profile::ScenarioWeights;
    use railcar_shopping::domain::allocation::WarningCode;
    use railcar_shopping::domain::capacity::overcommit_ceiling;
    use railcar_shopping::domain::outbox::OutboxStatus;
    use railcar_shopping::domain::types::{AllocationStatus, DemandStatus};
    use railcar_shopping::engine::cost_estimator::{DistanceProvider, FreightError};
    use railcar_shopping::engine::{AllocationEngine, AllocationRepositories};
    use railcar_shopping::repository::{CapacityLedgerRepository, RepositoryError};

    use crate::test_helpers::{
        capacity, create_test_state, demand, month, seed_two_hazmat_shops, shop,
    };

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_demand_fills_cheapest_shop_first() {
        let (_tmp, state) = create_test_state();
        seed_two_hazmat_shops(&state, "2025-06");
        state.demand_repo.insert(&demand("D1", 10, "2025-06")).unwrap();

        let result = state
            .allocation_api
            .generate_allocations(&ids(&["D1"]), None, false)
            .unwrap();

        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert_eq!(result.summary.total_cars, 10);
        assert_eq!(result.summary.unallocated_cars, 0);
        let to_a = result.allocations.iter().filter(|a| a.shop_code == "SHOP_A").count();
        let to_b = result.allocations.iter().filter(|a| a.shop_code == "SHOP_B").count();
        assert_eq!((to_a, to_b), (4, 6));
        assert!(result
            .allocations
            .iter()
            .all(|a| a.status == AllocationStatus::Planned));

        let a = state.capacity_repo.find("SHOP_A", month("2025-06")).unwrap().unwrap();
        let b = state.capacity_repo.find("SHOP_B", month("2025-06")).unwrap().unwrap();
        assert_eq!(a.allocated_count, 4);
        assert_eq!(b.allocated_count, 6);

        let stored = state.allocation_repo.list_by_run(&result.run_id).unwrap();
        assert_eq!(stored.len(), 10);
        // 成本快照原样落库
        assert_eq!(stored[0].cost, result.allocations[0].cost);

        let d1 = state.demand_repo.find_by_id("D1").unwrap().unwrap();
        assert_eq!(d1.status, DemandStatus::Allocated);
        assert_eq!(
            state.outbox_repo.count_by_status(OutboxStatus::Pending).unwrap(),
            10
        );
    }

    #[test]
    fn test_no_eligible_shop_yields_warning_and_unallocated() {
        let (_tmp, state) = create_test_state();
        state
            .reference_repo
            .upsert_rule(&crate::test_helpers::hazmat_rule())
            .unwrap();
        state.reference_repo.upsert_shop(&shop("PLAIN", 80.0, &[])).unwrap();
        state
            .capacity_repo
            .upsert_record(&capacity("PLAIN", "2025-06", 10, 0))
            .unwrap();
        state.demand_repo.insert(&demand("D2", 5, "2025-06")).unwrap();

        let result = state
            .allocation_api
            .generate_allocations(&ids(&["D2"]), None, false)
            .unwrap();

        assert!(result.allocations.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].code, WarningCode::NoEligibleShop);
        assert_eq!(result.warnings[0].demand_id.as_deref(), Some("D2"));
        assert_eq!(result.summary.unallocated_cars, 5);
        assert_eq!(
            state.demand_repo.find_by_id("D2").unwrap().unwrap().status,
            DemandStatus::Unallocated
        );
    }

    #[test]
    fn test_preview_does_not_persist() {
        let (_tmp, state) = create_test_state();
        seed_two_hazmat_shops(&state, "2025-06");
        state.demand_repo.insert(&demand("D3", 3, "2025-06")).unwrap();

        let result = state
            .allocation_api
            .generate_allocations(&ids(&["D3"]), None, true)
            .unwrap();

        assert!(result.preview_only);
        assert_eq!(result.allocations.len(), 3);
        assert!(result
            .allocations
            .iter()
            .all(|a| a.status == AllocationStatus::Proposed));
        assert!(state.allocation_repo.list_by_run(&result.run_id).unwrap().is_empty());

        let a = state.capacity_repo.find("SHOP_A", month("2025-06")).unwrap().unwrap();
        assert_eq!(a.allocated_count, 0);
        assert_eq!(
            state.demand_repo.find_by_id("D3").unwrap().unwrap().status,
            DemandStatus::Pending
        );
        assert_eq!(
            state.outbox_repo.count_by_status(OutboxStatus::Pending).unwrap(),
            0
        );
    }

    #[test]
    fn test_bad_inputs_are_warnings_not_errors() {
        let (_tmp, state) = create_test_state();
        seed_two_hazmat_shops(&state, "2025-06");
        state.demand_repo.insert(&demand("D4", 2, "2025-06")).unwrap();

        let result = state
            .allocation_api
            .generate_allocations(&ids(&["MISSING", "D4"]), Some("no-such-scenario"), false)
            .unwrap();

        let codes: Vec<WarningCode> = result.warnings.iter().map(|w| w.code).collect();
        assert!(codes.contains(&WarningCode::ScenarioFallback));
        assert!(codes.contains(&WarningCode::DemandNotFound));
        assert_eq!(result.summary.total_cars, 2);
        assert_eq!(result.scenario_id, ScenarioWeights::default().scenario_id);

        // 已消费的需求再次提交只产生警告
        let again = state
            .allocation_api
            .generate_allocations(&ids(&["D4"]), None, false)
            .unwrap();
        assert!(again.allocations.is_empty());
        assert_eq!(again.warnings[0].code, WarningCode::DemandNotPending);
    }

    #[test]
    fn test_repeated_demand_id_is_consumed_once() {
        let (_tmp, state) = create_test_state();
        seed_two_hazmat_shops(&state, "2025-06");
        state.demand_repo.insert(&demand("D1", 3, "2025-06")).unwrap();

        let result = state
            .allocation_api
            .generate_allocations(&ids(&["D1", "D1"]), None, false)
            .unwrap();

        assert_eq!(result.allocations.len(), 3);
        assert_eq!(result.summary.total_cars, 3);
        assert_eq!(result.summary.unallocated_cars, 0);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].code, WarningCode::DuplicateDemand);
        assert_eq!(result.warnings[0].demand_id.as_deref(), Some("D1"));

        let a = state.capacity_repo.find("SHOP_A", month("2025-06")).unwrap().unwrap();
        let b = state.capacity_repo.find("SHOP_B", month("2025-06")).unwrap().unwrap();
        assert_eq!(a.allocated_count + b.allocated_count, 3);
        assert_eq!(state.allocation_repo.list_by_run(&result.run_id).unwrap().len(), 3);
    }

    #[test]
    fn test_empty_demand_list_is_invalid() {
        let (_tmp, state) = create_test_state();
        assert!(matches!(
            state.allocation_api.generate_allocations(&[], None, false),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_ledger_stays_within_ceiling_across_demands() {
        let (_tmp, state) = create_test_state();
        state
            .reference_repo
            .upsert_rule(&crate::test_helpers::hazmat_rule())
            .unwrap();
        state
            .reference_repo
            .upsert_shop(&shop("ONLY", 90.0, &["hazmat"]))
            .unwrap();
        state
            .capacity_repo
            .upsert_record(&capacity("ONLY", "2025-07", 50, 0))
            .unwrap();
        state.demand_repo.insert(&demand("D5", 30, "2025-07")).unwrap();
        state.demand_repo.insert(&demand("D6", 30, "2025-07")).unwrap();

        let result = state
            .allocation_api
            .generate_allocations(&ids(&["D5", "D6"]), None, false)
            .unwrap();

        assert_eq!(result.summary.total_cars, 50);
        assert_eq!(result.summary.unallocated_cars, 10);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].code, WarningCode::ResidualDemand);
        assert_eq!(result.warnings[0].demand_id.as_deref(), Some("D6"));

        let record = state.capacity_repo.find("ONLY", month("2025-07")).unwrap().unwrap();
        let ceiling = overcommit_ceiling(record.total_capacity, state.config.capacity.overcommit_percent);
        assert!(record.allocated_count - record.total_capacity <= ceiling);
        assert_eq!(
            state.demand_repo.find_by_id("D6").unwrap().unwrap().status,
            DemandStatus::PartiallyAllocated
        );
    }

    #[test]
    fn test_committed_scenario_is_locked() {
        let (_tmp, state) = create_test_state();
        seed_two_hazmat_shops(&state, "2025-06");
        let mut scenario = ScenarioWeights {
            scenario_id: "cost-first".to_string(),
            name: "成本优先".to_string(),
            cost: 70.0,
            capacity_balance: 10.0,
            network_preference: 10.0,
            quality: 10.0,
            is_default: false,
            ..ScenarioWeights::default()
        };
        state.scenario_repo.upsert(&scenario).unwrap();
        state.demand_repo.insert(&demand("D7", 1, "2025-06")).unwrap();

        let result = state
            .allocation_api
            .generate_allocations(&ids(&["D7"]), Some("cost-first"), false)
            .unwrap();
        assert_eq!(result.scenario_id, "cost-first");

        let stored = state.scenario_repo.find_by_id("cost-first").unwrap().unwrap();
        assert!(stored.locked);

        scenario.cost = 50.0;
        scenario.quality = 30.0;
        assert!(matches!(
            state.scenario_repo.upsert(&scenario),
            Err(RepositoryError::BusinessRuleViolation(_))
        ));
    }

    #[test]
    fn test_complete_and_cancel_allocation_adjust_ledger() {
        let (_tmp, state) = create_test_state();
        seed_two_hazmat_shops(&state, "2025-06");
        state.demand_repo.insert(&demand("D8", 2, "2025-06")).unwrap();

        let result = state
            .allocation_api
            .generate_allocations(&ids(&["D8"]), None, false)
            .unwrap();
        let first = &result.allocations[0];
        let second = &result.allocations[1];
        assert_eq!(first.shop_code, "SHOP_A");

        let completed = state
            .allocation_api
            .complete_allocation(&first.allocation_id)
            .unwrap();
        assert_eq!(completed.status, AllocationStatus::Completed);
        let cancelled = state
            .allocation_api
            .cancel_allocation(&second.allocation_id)
            .unwrap();
        assert_eq!(cancelled.status, AllocationStatus::Cancelled);

        let a = state.capacity_repo.find("SHOP_A", month("2025-06")).unwrap().unwrap();
        assert_eq!(a.allocated_count, 0);
        assert_eq!(a.completed_count, 1);

        // 已终结的分配不能再次完工
        assert!(matches!(
            state.allocation_api.complete_allocation(&first.allocation_id),
            Err(ApiError::InvalidTransition { .. })
        ));
    }

    /// 计划阶段结束后、提交阶段之前, 台账被其他写入者占满
    struct ConcurrentBooking {
        ledger: Arc<CapacityLedgerRepository>,
        booked: AtomicBool,
    }

    impl DistanceProvider for ConcurrentBooking {
        fn distance_miles(&self, _from: &str, _to: &str) -> Result<f64, FreightError> {
            if !self.booked.swap(true, Ordering::SeqCst) {
                // SHOP_A: 产能 4, 上限 ceil(0.4) = 1 → 最多 5
                let outcome = self
                    .ledger
                    .reserve("SHOP_A", month("2025-06"), 5, 10)
                    .map_err(|_| FreightError::InvalidDistance(f64::NAN))?;
                assert!(outcome.is_reserved());
            }
            Ok(100.0)
        }
    }

    #[test]
    fn test_live_rejection_stops_commit_phase() {
        let (_tmp, state) = create_test_state();
        seed_two_hazmat_shops(&state, "2025-06");
        state.demand_repo.insert(&demand("D9", 6, "2025-06")).unwrap();

        let repos = AllocationRepositories::new(
            state.reference_repo.clone(),
            state.demand_repo.clone(),
            state.scenario_repo.clone(),
            state.capacity_repo.clone(),
            state.allocation_repo.clone(),
        );
        let engine = AllocationEngine::new(repos, state.config.as_ref().clone())
            .with_distance_provider(Arc::new(ConcurrentBooking {
                ledger: state.capacity_repo.clone(),
                booked: AtomicBool::new(false),
            }));

        let result = engine
            .generate_allocations(&ids(&["D9"]), None, false)
            .unwrap();

        assert!(result.allocations.is_empty());
        assert_eq!(result.summary.unallocated_cars, 6);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].code, WarningCode::CommitRejected);

        // 被拒的提交不留下任何写入
        let a = state.capacity_repo.find("SHOP_A", month("2025-06")).unwrap().unwrap();
        let b = state.capacity_repo.find("SHOP_B", month("2025-06")).unwrap().unwrap();
        assert_eq!(a.allocated_count, 5);
        assert_eq!(b.allocated_count, 0);
        assert_eq!(
            state.demand_repo.find_by_id("D9").unwrap().unwrap().status,
            DemandStatus::Unallocated
        );
    }
}
