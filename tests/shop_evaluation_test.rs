// ==========================================
// 厂修评估集成测试
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod shop_evaluation_test {
    use railcar_shopping::api::{ApiError, CarRef, EvaluateShopsRequest};
    use railcar_shopping::domain::car::ShoppingOverrides;

    use crate::test_helpers::{create_test_state, hazmat_car, seed_two_hazmat_shops, shop};

    fn request(car: CarRef) -> EvaluateShopsRequest {
        EvaluateShopsRequest {
            car,
            overrides: ShoppingOverrides::default(),
            origin_region: Some("GULF".to_string()),
            prefer_network_on_tie: true,
        }
    }

    #[test]
    fn test_eligible_shops_first_then_by_cost() {
        let (_tmp, state) = create_test_state();
        seed_two_hazmat_shops(&state, "2025-06");
        state.reference_repo.upsert_shop(&shop("PLAIN", 50.0, &[])).unwrap();
        state.reference_repo.upsert_car(&hazmat_car("GATX7001")).unwrap();

        let results = state
            .shop_api
            .evaluate_shops(&request(CarRef::CarNumber("GATX7001".to_string())))
            .unwrap();
        assert_eq!(results.len(), 3);

        let eligible: Vec<_> = results.iter().filter(|r| r.eligible).collect();
        assert_eq!(eligible.len(), 2);
        assert!(results[0].eligible && results[1].eligible);
        assert!(eligible[0].cost.total_cost <= eligible[1].cost.total_cost);

        let plain = &results[2];
        assert_eq!(plain.shop_code, "PLAIN");
        assert!(!plain.eligible);
        assert!(plain.failed_rules.iter().any(|r| r.rule_id == "R_HAZMAT"));
    }

    #[test]
    fn test_inline_profile_skips_car_lookup() {
        let (_tmp, state) = create_test_state();
        seed_two_hazmat_shops(&state, "2025-06");

        let results = state
            .shop_api
            .evaluate_shops(&request(CarRef::Profile(hazmat_car("NOT-STORED"))))
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.eligible));
    }

    #[test]
    fn test_unknown_car_number_is_not_found() {
        let (_tmp, state) = create_test_state();
        assert!(matches!(
            state
                .shop_api
                .evaluate_shops(&request(CarRef::CarNumber("MISSING".to_string()))),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            state
                .shop_api
                .evaluate_shops(&request(CarRef::CarNumber(" ".to_string()))),
            Err(ApiError::InvalidInput(_))
        ));
    }
}
