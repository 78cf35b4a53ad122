//! Property checks for the admission scoring engine over arbitrary turnover histories.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use seatwatch::workflows::admission::{
    grade_for, AdmissionEngine, FacilityCategory, Grade, PriorityType, ScoreOutcome, ScoreQuery,
    ScoringParams,
};
use seatwatch::workflows::snapshots::{AgeClass, CapacitySnapshot, FacilityId, ReliabilityTier};

const PRIORITIES: [PriorityType; 7] = [
    PriorityType::General,
    PriorityType::DualIncome,
    PriorityType::Sibling,
    PriorityType::MultiChild,
    PriorityType::LowIncome,
    PriorityType::SingleParent,
    PriorityType::Disability,
];

const CATEGORIES: [Option<FacilityCategory>; 4] = [
    None,
    Some(FacilityCategory::NationalPublic),
    Some(FacilityCategory::Public),
    Some(FacilityCategory::Private),
];

fn as_of(month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, month, 15, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Full class at the start of every 30-day window, `counts[i]` seats freed two weeks later.
fn history(capacity: u32, counts: &[u32]) -> Vec<CapacitySnapshot> {
    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp");
    counts
        .iter()
        .enumerate()
        .flat_map(|(index, &freed)| {
            let window_start = start + Duration::days(30 * index as i64);
            [
                (capacity, window_start),
                (capacity - freed, window_start + Duration::days(14)),
            ]
        })
        .map(|(occupied, observed_at)| CapacitySnapshot {
            facility_id: FacilityId("F-PROP".to_string()),
            age_class: AgeClass::Age2,
            capacity_total: capacity,
            current_occupied: occupied,
            waiting_count: 5,
            observed_at,
            reliability: ReliabilityTier::Official,
        })
        .collect()
}

fn query(queue_position: u32, priority: usize, category: usize) -> ScoreQuery {
    ScoreQuery {
        facility_id: FacilityId("F-PROP".to_string()),
        age_class: AgeClass::Age2,
        queue_position,
        priority_type: PRIORITIES[priority],
        category: CATEGORIES[category],
    }
}

proptest! {
    #[test]
    fn probabilities_are_ordered_and_bounded(
        counts in prop::collection::vec(0u32..6, 0..15),
        capacity in 10u32..40,
        queue in 1u32..80,
        priority in 0usize..7,
        category in 0usize..4,
        month in 1u32..=12,
    ) {
        let engine = AdmissionEngine::new(ScoringParams::standard());
        let outcome = engine.score(&query(queue, priority, category), &history(capacity, &counts), as_of(month));
        let result = outcome.result();

        prop_assert!(0.0 <= result.probability.p_3m);
        prop_assert!(result.probability.p_3m <= result.probability.p_6m);
        prop_assert!(result.probability.p_6m <= result.probability.p_12m);
        prop_assert!(result.probability.p_12m <= 1.0);
        prop_assert!(result.eta_months.p50 >= 0.0);
        prop_assert!(result.eta_months.p50 <= result.eta_months.p90);
        prop_assert!(result.eta_months.p90 <= engine.params().max_eta_months);
    }

    #[test]
    fn grade_is_a_function_of_six_month_probability_and_median_wait(
        counts in prop::collection::vec(0u32..6, 0..15),
        capacity in 10u32..40,
        queue in 1u32..80,
        priority in 0usize..7,
        category in 0usize..4,
    ) {
        let params = ScoringParams::standard();
        let engine = AdmissionEngine::new(params.clone());
        let query = query(queue, priority, category);
        let outcome = engine.score(&query, &history(capacity, &counts), as_of(5));

        match &outcome {
            ScoreOutcome::Estimated(result) => {
                let expected = grade_for(
                    result.probability.p_6m,
                    result.eta_months.p50,
                    &params.grade_thresholds,
                    params.eta_ceiling_for(query.category),
                );
                prop_assert_eq!(result.grade, expected);
            }
            ScoreOutcome::InsufficientData(result) => prop_assert_eq!(result.grade, Grade::F),
        }

        let again = engine.score(&query, &history(capacity, &counts), as_of(5));
        prop_assert_eq!(again.result().grade, outcome.result().grade);
        prop_assert_eq!(again.result().probability, outcome.result().probability);
    }

    #[test]
    fn a_later_queue_position_never_improves_the_odds(
        counts in prop::collection::vec(0u32..6, 1..15),
        capacity in 10u32..40,
        queue in 1u32..80,
        priority in 0usize..7,
    ) {
        let engine = AdmissionEngine::new(ScoringParams::standard());
        let history = history(capacity, &counts);
        let ahead = engine.score(&query(queue, priority, 0), &history, as_of(5));
        let behind = engine.score(&query(queue + 1, priority, 0), &history, as_of(5));

        prop_assert!(behind.result().probability.p_6m <= ahead.result().probability.p_6m);
        prop_assert!(behind.result().eta_months.p50 >= ahead.result().eta_months.p50);
    }
}
