use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::quota::{
    InMemoryTierDirectory, InMemoryUsageCounter, QuotaPolicy, SubscriptionQuota, Tier,
};
use crate::storage::RepositoryError;
use crate::workflows::admission::{
    AdmissionService, AdmissionServiceError, FacilityCategory, InMemoryScoreCache, PriorityType,
    ScoreOutcome, ScoreQuery, ScoringParams,
};
use crate::workflows::snapshots::{
    AgeClass, CapacitySnapshot, FacilityId, InMemorySnapshotStore, ReliabilityTier,
};
use crate::workflows::strategy::{
    CandidateFacility, CandidateScorer, FacilityDirectory, GeoPoint,
    InMemoryRecommendationRepository, StrategyParams, StrategyService, UserContext,
};
use crate::workflows::UserId;

pub(super) type TestQuota = SubscriptionQuota<InMemoryTierDirectory, InMemoryUsageCounter>;
pub(super) type TestAdmission = AdmissionService<InMemorySnapshotStore, InMemoryScoreCache, TestQuota>;
pub(super) type TestStrategy<A> =
    StrategyService<A, InMemoryRecommendationRepository, FacilityDirectory, TestQuota>;

pub(super) fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 20, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn home() -> GeoPoint {
    GeoPoint {
        lat: 37.5665,
        lng: 126.9780,
    }
}

pub(super) fn context(priority_type: PriorityType, need_extended_care: bool) -> UserContext {
    UserContext {
        user_id: UserId("parent-1".to_string()),
        home: home(),
        child_age_class: AgeClass::Age2,
        desired_start: NaiveDate::from_ymd_opt(2025, 9, 1).expect("valid date"),
        need_extended_care,
        priority_type,
        employer: None,
    }
}

/// One 30-day window per entry of `freed`, each freeing that many seats by day 15.
pub(super) fn history(
    facility: &str,
    capacity: u32,
    freed: &[u32],
    waiting_count: u32,
) -> Vec<CapacitySnapshot> {
    let start = Utc
        .with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp");
    let mut snapshots = Vec::new();
    for (index, &count) in freed.iter().enumerate() {
        let window_start = start + Duration::days(30 * index as i64);
        for (offset, occupied) in [(0, capacity), (14, capacity - count)] {
            snapshots.push(CapacitySnapshot {
                facility_id: FacilityId(facility.to_string()),
                age_class: AgeClass::Age2,
                capacity_total: capacity,
                current_occupied: occupied,
                waiting_count,
                observed_at: window_start + Duration::days(offset),
                reliability: ReliabilityTier::Official,
            });
        }
    }
    snapshots
}

pub(super) fn candidate(
    facility: &str,
    category: FacilityCategory,
    extended_care: bool,
    queue_position: Option<u32>,
) -> CandidateFacility {
    CandidateFacility {
        facility_id: FacilityId(facility.to_string()),
        name: format!("Facility {facility}"),
        category,
        extended_care,
        queue_position,
        location: Some(home()),
    }
}

pub(super) fn quota() -> (Arc<TestQuota>, Arc<InMemoryTierDirectory>) {
    let tiers = Arc::new(InMemoryTierDirectory::default());
    let quota = Arc::new(SubscriptionQuota::new(
        tiers.clone(),
        Arc::new(InMemoryUsageCounter::default()),
        QuotaPolicy::standard(),
    ));
    (quota, tiers)
}

pub(super) fn admission(snapshots: Vec<CapacitySnapshot>) -> TestAdmission {
    let (quota, _) = quota();
    AdmissionService::new(
        Arc::new(InMemorySnapshotStore::with_snapshots(snapshots)),
        Arc::new(InMemoryScoreCache::default()),
        quota,
        ScoringParams::standard(),
    )
}

pub(super) fn build_strategy<A: CandidateScorer + 'static>(
    scorer: Arc<A>,
    tier: Tier,
) -> TestStrategy<A> {
    let (quota, tiers) = quota();
    tiers.set_tier("parent-1", tier);
    StrategyService::new(
        scorer,
        Arc::new(InMemoryRecommendationRepository::new()),
        Arc::new(FacilityDirectory::default()),
        quota,
        StrategyParams::standard(),
    )
}

/// Public facility with a year of Poisson-like turnover, private one with a thin history.
pub(super) fn mixed_histories() -> Vec<CapacitySnapshot> {
    let mut snapshots = history("F-public", 20, &[0, 2, 4, 2, 0, 2, 4, 2, 0, 2, 4, 2], 4);
    snapshots.extend(history("F-private", 10, &[1, 0], 9));
    snapshots
}

/// Delegates to a real admission service and records every query it sees.
pub(super) struct RecordingScorer {
    inner: TestAdmission,
    queries: Mutex<Vec<ScoreQuery>>,
}

impl RecordingScorer {
    pub(super) fn new(inner: TestAdmission) -> Self {
        Self {
            inner,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn queue_position_for(&self, facility: &str) -> Option<u32> {
        self.queries
            .lock()
            .expect("queries mutex")
            .iter()
            .find(|query| query.facility_id.as_str() == facility)
            .map(|query| query.queue_position)
    }
}

impl CandidateScorer for RecordingScorer {
    fn score_candidate(
        &self,
        query: &ScoreQuery,
        now: DateTime<Utc>,
    ) -> Result<ScoreOutcome, AdmissionServiceError> {
        self.queries.lock().expect("queries mutex").push(query.clone());
        self.inner.score_candidate(query, now)
    }

    fn waiting_count(
        &self,
        facility_id: &FacilityId,
        age_class: AgeClass,
    ) -> Result<Option<u32>, RepositoryError> {
        self.inner.waiting_count(facility_id, age_class)
    }
}

pub(super) struct UnavailableScorer;

impl CandidateScorer for UnavailableScorer {
    fn score_candidate(
        &self,
        _query: &ScoreQuery,
        _now: DateTime<Utc>,
    ) -> Result<ScoreOutcome, AdmissionServiceError> {
        Err(RepositoryError::Unavailable("snapshot database offline".to_string()).into())
    }

    fn waiting_count(
        &self,
        _facility_id: &FacilityId,
        _age_class: AgeClass,
    ) -> Result<Option<u32>, RepositoryError> {
        Err(RepositoryError::Unavailable("snapshot database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 256 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&body).expect("json body")
}
