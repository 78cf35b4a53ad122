use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::quota::{InMemoryTierDirectory, InMemoryUsageCounter, QuotaPolicy, SubscriptionQuota, Tier};
use crate::storage::RepositoryError;
use crate::workflows::admission::{
    AdmissionEngine, AdmissionService, InMemoryScoreCache, PriorityType, ScoreQuery,
    ScoreRequest, ScoringParams,
};
use crate::workflows::snapshots::{
    AgeClass, CapacitySnapshot, CapacitySnapshotStore, FacilityId, InMemorySnapshotStore,
    ReliabilityTier, SnapshotKey,
};

pub(super) type TestQuota = SubscriptionQuota<InMemoryTierDirectory, InMemoryUsageCounter>;

pub(super) fn as_of() -> DateTime<Utc> {
    at_month(5)
}

/// Scoring date on the 20th of `month`, 2025.
pub(super) fn at_month(month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, month, 20, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn history_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Two observations per 30-day window: full at day 1, `counts[i]` seats freed by day 15.
pub(super) fn history_from_counts(
    facility: &str,
    age_class: AgeClass,
    capacity: u32,
    counts: &[u32],
) -> Vec<CapacitySnapshot> {
    let start = history_start();
    let mut snapshots = Vec::new();
    for (index, &freed) in counts.iter().enumerate() {
        let window_start = start + Duration::days(30 * index as i64);
        snapshots.push(snapshot(facility, age_class, capacity, capacity, window_start));
        snapshots.push(snapshot(
            facility,
            age_class,
            capacity,
            capacity - freed,
            window_start + Duration::days(14),
        ));
    }
    snapshots
}

pub(super) fn snapshot(
    facility: &str,
    age_class: AgeClass,
    capacity: u32,
    occupied: u32,
    observed_at: DateTime<Utc>,
) -> CapacitySnapshot {
    CapacitySnapshot {
        facility_id: FacilityId(facility.to_string()),
        age_class,
        capacity_total: capacity,
        current_occupied: occupied,
        waiting_count: 6,
        observed_at,
        reliability: ReliabilityTier::Official,
    }
}

pub(super) fn steady_two_per_month() -> Vec<CapacitySnapshot> {
    history_from_counts("F1", AgeClass::Age2, 20, &[2; 12])
}

pub(super) fn poisson_like_history() -> Vec<CapacitySnapshot> {
    history_from_counts(
        "F1",
        AgeClass::Age2,
        20,
        &[0, 2, 4, 2, 0, 2, 4, 2, 0, 2, 4, 2],
    )
}

pub(super) fn query(facility: &str, queue_position: u32, priority: PriorityType) -> ScoreQuery {
    ScoreQuery {
        facility_id: FacilityId(facility.to_string()),
        age_class: AgeClass::Age2,
        queue_position,
        priority_type: priority,
        category: None,
    }
}

pub(super) fn request(facility: &str, queue_position: u32) -> ScoreRequest {
    ScoreRequest {
        facility_id: facility.to_string(),
        age_class: "AGE_2".to_string(),
        queue_position,
        priority_type: None,
        facility_category: None,
    }
}

pub(super) fn engine() -> AdmissionEngine {
    AdmissionEngine::new(ScoringParams::standard())
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

pub(super) fn premium_quota() -> Arc<TestQuota> {
    let (quota, tiers) = quota();
    tiers.set_tier("parent-1", Tier::Premium);
    quota
}

pub(super) fn build_service(
    snapshots: Vec<CapacitySnapshot>,
) -> (
    AdmissionService<CountingSnapshotStore, InMemoryScoreCache, TestQuota>,
    Arc<CountingSnapshotStore>,
) {
    let store = Arc::new(CountingSnapshotStore::new(snapshots));
    let service = AdmissionService::new(
        store.clone(),
        Arc::new(InMemoryScoreCache::default()),
        premium_quota(),
        ScoringParams::standard(),
    );
    (service, store)
}

/// Wraps the in-memory store and counts history reads.
pub(super) struct CountingSnapshotStore {
    inner: InMemorySnapshotStore,
    reads: AtomicUsize,
}

impl CountingSnapshotStore {
    pub(super) fn new(snapshots: Vec<CapacitySnapshot>) -> Self {
        Self {
            inner: InMemorySnapshotStore::with_snapshots(snapshots),
            reads: AtomicUsize::new(0),
        }
    }

    pub(super) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl CapacitySnapshotStore for CountingSnapshotStore {
    fn history(
        &self,
        facility_id: &FacilityId,
        age_class: AgeClass,
    ) -> Result<Vec<CapacitySnapshot>, RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.history(facility_id, age_class)
    }

    fn latest(
        &self,
        facility_id: &FacilityId,
        age_class: AgeClass,
    ) -> Result<Option<CapacitySnapshot>, RepositoryError> {
        self.inner.latest(facility_id, age_class)
    }

    fn append(&self, snapshot: CapacitySnapshot) -> Result<(), RepositoryError> {
        self.inner.append(snapshot)
    }

    fn keys(&self) -> Result<Vec<SnapshotKey>, RepositoryError> {
        self.inner.keys()
    }
}

pub(super) struct UnavailableSnapshotStore;

impl CapacitySnapshotStore for UnavailableSnapshotStore {
    fn history(
        &self,
        _facility_id: &FacilityId,
        _age_class: AgeClass,
    ) -> Result<Vec<CapacitySnapshot>, RepositoryError> {
        Err(RepositoryError::Unavailable("snapshot database offline".to_string()))
    }

    fn latest(
        &self,
        _facility_id: &FacilityId,
        _age_class: AgeClass,
    ) -> Result<Option<CapacitySnapshot>, RepositoryError> {
        Err(RepositoryError::Unavailable("snapshot database offline".to_string()))
    }

    fn append(&self, _snapshot: CapacitySnapshot) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("snapshot database offline".to_string()))
    }

    fn keys(&self) -> Result<Vec<SnapshotKey>, RepositoryError> {
        Err(RepositoryError::Unavailable("snapshot database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
