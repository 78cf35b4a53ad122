use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::storage::RepositoryError;
use crate::workflows::snapshots::{
    AgeClass, CapacitySnapshot, CapacitySnapshotStore, FacilityId, InMemorySnapshotStore,
    ReliabilityTier, SnapshotKey,
};
use crate::workflows::turnover::{DetectorParams, InMemoryToEventStore, ToDetector};

pub(super) fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 20, hour, minute, 0)
        .single()
        .expect("valid timestamp")
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
        waiting_count: 5,
        observed_at,
        reliability: ReliabilityTier::Official,
    }
}

/// Pair of observations where `freed` seats opened between 08:00 and 09:05.
pub(super) fn freed_pair(facility: &str, age_class: AgeClass, freed: u32) -> Vec<CapacitySnapshot> {
    vec![
        snapshot(facility, age_class, 20, 20, at(8, 0)),
        snapshot(facility, age_class, 20, 20 - freed, at(9, 5)),
    ]
}

/// Retries without sleeping so tests stay fast.
pub(super) fn params() -> DetectorParams {
    DetectorParams {
        list_backoff_ms: 0,
        ..DetectorParams::standard()
    }
}

pub(super) fn detector<S: CapacitySnapshotStore + 'static>(
    snapshots: Arc<S>,
) -> (ToDetector<S, InMemoryToEventStore>, Arc<InMemoryToEventStore>) {
    let events = Arc::new(InMemoryToEventStore::new());
    (ToDetector::new(snapshots, events.clone(), params()), events)
}

pub(super) fn store(snapshots: Vec<CapacitySnapshot>) -> Arc<InMemorySnapshotStore> {
    Arc::new(InMemorySnapshotStore::with_snapshots(snapshots))
}

/// Fails the first `failures` key listings, then delegates.
pub(super) struct FlakyKeysStore {
    inner: InMemorySnapshotStore,
    failures: u32,
    listings: AtomicU32,
}

impl FlakyKeysStore {
    pub(super) fn new(snapshots: Vec<CapacitySnapshot>, failures: u32) -> Self {
        Self {
            inner: InMemorySnapshotStore::with_snapshots(snapshots),
            failures,
            listings: AtomicU32::new(0),
        }
    }

    pub(super) fn listings(&self) -> u32 {
        self.listings.load(Ordering::SeqCst)
    }
}

impl CapacitySnapshotStore for FlakyKeysStore {
    fn history(
        &self,
        facility_id: &FacilityId,
        age_class: AgeClass,
    ) -> Result<Vec<CapacitySnapshot>, RepositoryError> {
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
        let attempt = self.listings.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(RepositoryError::Unavailable("snapshot index rebuilding".to_string()));
        }
        self.inner.keys()
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&body).expect("json body")
}
