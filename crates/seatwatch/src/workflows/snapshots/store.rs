use std::collections::BTreeMap;
use std::sync::RwLock;

use super::domain::{AgeClass, CapacitySnapshot, FacilityId, SnapshotKey};
use crate::storage::RepositoryError;

/// Narrow read/append interface over the capacity observation history.
pub trait CapacitySnapshotStore: Send + Sync {
    /// Observations for the series ordered by `observed_at` ascending.
    fn history(
        &self,
        facility_id: &FacilityId,
        age_class: AgeClass,
    ) -> Result<Vec<CapacitySnapshot>, RepositoryError>;

    fn latest(
        &self,
        facility_id: &FacilityId,
        age_class: AgeClass,
    ) -> Result<Option<CapacitySnapshot>, RepositoryError>;

    /// Appends an observation; earlier observations are never rewritten.
    fn append(&self, snapshot: CapacitySnapshot) -> Result<(), RepositoryError>;

    /// Every series with at least one observation, ordered by facility then age class.
    fn keys(&self) -> Result<Vec<SnapshotKey>, RepositoryError>;
}

/// Snapshot history held in memory, keyed in stable order.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    series: RwLock<BTreeMap<SnapshotKey, Vec<CapacitySnapshot>>>,
}

impl InMemorySnapshotStore {
    pub fn with_snapshots(snapshots: impl IntoIterator<Item = CapacitySnapshot>) -> Self {
        let store = Self::default();
        for snapshot in snapshots {
            // in-memory appends only fail on a poisoned lock, which cannot happen here
            let _ = store.append(snapshot);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.series
            .read()
            .map(|guard| guard.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Unavailable("snapshot store lock poisoned".to_string())
}

impl CapacitySnapshotStore for InMemorySnapshotStore {
    fn history(
        &self,
        facility_id: &FacilityId,
        age_class: AgeClass,
    ) -> Result<Vec<CapacitySnapshot>, RepositoryError> {
        let guard = self.series.read().map_err(|_| poisoned())?;
        let key = SnapshotKey::new(facility_id.clone(), age_class);
        Ok(guard.get(&key).cloned().unwrap_or_default())
    }

    fn latest(
        &self,
        facility_id: &FacilityId,
        age_class: AgeClass,
    ) -> Result<Option<CapacitySnapshot>, RepositoryError> {
        let guard = self.series.read().map_err(|_| poisoned())?;
        let key = SnapshotKey::new(facility_id.clone(), age_class);
        Ok(guard.get(&key).and_then(|series| series.last().cloned()))
    }

    fn append(&self, snapshot: CapacitySnapshot) -> Result<(), RepositoryError> {
        let mut guard = self.series.write().map_err(|_| poisoned())?;
        let series = guard.entry(snapshot.key()).or_default();
        let position = series.partition_point(|existing| existing.observed_at <= snapshot.observed_at);
        series.insert(position, snapshot);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<SnapshotKey>, RepositoryError> {
        let guard = self.series.read().map_err(|_| poisoned())?;
        Ok(guard.keys().cloned().collect())
    }
}
