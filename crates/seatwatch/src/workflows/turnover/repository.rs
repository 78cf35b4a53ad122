use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::domain::{EventKey, TOEvent};
use crate::storage::{InsertOutcome, RepositoryError};
use crate::workflows::snapshots::FacilityId;

/// Event storage with a unique index on (facility, age class, detection window).
pub trait ToEventRepository: Send + Sync {
    /// Inserts unless an event already holds the same key; the stored event is never replaced.
    fn insert_unique(&self, event: TOEvent) -> Result<InsertOutcome<TOEvent>, RepositoryError>;

    /// Events detected at or after `since`, newest first.
    fn recent(
        &self,
        facility_id: Option<&FacilityId>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TOEvent>, RepositoryError>;

    /// Events detected at or after `since` whose fan-out has not completed, oldest first.
    fn undispatched(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TOEvent>, RepositoryError>;

    /// Records a completed fan-out. Unknown ids are `NotFound`.
    fn mark_dispatched(&self, event_id: Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryToEventStore {
    inner: Mutex<EventTable>,
}

#[derive(Default)]
struct EventTable {
    by_key: HashMap<EventKey, usize>,
    events: Vec<TOEvent>,
    dispatched: HashMap<Uuid, DateTime<Utc>>,
}

impl InMemoryToEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|table| table.events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Unavailable("event store lock poisoned".to_string())
}

impl ToEventRepository for InMemoryToEventStore {
    fn insert_unique(&self, event: TOEvent) -> Result<InsertOutcome<TOEvent>, RepositoryError> {
        let mut table = self.inner.lock().map_err(|_| poisoned())?;
        let key = event.key();
        if table.by_key.contains_key(&key) {
            return Ok(InsertOutcome::Duplicate);
        }
        let index = table.events.len();
        table.events.push(event.clone());
        table.by_key.insert(key, index);
        Ok(InsertOutcome::Inserted(event))
    }

    fn recent(
        &self,
        facility_id: Option<&FacilityId>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TOEvent>, RepositoryError> {
        let table = self.inner.lock().map_err(|_| poisoned())?;
        let mut matching = table
            .events
            .iter()
            .filter(|event| event.detected_at >= since)
            .filter(|event| facility_id.map_or(true, |id| &event.facility_id == id))
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by(|left, right| right.detected_at.cmp(&left.detected_at));
        matching.truncate(limit);
        Ok(matching)
    }

    fn undispatched(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TOEvent>, RepositoryError> {
        let table = self.inner.lock().map_err(|_| poisoned())?;
        let mut pending = table
            .events
            .iter()
            .filter(|event| event.detected_at >= since)
            .filter(|event| !table.dispatched.contains_key(&event.event_id))
            .cloned()
            .collect::<Vec<_>>();
        pending.sort_by(|left, right| left.detected_at.cmp(&right.detected_at));
        pending.truncate(limit);
        Ok(pending)
    }

    fn mark_dispatched(&self, event_id: Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut table = self.inner.lock().map_err(|_| poisoned())?;
        if !table.events.iter().any(|event| event.event_id == event_id) {
            return Err(RepositoryError::NotFound);
        }
        table.dispatched.entry(event_id).or_insert(at);
        Ok(())
    }
}
