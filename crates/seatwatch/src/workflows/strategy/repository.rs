use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use super::domain::{ChecklistItem, RecommendationRecord, RecommendationWidget};
use crate::storage::RepositoryError;
use crate::workflows::UserId;

/// Persistence for recommendations and their checklists, scoped by owner.
pub trait RecommendationRepository: Send + Sync {
    /// Stores a new record; a reused recommendation id is a `Conflict`.
    fn insert(&self, record: RecommendationRecord) -> Result<(), RepositoryError>;

    /// Record owned by `user_id`; records of other users are invisible.
    fn fetch(
        &self,
        recommendation_id: Uuid,
        user_id: &UserId,
    ) -> Result<Option<RecommendationRecord>, RepositoryError>;

    /// Widgets of `user_id`, newest first.
    fn history(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<RecommendationWidget>, RepositoryError>;

    /// Flips `done` on one checklist item atomically and returns the updated item.
    fn toggle_item(
        &self,
        recommendation_id: Uuid,
        user_id: &UserId,
        key: &str,
    ) -> Result<ChecklistItem, RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryRecommendationRepository {
    records: RwLock<HashMap<Uuid, StoredRecord>>,
}

struct StoredRecord {
    sequence: u64,
    record: RecommendationRecord,
}

impl InMemoryRecommendationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Unavailable("recommendation store lock poisoned".to_string())
}

impl RecommendationRepository for InMemoryRecommendationRepository {
    fn insert(&self, record: RecommendationRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.write().map_err(|_| poisoned())?;
        let id = record.widget.recommendation_id;
        if guard.contains_key(&id) {
            return Err(RepositoryError::Conflict);
        }
        let sequence = guard.len() as u64;
        guard.insert(id, StoredRecord { sequence, record });
        Ok(())
    }

    fn fetch(
        &self,
        recommendation_id: Uuid,
        user_id: &UserId,
    ) -> Result<Option<RecommendationRecord>, RepositoryError> {
        let guard = self.records.read().map_err(|_| poisoned())?;
        Ok(guard
            .get(&recommendation_id)
            .filter(|stored| &stored.record.widget.user_id == user_id)
            .map(|stored| stored.record.clone()))
    }

    fn history(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<RecommendationWidget>, RepositoryError> {
        let guard = self.records.read().map_err(|_| poisoned())?;
        let mut owned = guard
            .values()
            .filter(|stored| &stored.record.widget.user_id == user_id)
            .collect::<Vec<_>>();
        owned.sort_by(|left, right| {
            right
                .record
                .widget
                .summary
                .updated_at
                .cmp(&left.record.widget.summary.updated_at)
                .then(right.sequence.cmp(&left.sequence))
        });
        Ok(owned
            .into_iter()
            .take(limit)
            .map(|stored| stored.record.widget.clone())
            .collect())
    }

    fn toggle_item(
        &self,
        recommendation_id: Uuid,
        user_id: &UserId,
        key: &str,
    ) -> Result<ChecklistItem, RepositoryError> {
        let mut guard = self.records.write().map_err(|_| poisoned())?;
        let stored = guard
            .get_mut(&recommendation_id)
            .filter(|stored| &stored.record.widget.user_id == user_id)
            .ok_or(RepositoryError::NotFound)?;
        let item = stored
            .record
            .checklist
            .iter_mut()
            .find(|item| item.key == key)
            .ok_or(RepositoryError::NotFound)?;
        item.done = !item.done;
        Ok(item.clone())
    }
}
