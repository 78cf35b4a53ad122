use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use super::domain::{AdmissionScoreResult, FacilityCategory, PriorityType};
use crate::workflows::snapshots::{AgeClass, FacilityId};

/// Deterministic identity of a cached score.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScoreCacheKey {
    pub facility_id: FacilityId,
    pub age_class: AgeClass,
    pub queue_bucket: u32,
    pub priority_type: PriorityType,
    pub category: Option<FacilityCategory>,
    /// Calendar month of the scoring date; the seasonal curve starts there.
    pub scoring_month: u32,
    pub model_version: String,
}

/// TTL cache for score results. Misses and failures are indistinguishable to callers.
pub trait ScoreCache: Send + Sync {
    fn get(&self, key: &ScoreCacheKey, now: DateTime<Utc>) -> Option<AdmissionScoreResult>;
    fn put(
        &self,
        key: ScoreCacheKey,
        result: AdmissionScoreResult,
        ttl: Duration,
        now: DateTime<Utc>,
    );
}

#[derive(Default)]
pub struct InMemoryScoreCache {
    entries: Mutex<HashMap<ScoreCacheKey, (AdmissionScoreResult, DateTime<Utc>)>>,
}

impl InMemoryScoreCache {
    /// Evicts expired entries and returns how many were dropped.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let Ok(mut guard) = self.entries.lock() else {
            return 0;
        };
        let before = guard.len();
        guard.retain(|_, (_, expires_at)| *expires_at > now);
        before - guard.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScoreCache for InMemoryScoreCache {
    fn get(&self, key: &ScoreCacheKey, now: DateTime<Utc>) -> Option<AdmissionScoreResult> {
        let mut guard = self.entries.lock().ok()?;
        match guard.get(key) {
            Some((result, expires_at)) if *expires_at > now => Some(result.clone()),
            Some(_) => {
                guard.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(
        &self,
        key: ScoreCacheKey,
        result: AdmissionScoreResult,
        ttl: Duration,
        now: DateTime<Utc>,
    ) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.insert(key, (result, now + ttl));
        }
    }
}
