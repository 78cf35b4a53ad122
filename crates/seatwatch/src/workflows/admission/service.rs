use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use super::cache::{ScoreCache, ScoreCacheKey};
use super::domain::{ScoreOutcome, ScoreQuery, ScoreRequest};
use super::engine::AdmissionEngine;
use super::params::ScoringParams;
use crate::error::ValidationError;
use crate::quota::{Feature, QuotaOracle, RateLimited};
use crate::storage::RepositoryError;
use crate::workflows::snapshots::CapacitySnapshotStore;
use crate::workflows::UserId;

/// Service composing the snapshot store, score cache, quota oracle, and engine.
pub struct AdmissionService<S, C, Q> {
    snapshots: Arc<S>,
    cache: Arc<C>,
    quota: Arc<Q>,
    engine: Arc<AdmissionEngine>,
}

impl<S, C, Q> AdmissionService<S, C, Q>
where
    S: CapacitySnapshotStore + 'static,
    C: ScoreCache + 'static,
    Q: QuotaOracle + 'static,
{
    pub fn new(snapshots: Arc<S>, cache: Arc<C>, quota: Arc<Q>, params: ScoringParams) -> Self {
        Self {
            snapshots,
            cache,
            quota,
            engine: Arc::new(AdmissionEngine::new(params)),
        }
    }

    pub fn engine(&self) -> &AdmissionEngine {
        &self.engine
    }

    pub fn snapshots(&self) -> &S {
        &self.snapshots
    }

    /// User-facing scoring: validates, meters, then scores.
    pub fn score(
        &self,
        user_id: &UserId,
        request: &ScoreRequest,
        now: DateTime<Utc>,
    ) -> Result<ScoreOutcome, AdmissionServiceError> {
        let query = request.validate()?;

        let decision = self
            .quota
            .check_limit(user_id.as_str(), Feature::AdmissionScore, now)?;
        if !decision.allowed {
            return Err(RateLimited::from_decision(Feature::AdmissionScore, &decision).into());
        }

        self.score_query(&query, now)
    }

    /// Scores an already validated query without metering; cached results get a fresh
    /// request id and are stamped with `now`.
    pub fn score_query(
        &self,
        query: &ScoreQuery,
        now: DateTime<Utc>,
    ) -> Result<ScoreOutcome, AdmissionServiceError> {
        let key = self.cache_key(query, now);
        if let Some(cached) = self.cache.get(&key, now) {
            debug!(facility_id = %query.facility_id, age_class = %query.age_class, "score cache hit");
            return Ok(ScoreOutcome::Estimated(cached).reissued(Uuid::new_v4(), now));
        }

        let history = self
            .snapshots
            .history(&query.facility_id, query.age_class)?;
        let outcome = self.engine.score(query, &history, now);

        if let ScoreOutcome::Estimated(result) = &outcome {
            let ttl = Duration::seconds(self.engine.params().cache_ttl_secs.max(0));
            self.cache.put(key, result.clone(), ttl, now);
        }

        Ok(outcome)
    }

    fn cache_key(&self, query: &ScoreQuery, now: DateTime<Utc>) -> ScoreCacheKey {
        ScoreCacheKey {
            facility_id: query.facility_id.clone(),
            age_class: query.age_class,
            queue_bucket: self.engine.params().queue_bucket(query.queue_position),
            priority_type: query.priority_type,
            category: query.category,
            scoring_month: now.month(),
            model_version: self.engine.model_version(),
        }
    }
}

/// Error raised by the admission service.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    RateLimited(#[from] RateLimited),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
