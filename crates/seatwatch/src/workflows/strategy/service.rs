use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use super::analysis::{build_widget, ScoredCandidate};
use super::checklist::checklist_for;
use super::domain::{
    AnalyzeRequest, CandidateFacility, ChecklistItem, RecommendationRecord, RecommendationWidget,
    UserContext,
};
use super::params::StrategyParams;
use super::repository::RecommendationRepository;
use super::resolver::FacilityResolver;
use crate::error::ValidationError;
use crate::quota::{Feature, QuotaOracle, RateLimited};
use crate::storage::RepositoryError;
use crate::workflows::admission::domain::MAX_QUEUE_POSITION;
use crate::workflows::admission::{
    AdmissionService, AdmissionServiceError, ScoreCache, ScoreOutcome, ScoreQuery,
};
use crate::workflows::snapshots::{AgeClass, CapacitySnapshotStore, FacilityId};
use crate::workflows::UserId;

/// Scoring seam used by the analyzer. Implemented by [`AdmissionService`].
pub trait CandidateScorer: Send + Sync {
    fn score_candidate(
        &self,
        query: &ScoreQuery,
        now: DateTime<Utc>,
    ) -> Result<ScoreOutcome, AdmissionServiceError>;

    /// Latest published waiting count for the series, if any snapshot exists.
    fn waiting_count(
        &self,
        facility_id: &FacilityId,
        age_class: AgeClass,
    ) -> Result<Option<u32>, RepositoryError>;
}

impl<S, C, Q> CandidateScorer for AdmissionService<S, C, Q>
where
    S: CapacitySnapshotStore + 'static,
    C: ScoreCache + 'static,
    Q: QuotaOracle + 'static,
{
    fn score_candidate(
        &self,
        query: &ScoreQuery,
        now: DateTime<Utc>,
    ) -> Result<ScoreOutcome, AdmissionServiceError> {
        self.score_query(query, now)
    }

    fn waiting_count(
        &self,
        facility_id: &FacilityId,
        age_class: AgeClass,
    ) -> Result<Option<u32>, RepositoryError> {
        Ok(self
            .snapshots()
            .latest(facility_id, age_class)?
            .map(|snapshot| snapshot.waiting_count))
    }
}

/// Route analysis service: scores candidates, builds and persists recommendations.
pub struct StrategyService<A, R, F, Q> {
    scorer: Arc<A>,
    recommendations: Arc<R>,
    resolver: Arc<F>,
    quota: Arc<Q>,
    params: StrategyParams,
}

impl<A, R, F, Q> StrategyService<A, R, F, Q>
where
    A: CandidateScorer + 'static,
    R: RecommendationRepository + 'static,
    F: FacilityResolver + 'static,
    Q: QuotaOracle + 'static,
{
    pub fn new(
        scorer: Arc<A>,
        recommendations: Arc<R>,
        resolver: Arc<F>,
        quota: Arc<Q>,
        params: StrategyParams,
    ) -> Self {
        Self {
            scorer,
            recommendations,
            resolver,
            quota,
            params,
        }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// User-facing analysis: validates, meters, resolves candidates when none were given.
    pub fn analyze(
        &self,
        user_id: &UserId,
        request: AnalyzeRequest,
        now: DateTime<Utc>,
    ) -> Result<RecommendationRecord, StrategyServiceError> {
        let (context, explicit) = request.into_context(user_id.clone())?;

        let decision = self
            .quota
            .check_limit(user_id.as_str(), Feature::StrategyAnalysis, now)?;
        if !decision.allowed {
            return Err(RateLimited::from_decision(Feature::StrategyAnalysis, &decision).into());
        }

        let candidates = match explicit {
            Some(candidates) => candidates,
            None => self
                .resolver
                .resolve(&context.user_id, &context.home, context.child_age_class)?,
        };

        self.analyze_routes(&context, &candidates, now)
    }

    /// Scores, ranks, and persists a recommendation for an already validated context.
    pub fn analyze_routes(
        &self,
        context: &UserContext,
        candidates: &[CandidateFacility],
        now: DateTime<Utc>,
    ) -> Result<RecommendationRecord, StrategyServiceError> {
        for (index, candidate) in candidates.iter().enumerate() {
            candidate.validate(index)?;
        }
        let scored = self.score_candidates(context, candidates, now)?;
        let (widget, chosen) = build_widget(context, scored, &self.params, now);
        let checklist = checklist_for(chosen, context);
        let record = RecommendationRecord { widget, checklist };

        self.recommendations.insert(record.clone())?;
        info!(
            user_id = %context.user_id,
            recommendation_id = %record.widget.recommendation_id,
            candidates = candidates.len(),
            routes = record.widget.routes.len(),
            overall_grade = %record.widget.summary.overall_grade,
            "strategy analysis stored"
        );
        Ok(record)
    }

    pub fn checklist(
        &self,
        recommendation_id: Uuid,
        user_id: &UserId,
    ) -> Result<Vec<ChecklistItem>, StrategyServiceError> {
        self.recommendations
            .fetch(recommendation_id, user_id)?
            .map(|record| record.checklist)
            .ok_or(StrategyServiceError::Repository(RepositoryError::NotFound))
    }

    pub fn toggle(
        &self,
        recommendation_id: Uuid,
        user_id: &UserId,
        key: &str,
    ) -> Result<ChecklistItem, StrategyServiceError> {
        Ok(self
            .recommendations
            .toggle_item(recommendation_id, user_id, key)?)
    }

    /// Previous recommendations, newest first, capped by `history_limit`.
    pub fn history(
        &self,
        user_id: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<RecommendationWidget>, StrategyServiceError> {
        let limit = limit
            .unwrap_or(self.params.history_limit)
            .min(self.params.history_limit)
            .max(1);
        Ok(self.recommendations.history(user_id, limit)?)
    }

    fn score_candidates(
        &self,
        context: &UserContext,
        candidates: &[CandidateFacility],
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredCandidate>, StrategyServiceError> {
        let mut scored = Vec::with_capacity(candidates.len());
        for batch in candidates.chunks(self.params.score_concurrency.max(1)) {
            let results = thread::scope(|scope| {
                let handles = batch
                    .iter()
                    .map(|candidate| scope.spawn(move || self.score_one(context, candidate, now)))
                    .collect::<Vec<_>>();
                handles
                    .into_iter()
                    .map(|handle| {
                        handle.join().unwrap_or_else(|_| {
                            Err(StrategyServiceError::Repository(RepositoryError::Unavailable(
                                "scoring worker panicked".to_string(),
                            )))
                        })
                    })
                    .collect::<Vec<_>>()
            });
            for result in results {
                scored.push(result?);
            }
        }
        Ok(scored)
    }

    fn score_one(
        &self,
        context: &UserContext,
        candidate: &CandidateFacility,
        now: DateTime<Utc>,
    ) -> Result<ScoredCandidate, StrategyServiceError> {
        let queue_position = match candidate.queue_position {
            Some(position) => position,
            None => self
                .scorer
                .waiting_count(&candidate.facility_id, context.child_age_class)?
                .unwrap_or(0)
                .saturating_add(1)
                .min(MAX_QUEUE_POSITION),
        };

        let query = ScoreQuery {
            facility_id: candidate.facility_id.clone(),
            age_class: context.child_age_class,
            queue_position,
            priority_type: context.priority_type,
            category: Some(candidate.category),
        };
        let outcome = self.scorer.score_candidate(&query, now)?;
        Ok(ScoredCandidate {
            candidate: candidate.clone(),
            outcome,
        })
    }
}

/// Error raised by the strategy service.
#[derive(Debug, thiserror::Error)]
pub enum StrategyServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    RateLimited(#[from] RateLimited),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<AdmissionServiceError> for StrategyServiceError {
    fn from(error: AdmissionServiceError) -> Self {
        match error {
            AdmissionServiceError::Validation(error) => Self::Validation(error),
            AdmissionServiceError::RateLimited(limited) => Self::RateLimited(limited),
            AdmissionServiceError::Repository(error) => Self::Repository(error),
        }
    }
}
