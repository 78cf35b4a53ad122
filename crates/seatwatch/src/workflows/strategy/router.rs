use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use super::domain::AnalyzeRequest;
use super::repository::RecommendationRepository;
use super::resolver::FacilityResolver;
use super::service::{CandidateScorer, StrategyService, StrategyServiceError};
use crate::quota::QuotaOracle;
use crate::storage::RepositoryError;
use crate::workflows::user_from_headers;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoryParams {
    limit: Option<usize>,
}

/// Router exposing route analysis, recommendation history, and checklist endpoints.
pub fn strategy_router<A, R, F, Q>(service: Arc<StrategyService<A, R, F, Q>>) -> Router
where
    A: CandidateScorer + 'static,
    R: RecommendationRepository + 'static,
    F: FacilityResolver + 'static,
    Q: QuotaOracle + 'static,
{
    Router::new()
        .route("/api/v1/strategy/analyze", post(analyze_handler::<A, R, F, Q>))
        .route(
            "/api/v1/strategy/recommendations",
            get(history_handler::<A, R, F, Q>),
        )
        .route(
            "/api/v1/strategy/recommendations/:id/checklist",
            get(checklist_handler::<A, R, F, Q>),
        )
        .route(
            "/api/v1/strategy/recommendations/:id/checklist/:key/toggle",
            post(toggle_handler::<A, R, F, Q>),
        )
        .with_state(service)
}

pub(crate) async fn analyze_handler<A, R, F, Q>(
    State(service): State<Arc<StrategyService<A, R, F, Q>>>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeRequest>,
) -> Response
where
    A: CandidateScorer + 'static,
    R: RecommendationRepository + 'static,
    F: FacilityResolver + 'static,
    Q: QuotaOracle + 'static,
{
    let user_id = match user_from_headers(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match service.analyze(&user_id, request, Utc::now()) {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(error) => strategy_error_response(error),
    }
}

pub(crate) async fn history_handler<A, R, F, Q>(
    State(service): State<Arc<StrategyService<A, R, F, Q>>>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> Response
where
    A: CandidateScorer + 'static,
    R: RecommendationRepository + 'static,
    F: FacilityResolver + 'static,
    Q: QuotaOracle + 'static,
{
    let user_id = match user_from_headers(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match service.history(&user_id, params.limit) {
        Ok(widgets) => (StatusCode::OK, Json(widgets)).into_response(),
        Err(error) => strategy_error_response(error),
    }
}

pub(crate) async fn checklist_handler<A, R, F, Q>(
    State(service): State<Arc<StrategyService<A, R, F, Q>>>,
    headers: HeaderMap,
    Path(recommendation_id): Path<Uuid>,
) -> Response
where
    A: CandidateScorer + 'static,
    R: RecommendationRepository + 'static,
    F: FacilityResolver + 'static,
    Q: QuotaOracle + 'static,
{
    let user_id = match user_from_headers(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match service.checklist(recommendation_id, &user_id) {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(error) => strategy_error_response(error),
    }
}

pub(crate) async fn toggle_handler<A, R, F, Q>(
    State(service): State<Arc<StrategyService<A, R, F, Q>>>,
    headers: HeaderMap,
    Path((recommendation_id, key)): Path<(Uuid, String)>,
) -> Response
where
    A: CandidateScorer + 'static,
    R: RecommendationRepository + 'static,
    F: FacilityResolver + 'static,
    Q: QuotaOracle + 'static,
{
    let user_id = match user_from_headers(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match service.toggle(recommendation_id, &user_id, &key) {
        Ok(item) => (StatusCode::OK, Json(item)).into_response(),
        Err(error) => strategy_error_response(error),
    }
}

fn strategy_error_response(error: StrategyServiceError) -> Response {
    match error {
        StrategyServiceError::Validation(error) => error.into_response(),
        StrategyServiceError::RateLimited(limited) => limited.into_response(),
        StrategyServiceError::Repository(RepositoryError::NotFound) => {
            let payload = json!({ "error": "recommendation or checklist item not found" });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        StrategyServiceError::Repository(RepositoryError::Unavailable(reason)) => {
            warn!(%reason, "dependency unavailable during strategy analysis");
            let payload = json!({
                "error": "strategy data temporarily unavailable, try again later",
            });
            (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response()
        }
        StrategyServiceError::Repository(other) => {
            let payload = json!({ "error": other.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}
