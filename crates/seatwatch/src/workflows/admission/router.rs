use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use super::cache::ScoreCache;
use super::domain::ScoreRequest;
use super::service::{AdmissionService, AdmissionServiceError};
use crate::quota::QuotaOracle;
use crate::storage::RepositoryError;
use crate::workflows::snapshots::CapacitySnapshotStore;
use crate::workflows::user_from_headers;

/// Router exposing the admission scoring endpoint.
pub fn admission_router<S, C, Q>(service: Arc<AdmissionService<S, C, Q>>) -> Router
where
    S: CapacitySnapshotStore + 'static,
    C: ScoreCache + 'static,
    Q: QuotaOracle + 'static,
{
    Router::new()
        .route("/api/v1/admission/score", post(score_handler::<S, C, Q>))
        .with_state(service)
}

pub(crate) async fn score_handler<S, C, Q>(
    State(service): State<Arc<AdmissionService<S, C, Q>>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ScoreRequest>,
) -> Response
where
    S: CapacitySnapshotStore + 'static,
    C: ScoreCache + 'static,
    Q: QuotaOracle + 'static,
{
    let user_id = match user_from_headers(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match service.score(&user_id, &request, Utc::now()) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => admission_error_response(error),
    }
}

pub(crate) fn admission_error_response(error: AdmissionServiceError) -> Response {
    match error {
        AdmissionServiceError::Validation(error) => error.into_response(),
        AdmissionServiceError::RateLimited(limited) => limited.into_response(),
        AdmissionServiceError::Repository(RepositoryError::Unavailable(reason)) => {
            warn!(%reason, "snapshot store unavailable during scoring");
            let payload = json!({
                "error": "capacity data temporarily unavailable, try again later",
            });
            (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
        }
        AdmissionServiceError::Repository(other) => {
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
