use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use super::domain::{RegisterTokenRequest, SubscribeRequest};
use super::repository::{PushTokenRepository, SubscriptionRepository};
use super::subscriptions::{AlertServiceError, SubscriptionService};
use crate::quota::QuotaOracle;
use crate::storage::RepositoryError;
use crate::workflows::user_from_headers;

/// Router exposing subscription and push-token management.
pub fn alerts_router<R, Q>(service: Arc<SubscriptionService<R, Q>>) -> Router
where
    R: SubscriptionRepository + PushTokenRepository + 'static,
    Q: QuotaOracle + 'static,
{
    Router::new()
        .route(
            "/api/v1/alerts/subscriptions",
            post(subscribe_handler::<R, Q>).get(list_handler::<R, Q>),
        )
        .route(
            "/api/v1/alerts/subscriptions/:facility_id",
            delete(unsubscribe_handler::<R, Q>),
        )
        .route("/api/v1/alerts/tokens", post(register_token_handler::<R, Q>))
        .with_state(service)
}

pub(crate) async fn subscribe_handler<R, Q>(
    State(service): State<Arc<SubscriptionService<R, Q>>>,
    headers: HeaderMap,
    Json(request): Json<SubscribeRequest>,
) -> Response
where
    R: SubscriptionRepository + PushTokenRepository + 'static,
    Q: QuotaOracle + 'static,
{
    let user_id = match user_from_headers(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match service.subscribe(&user_id, &request, Utc::now()) {
        Ok(subscription) => (StatusCode::CREATED, Json(subscription)).into_response(),
        Err(error) => alert_error_response(error),
    }
}

pub(crate) async fn list_handler<R, Q>(
    State(service): State<Arc<SubscriptionService<R, Q>>>,
    headers: HeaderMap,
) -> Response
where
    R: SubscriptionRepository + PushTokenRepository + 'static,
    Q: QuotaOracle + 'static,
{
    let user_id = match user_from_headers(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match service.list(&user_id) {
        Ok(subscriptions) => (StatusCode::OK, Json(subscriptions)).into_response(),
        Err(error) => alert_error_response(error),
    }
}

pub(crate) async fn unsubscribe_handler<R, Q>(
    State(service): State<Arc<SubscriptionService<R, Q>>>,
    headers: HeaderMap,
    Path(facility_id): Path<String>,
) -> Response
where
    R: SubscriptionRepository + PushTokenRepository + 'static,
    Q: QuotaOracle + 'static,
{
    let user_id = match user_from_headers(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match service.unsubscribe(&user_id, &facility_id, Utc::now()) {
        Ok(subscription) => (StatusCode::OK, Json(subscription)).into_response(),
        Err(error) => alert_error_response(error),
    }
}

pub(crate) async fn register_token_handler<R, Q>(
    State(service): State<Arc<SubscriptionService<R, Q>>>,
    headers: HeaderMap,
    Json(request): Json<RegisterTokenRequest>,
) -> Response
where
    R: SubscriptionRepository + PushTokenRepository + 'static,
    Q: QuotaOracle + 'static,
{
    let user_id = match user_from_headers(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match service.register_token(&user_id, &request, Utc::now()) {
        Ok(token) => (
            StatusCode::OK,
            Json(json!({ "ok": true, "is_active": token.is_active })),
        )
            .into_response(),
        Err(error) => alert_error_response(error),
    }
}

fn alert_error_response(error: AlertServiceError) -> Response {
    match error {
        AlertServiceError::Validation(error) => error.into_response(),
        AlertServiceError::RateLimited(limited) => limited.into_response(),
        AlertServiceError::Repository(RepositoryError::NotFound) => {
            let payload = json!({ "error": "subscription not found" });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        AlertServiceError::Repository(RepositoryError::Unavailable(reason)) => {
            warn!(%reason, "alert store unavailable");
            let payload = json!({ "error": "alerts temporarily unavailable, try again later" });
            (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response()
        }
        AlertServiceError::Repository(other) => {
            let payload = json!({ "error": other.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}
