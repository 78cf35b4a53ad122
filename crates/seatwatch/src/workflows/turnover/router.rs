use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use super::repository::ToEventRepository;
use crate::error::ValidationError;
use crate::workflows::snapshots::FacilityId;
use crate::workflows::user_from_headers;

const DEFAULT_LOOKBACK_HOURS: i64 = 24;
const MAX_LOOKBACK_HOURS: i64 = 24 * 14;
const MAX_EVENTS: usize = 200;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RecentEventsQuery {
    facility_id: Option<String>,
    hours: Option<i64>,
    limit: Option<usize>,
}

/// Router listing recently detected TO events.
pub fn to_events_router<E>(events: Arc<E>) -> Router
where
    E: ToEventRepository + 'static,
{
    Router::new()
        .route("/api/v1/to-events", get(recent_events_handler::<E>))
        .with_state(events)
}

pub(crate) async fn recent_events_handler<E>(
    State(events): State<Arc<E>>,
    headers: HeaderMap,
    Query(query): Query<RecentEventsQuery>,
) -> Response
where
    E: ToEventRepository + 'static,
{
    if let Err(response) = user_from_headers(&headers) {
        return response;
    }

    let facility_id = match query.facility_id.as_deref().map(FacilityId::parse).transpose() {
        Ok(facility_id) => facility_id,
        Err(error) => return error.into_response(),
    };
    let hours = query.hours.unwrap_or(DEFAULT_LOOKBACK_HOURS);
    if !(1..=MAX_LOOKBACK_HOURS).contains(&hours) {
        return ValidationError::new("hours", format!("must be within 1..={MAX_LOOKBACK_HOURS}"))
            .into_response();
    }
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_EVENTS);
    let since = Utc::now() - Duration::hours(hours);

    match events.recent(facility_id.as_ref(), since, limit) {
        Ok(events) => (StatusCode::OK, Json(events)).into_response(),
        Err(error) => {
            let payload = json!({ "error": error.to_string() });
            let status = if error.is_transient() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(payload)).into_response()
        }
    }
}
