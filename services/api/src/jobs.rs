use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use seatwatch::workflows::alerts::{DispatchReport, ReceiptReport};
use seatwatch::workflows::turnover::{DetectionReport, InMemoryToEventStore};
use tracing::{info, warn};

use crate::infra::{Detector, Dispatcher};

/// Detection followed by fan-out of every stored event still awaiting dispatch.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct DetectToReport {
    #[serde(flatten)]
    pub(crate) detection: DetectionReport,
    pub(crate) dispatch: DispatchReport,
}

/// The two batch jobs, shared by the scheduler and the trigger endpoints.
pub(crate) struct JobRunner {
    detector: Arc<Detector>,
    dispatcher: Arc<Dispatcher>,
    events: Arc<InMemoryToEventStore>,
    detect_budget: Duration,
}

impl JobRunner {
    pub(crate) fn new(
        detector: Arc<Detector>,
        dispatcher: Arc<Dispatcher>,
        events: Arc<InMemoryToEventStore>,
        detect_budget: Duration,
    ) -> Self {
        Self {
            detector,
            dispatcher,
            events,
            detect_budget,
        }
    }

    pub(crate) fn detect_to(&self, now: DateTime<Utc>) -> DetectToReport {
        let run = self.detector.run(now, self.detect_budget);
        let dispatch = self.dispatcher.dispatch_outstanding(self.events.as_ref(), now);
        DetectToReport {
            detection: run.report,
            dispatch,
        }
    }

    pub(crate) fn push_receipts(&self, now: DateTime<Utc>) -> ReceiptReport {
        self.dispatcher.reconcile(now)
    }
}

#[derive(Clone)]
pub(crate) struct JobState {
    pub(crate) runner: Arc<JobRunner>,
    pub(crate) job_token: Option<String>,
}

pub(crate) fn jobs_router(state: JobState) -> Router {
    Router::new()
        .route("/api/v1/jobs/detect-to", post(detect_to_handler))
        .route("/api/v1/jobs/push-receipts", post(push_receipts_handler))
        .with_state(state)
}

pub(crate) async fn detect_to_handler(State(state): State<JobState>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize(&headers, state.job_token.as_deref()) {
        return response;
    }

    let runner = state.runner.clone();
    match tokio::task::spawn_blocking(move || runner.detect_to(Utc::now())).await {
        Ok(report) => {
            info!(
                events = report.detection.events_emitted,
                deliveries = report.dispatch.deliveries_created,
                "detect-to triggered manually"
            );
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(error) => job_panicked("detect-to", error),
    }
}

pub(crate) async fn push_receipts_handler(
    State(state): State<JobState>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authorize(&headers, state.job_token.as_deref()) {
        return response;
    }

    let runner = state.runner.clone();
    match tokio::task::spawn_blocking(move || runner.push_receipts(Utc::now())).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(error) => job_panicked("push-receipts", error),
    }
}

/// Accepts `Authorization: Bearer <token>` or `x-admin-key: <token>`.
fn authorize(headers: &HeaderMap, expected: Option<&str>) -> Result<(), Response> {
    let Some(expected) = expected else {
        let payload = json!({ "error": "job triggers are disabled: JOB_TOKEN is not configured" });
        return Err((StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response());
    };

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    let admin_key = headers
        .get("x-admin-key")
        .and_then(|value| value.to_str().ok())
        .map(str::trim);

    if bearer == Some(expected) || admin_key == Some(expected) {
        Ok(())
    } else {
        let payload = json!({ "error": "invalid job token" });
        Err((StatusCode::UNAUTHORIZED, Json(payload)).into_response())
    }
}

fn job_panicked(job: &'static str, error: tokio::task::JoinError) -> Response {
    warn!(job, %error, "batch job aborted");
    let payload = json!({ "error": format!("{job} job aborted") });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}
