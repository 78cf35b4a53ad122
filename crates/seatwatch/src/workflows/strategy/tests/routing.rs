use std::sync::Arc;

use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::quota::Tier;
use crate::workflows::strategy::strategy_router;

fn post_json(uri: &str, user: Option<&str>, body: serde_json::Value) -> Request<axum::body::Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder
        .body(axum::body::Body::from(body.to_string()))
        .expect("request builds")
}

fn get(uri: &str, user: &str) -> Request<axum::body::Body> {
    Request::get(uri)
        .header("x-user-id", user)
        .body(axum::body::Body::empty())
        .expect("request builds")
}

fn analyze_body() -> serde_json::Value {
    json!({
        "home": { "lat": 37.5665, "lng": 126.9780 },
        "child_age_class": "AGE_2",
        "desired_start_month": "2030-03",
        "candidates": [
            {
                "facility_id": "F-public",
                "name": "Sunflower Daycare",
                "category": "public",
                "queue_position": 5
            }
        ]
    })
}

fn router() -> axum::Router {
    let service = build_strategy(Arc::new(admission(mixed_histories())), Tier::Premium);
    strategy_router(Arc::new(service))
}

#[tokio::test]
async fn analyze_creates_recommendation_and_checklist_toggles() {
    let app = router();
    let response = app
        .clone()
        .oneshot(post_json("/api/v1/strategy/analyze", Some("parent-1"), analyze_body()))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["widget"]["routes"][0]["kind"], "public");
    assert!(payload["widget"]["summary"]["overall_grade"].is_string());
    let id = payload["widget"]["recommendation_id"]
        .as_str()
        .expect("recommendation id")
        .to_string();

    let toggle_uri = format!("/api/v1/strategy/recommendations/{id}/checklist/health_check/toggle");
    let response = app
        .clone()
        .oneshot(post_json(&toggle_uri, Some("parent-1"), json!({})))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["done"], true);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/strategy/recommendations/{id}/checklist"), "parent-1"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let items = read_json_body(response).await;
    assert!(items
        .as_array()
        .expect("checklist array")
        .iter()
        .any(|item| item["key"] == "health_check" && item["done"] == true));

    let response = app
        .oneshot(get("/api/v1/strategy/recommendations", "parent-1"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let response = router()
        .oneshot(post_json("/api/v1/strategy/analyze", None, analyze_body()))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn out_of_range_latitude_is_unprocessable() {
    let mut body = analyze_body();
    body["home"]["lat"] = json!(123.0);
    let response = router()
        .oneshot(post_json("/api/v1/strategy/analyze", Some("parent-1"), body))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(read_json_body(response).await["field"], "home.lat");
}

#[tokio::test]
async fn unknown_recommendation_is_not_found() {
    let uri = format!(
        "/api/v1/strategy/recommendations/{}/checklist",
        uuid::Uuid::new_v4()
    );
    let response = router()
        .oneshot(get(&uri, "parent-1"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
