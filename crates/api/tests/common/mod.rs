#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use chrono::{TimeZone, Utc};
use classdesk_core::dates;
use classdesk_core::engine::LifecycleEngine;
use classdesk_core::store::MemoryStore;
use classdesk_core::types::{system_clock, Clock, Timestamp};
use classdesk_events::EventBus;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use classdesk_api::config::ServerConfig;
use classdesk_api::router::build_app_router;
use classdesk_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        reference_offset: dates::default_reference_offset(),
        database_url: None,
    }
}

/// Application state over a fresh in-memory store.
pub fn test_state(clock: Clock) -> AppState {
    let store = Arc::new(MemoryStore::new());
    AppState {
        engine: Arc::new(LifecycleEngine::with_clock(store, clock)),
        config: Arc::new(test_config()),
        event_bus: Arc::new(EventBus::default()),
        pool: None,
    }
}

/// Build the full application router (same middleware stack as `main.rs`)
/// over an in-memory store and the wall clock.
pub fn build_test_app() -> Router {
    build_app_router(test_state(system_clock()), &test_config())
}

/// Build the router from an existing state, e.g. to subscribe to its bus.
pub fn build_test_app_with_state(state: AppState) -> Router {
    build_app_router(state, &test_config())
}

/// A clock frozen at `at`.
pub fn fixed_clock(at: Timestamp) -> Clock {
    Arc::new(move || at)
}

/// 2024-05-10 06:00 UTC, which is 11:30 on the same day at +05:30.
pub fn reference_now() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap()
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri, None).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn put_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(body)).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn new_session_body(participants: &[i64], class_date: &str) -> Value {
    json!({
        "subject_id": 1,
        "teacher_id": 7,
        "slot": {
            "day": "Friday",
            "start_time": "16:00",
            "end_time": "17:00",
            "class_date": class_date,
        },
        "participants": participants,
    })
}

/// Create a session and return its id.
pub async fn create_session(app: &Router, participants: &[i64], class_date: &str) -> i64 {
    let response = post_json(
        app,
        "/api/v1/sessions",
        new_session_body(participants, class_date),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    body_json(response).await["data"]["session"]["id"]
        .as_i64()
        .unwrap()
}

pub async fn mark(app: &Router, session_id: i64, student_id: i64, status: &str) -> Response<Body> {
    put_json(
        app,
        &format!("/api/v1/sessions/{session_id}/attendance/{student_id}"),
        json!({ "status": status }),
    )
    .await
}
