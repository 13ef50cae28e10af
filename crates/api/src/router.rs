//! HTTP entry point shared by `main.rs` and `tests/common/mod.rs`.
//!
//! `/health` sits at the root, the session API under `/api/v1`, and every
//! other path gets a JSON 404. Middleware is declared outermost first.

use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::{Json, Router};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::routes;
use crate::state::AppState;

/// Header carrying the per-request UUID. Set when the client sends none and
/// echoed on every response, so dashboards can quote it in bug reports.
pub fn request_id_header() -> HeaderName {
    HeaderName::from_static("x-request-id")
}

/// Build the session service router.
///
/// Outermost first: CORS, request id assignment, tracing (the span sees the
/// id), request id echo, per-request timeout, panic recovery.
pub fn build_app_router(state: AppState, config: &ServerConfig) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id_header(), MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(PropagateRequestIdLayer::new(request_id_header()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(CatchPanicLayer::new());

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .fallback(route_not_found)
        .layer(middleware)
        // CORS stays outermost; applied separately so it wraps axum's body type.
        .layer(build_cors_layer(config))
        .with_state(state)
}

/// Cross-origin access for the teacher and admin dashboards.
///
/// Only the verbs the session API uses are allowed, and the request id is
/// exposed so browser clients can read it.
pub fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(allowed_origins(&config.cors_origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([request_id_header()])
        .max_age(Duration::from_secs(3600))
}

/// Configured origins that form valid header values. Others are logged and
/// left out rather than aborting startup.
fn allowed_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

async fn route_not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": format!("No route for {}", uri.path()),
            "code": "ROUTE_NOT_FOUND",
        })),
    )
}
