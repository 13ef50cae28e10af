pub mod health;
pub mod sessions;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /sessions                                   create
/// /sessions/stats                             dashboard statistics
/// /sessions/{id}                              snapshot
/// /sessions/{id}/readiness                    what blocks end
/// /sessions/{id}/available|start|end          lifecycle transitions (POST)
/// /sessions/{id}/leave|absent                 lifecycle transitions (POST)
/// /sessions/{id}/attendance/{student_id}      mark one participant (PUT)
/// /sessions/{id}/lessons                      replace lesson list (PUT)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/sessions", sessions::router())
}
