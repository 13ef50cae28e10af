//! Route definitions for the `/sessions` resource.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::sessions;
use crate::state::AppState;

/// Routes mounted at `/sessions`.
///
/// ```text
/// POST /                                -> create_session
/// GET  /stats                           -> stats (?teacher_id, ?student_id, ?status)
/// GET  /{id}                            -> get_session
/// GET  /{id}/readiness                  -> readiness
/// POST /{id}/available                  -> mark_available
/// POST /{id}/start                      -> start_class
/// POST /{id}/end                        -> end_class
/// POST /{id}/leave                      -> mark_leave
/// POST /{id}/absent                     -> mark_absent
/// PUT  /{id}/attendance/{student_id}    -> mark_attendance
/// PUT  /{id}/lessons                    -> upsert_lessons
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(sessions::create_session))
        .route("/stats", get(sessions::stats))
        .route("/{id}", get(sessions::get_session))
        .route("/{id}/readiness", get(sessions::readiness))
        .route("/{id}/available", post(sessions::mark_available))
        .route("/{id}/start", post(sessions::start_class))
        .route("/{id}/end", post(sessions::end_class))
        .route("/{id}/leave", post(sessions::mark_leave))
        .route("/{id}/absent", post(sessions::mark_absent))
        .route(
            "/{id}/attendance/{student_id}",
            put(sessions::mark_attendance),
        )
        .route("/{id}/lessons", put(sessions::upsert_lessons))
}
