//! Handlers for the `/sessions` resource.
//!
//! Every mutating handler delegates to the [`LifecycleEngine`] and, once the
//! change is committed, publishes the matching [`LifecycleEvent`].
//!
//! [`LifecycleEngine`]: classdesk_core::engine::LifecycleEngine

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use classdesk_core::attendance::{AttendanceEntry, AttendanceStatus};
use classdesk_core::engine::{SessionSnapshot, TransitionOutcome};
use classdesk_core::error::CoreResult;
use classdesk_core::lesson::{LessonDraft, LessonEntry};
use classdesk_core::lifecycle::ClosureReadiness;
use classdesk_core::session::{NewSession, SessionFilter};
use classdesk_core::stats::SessionStats;
use classdesk_core::types::DbId;
use classdesk_events::LifecycleEvent;
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `PUT /sessions/{id}/attendance/{student_id}`.
#[derive(Debug, Deserialize)]
pub struct MarkAttendanceRequest {
    /// `present`, `absent` or `leave`.
    pub status: String,
    #[serde(default)]
    pub remarks: String,
}

/// Request body for `PUT /sessions/{id}/lessons`.
#[derive(Debug, Deserialize)]
pub struct UpsertLessonsRequest {
    pub lessons: Vec<LessonDraft>,
}

// ---------------------------------------------------------------------------
// Registration and reads
// ---------------------------------------------------------------------------

/// POST /api/v1/sessions
///
/// Register a pre-assigned session in `pending` with an unmarked attendance
/// entry per participant.
pub async fn create_session(
    State(state): State<AppState>,
    payload: Result<Json<NewSession>, JsonRejection>,
) -> AppResult<(StatusCode, Json<DataResponse<SessionSnapshot>>)> {
    let Json(input) = payload?;
    let snapshot = state.engine.create_session(&input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: snapshot })))
}

/// GET /api/v1/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<SessionSnapshot>>> {
    let snapshot = state.engine.snapshot(id).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// GET /api/v1/sessions/{id}/readiness
///
/// Report what still blocks ending the class.
pub async fn readiness(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ClosureReadiness>>> {
    let report = state.engine.readiness(id).await?;
    Ok(Json(DataResponse { data: report }))
}

/// GET /api/v1/sessions/stats
///
/// Dashboard statistics. "Today" is evaluated in the configured reference
/// zone.
pub async fn stats(
    State(state): State<AppState>,
    filter: Result<Query<SessionFilter>, QueryRejection>,
) -> AppResult<Json<DataResponse<SessionStats>>> {
    let Query(filter) = filter?;
    let stats = state
        .engine
        .stats(&filter, &state.config.reference_offset)
        .await?;
    Ok(Json(DataResponse { data: stats }))
}

// ---------------------------------------------------------------------------
// Lifecycle transitions
// ---------------------------------------------------------------------------

/// POST /api/v1/sessions/{id}/available
pub async fn mark_available(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<TransitionOutcome>>> {
    publish_transition(&state, state.engine.mark_available(id).await)
}

/// POST /api/v1/sessions/{id}/start
pub async fn start_class(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<TransitionOutcome>>> {
    publish_transition(&state, state.engine.start_class(id).await)
}

/// POST /api/v1/sessions/{id}/end
///
/// Fails with 422 while attendance or the lesson record is incomplete.
pub async fn end_class(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<TransitionOutcome>>> {
    publish_transition(&state, state.engine.end_class(id).await)
}

/// POST /api/v1/sessions/{id}/leave
///
/// Puts every participant on leave, or nobody.
pub async fn mark_leave(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<TransitionOutcome>>> {
    publish_transition(&state, state.engine.mark_leave(id).await)
}

/// POST /api/v1/sessions/{id}/absent
pub async fn mark_absent(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<TransitionOutcome>>> {
    publish_transition(&state, state.engine.mark_absent(id).await)
}

// ---------------------------------------------------------------------------
// Attendance and lessons
// ---------------------------------------------------------------------------

/// PUT /api/v1/sessions/{id}/attendance/{student_id}
pub async fn mark_attendance(
    State(state): State<AppState>,
    Path((id, student_id)): Path<(DbId, DbId)>,
    payload: Result<Json<MarkAttendanceRequest>, JsonRejection>,
) -> AppResult<Json<DataResponse<AttendanceEntry>>> {
    let Json(input) = payload?;
    let status = AttendanceStatus::parse_markable(&input.status)?;
    let entry = state
        .engine
        .mark_attendance(id, student_id, status, &input.remarks)
        .await?;

    state
        .event_bus
        .publish(LifecycleEvent::attendance_marked(&entry));
    Ok(Json(DataResponse { data: entry }))
}

/// PUT /api/v1/sessions/{id}/lessons
///
/// Replace the lesson list. Drafts may be incomplete until the class ends.
pub async fn upsert_lessons(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    payload: Result<Json<UpsertLessonsRequest>, JsonRejection>,
) -> AppResult<Json<DataResponse<Vec<LessonEntry>>>> {
    let Json(input) = payload?;
    let lessons = state.engine.upsert_lessons(id, &input.lessons).await?;

    state
        .event_bus
        .publish(LifecycleEvent::lessons_updated(id, &lessons));
    Ok(Json(DataResponse { data: lessons }))
}

// ── Private helpers ──────────────────────────────────────────────────────

fn publish_transition(
    state: &AppState,
    result: CoreResult<TransitionOutcome>,
) -> AppResult<Json<DataResponse<TransitionOutcome>>> {
    let outcome = result?;
    state.event_bus.publish(LifecycleEvent::transition(&outcome));
    Ok(Json(DataResponse { data: outcome }))
}
