use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use classdesk_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `classdesk_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A malformed request (body or query string) with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None)
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(details) = details {
            body["details"] = details;
        }

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a domain error into an HTTP status, error code, message and
/// optional structured details.
fn classify_core_error(
    err: &CoreError,
) -> (StatusCode, &'static str, String, Option<serde_json::Value>) {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
            None,
        ),
        CoreError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
        }
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone(), None),
        CoreError::InvalidTransition { operation, from } => (
            StatusCode::CONFLICT,
            "INVALID_TRANSITION",
            err.to_string(),
            Some(json!({ "operation": operation, "from": from })),
        ),
        CoreError::AttendanceIncomplete { missing_students } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "ATTENDANCE_INCOMPLETE",
            err.to_string(),
            Some(json!({ "missing_students": missing_students })),
        ),
        CoreError::LessonIncomplete { reason } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "LESSON_INCOMPLETE",
            err.to_string(),
            Some(json!({ "reason": reason })),
        ),
        CoreError::AlreadyMarked { session_id, student_id } => (
            StatusCode::CONFLICT,
            "ALREADY_MARKED",
            err.to_string(),
            Some(json!({ "session_id": session_id, "student_id": student_id })),
        ),
        CoreError::AttendanceAlreadyMarked { marked_students } => (
            StatusCode::CONFLICT,
            "ATTENDANCE_ALREADY_MARKED",
            err.to_string(),
            Some(json!({ "marked_students": marked_students })),
        ),
        CoreError::ConcurrencyConflict(msg) => (
            StatusCode::CONFLICT,
            "CONCURRENCY_CONFLICT",
            format!("The session was changed by another request: {msg}"),
            None,
        ),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            )
        }
    }
}
