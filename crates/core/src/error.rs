use crate::session::SessionStatus;
use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The requested lifecycle operation is not legal from the current status.
    #[error("Cannot apply {operation} to a session that is '{from}'")]
    InvalidTransition {
        operation: &'static str,
        from: SessionStatus,
    },

    /// `end_class` was blocked because some participants have no attendance.
    #[error("Attendance is not marked for students {missing_students:?}")]
    AttendanceIncomplete { missing_students: Vec<DbId> },

    /// `end_class` was blocked because no lesson has a title and description.
    #[error("Lesson record is incomplete: {reason}")]
    LessonIncomplete { reason: String },

    /// A single attendance entry was already marked and is immutable.
    #[error("Attendance for student {student_id} in session {session_id} is already marked")]
    AlreadyMarked { session_id: DbId, student_id: DbId },

    /// A bulk leave was refused because some entries were already marked.
    #[error("Attendance is already marked for students {marked_students:?}")]
    AttendanceAlreadyMarked { marked_students: Vec<DbId> },

    /// A competing write changed the record between read and write.
    #[error("Concurrent update: {0}")]
    ConcurrencyConflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias for results carrying a [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;
