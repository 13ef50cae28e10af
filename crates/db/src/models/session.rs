//! Class session row model.

use classdesk_core::error::CoreError;
use classdesk_core::session::{Session, SessionStatus, TimeSlot};
use classdesk_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `class_sessions` table.
#[derive(Debug, Clone, FromRow)]
pub struct ClassSessionRow {
    pub id: DbId,
    pub subject_id: DbId,
    pub teacher_id: DbId,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub class_date: String,
    pub status: String,
    pub participants: Vec<DbId>,
    pub teacher_available_at: Option<Timestamp>,
    pub class_started_at: Option<Timestamp>,
    pub class_ended_at: Option<Timestamp>,
}

impl ClassSessionRow {
    /// Convert into the domain snapshot. An unknown status string means the
    /// row was written outside the engine and is reported as internal.
    pub fn into_domain(self) -> Result<Session, CoreError> {
        let status = SessionStatus::from_str_value(&self.status).map_err(|_| {
            CoreError::Internal(format!(
                "class_sessions row {} has unknown status '{}'",
                self.id, self.status
            ))
        })?;
        Ok(Session {
            id: self.id,
            subject_id: self.subject_id,
            teacher_id: self.teacher_id,
            slot: TimeSlot {
                day: self.day,
                start_time: self.start_time,
                end_time: self.end_time,
                class_date: self.class_date,
            },
            status,
            participants: self.participants,
            teacher_available_at: self.teacher_available_at,
            class_started_at: self.class_started_at,
            class_ended_at: self.class_ended_at,
        })
    }
}
