//! Attendance entry row model.

use classdesk_core::attendance::{AttendanceEntry, AttendanceStatus};
use classdesk_core::error::CoreError;
use classdesk_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `attendance_entries` table.
#[derive(Debug, Clone, FromRow)]
pub struct AttendanceRow {
    pub session_id: DbId,
    pub student_id: DbId,
    pub status: String,
    pub remarks: String,
    pub marked_at: Option<Timestamp>,
}

impl AttendanceRow {
    pub fn into_domain(self) -> Result<AttendanceEntry, CoreError> {
        let status = AttendanceStatus::from_str_value(&self.status).map_err(|_| {
            CoreError::Internal(format!(
                "attendance_entries row ({}, {}) has unknown status '{}'",
                self.session_id, self.student_id, self.status
            ))
        })?;
        Ok(AttendanceEntry {
            session_id: self.session_id,
            student_id: self.student_id,
            status,
            remarks: self.remarks,
            marked_at: self.marked_at,
        })
    }
}
