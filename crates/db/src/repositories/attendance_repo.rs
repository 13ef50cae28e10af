//! Repository for the `attendance_entries` table.

use classdesk_core::attendance::AttendanceEntry;
use classdesk_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::attendance::AttendanceRow;

/// Column list for `attendance_entries` queries.
const COLUMNS: &str = "session_id, student_id, status, remarks, marked_at";

/// Provides reads and guarded marking for attendance rows.
pub struct AttendanceRepo;

impl AttendanceRepo {
    /// List one session's entries in roster order.
    pub async fn list_for_session(
        pool: &PgPool,
        session_id: DbId,
    ) -> Result<Vec<AttendanceRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM attendance_entries WHERE session_id = $1 ORDER BY position"
        );
        sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(session_id)
            .fetch_all(pool)
            .await
    }

    /// List the entries of many sessions at once.
    pub async fn list_for_sessions(
        pool: &PgPool,
        session_ids: &[DbId],
    ) -> Result<Vec<AttendanceRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM attendance_entries \
             WHERE session_id = ANY($1) ORDER BY session_id, position"
        );
        sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(session_ids)
            .fetch_all(pool)
            .await
    }

    /// Record a mark only while the stored row is still `not_marked`.
    /// Returns `false` when the row was already marked or does not exist.
    pub async fn mark_if_unmarked(
        conn: &mut PgConnection,
        entry: &AttendanceEntry,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE attendance_entries SET status = $3, remarks = $4, marked_at = $5 \
             WHERE session_id = $1 AND student_id = $2 AND status = 'not_marked'",
        )
        .bind(entry.session_id)
        .bind(entry.student_id)
        .bind(entry.status.as_str())
        .bind(&entry.remarks)
        .bind(entry.marked_at)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
