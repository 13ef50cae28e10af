//! Repository for the `class_sessions` table.

use classdesk_core::session::{NewSession, Session, SessionFilter};
use classdesk_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::session::ClassSessionRow;

/// Column list for `class_sessions` queries.
const COLUMNS: &str = "id, subject_id, teacher_id, day, start_time, end_time, class_date, \
    status, participants, teacher_available_at, class_started_at, class_ended_at";

/// Provides CRUD and guarded status updates for class sessions.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a session in `pending` together with one `not_marked`
    /// attendance row per participant, in roster order.
    pub async fn create(pool: &PgPool, input: &NewSession) -> Result<ClassSessionRow, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO class_sessions \
                (subject_id, teacher_id, day, start_time, end_time, class_date, participants) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, ClassSessionRow>(&query)
            .bind(input.subject_id)
            .bind(input.teacher_id)
            .bind(&input.slot.day)
            .bind(&input.slot.start_time)
            .bind(&input.slot.end_time)
            .bind(&input.slot.class_date)
            .bind(&input.participants)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO attendance_entries (session_id, student_id, position) \
             SELECT $1, roster.student_id, roster.ord::int \
             FROM UNNEST($2::bigint[]) WITH ORDINALITY AS roster(student_id, ord)",
        )
        .bind(row.id)
        .bind(&input.participants)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    /// Find a session by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ClassSessionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM class_sessions WHERE id = $1");
        sqlx::query_as::<_, ClassSessionRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List sessions matching every populated filter field, oldest first.
    pub async fn list_filtered(
        pool: &PgPool,
        filter: &SessionFilter,
    ) -> Result<Vec<ClassSessionRow>, sqlx::Error> {
        let mut conditions = Vec::new();
        let mut bind_idx = 1u32;

        if filter.teacher_id.is_some() {
            conditions.push(format!("teacher_id = ${bind_idx}"));
            bind_idx += 1;
        }
        if filter.student_id.is_some() {
            conditions.push(format!("${bind_idx} = ANY(participants)"));
            bind_idx += 1;
        }
        if filter.status.is_some() {
            conditions.push(format!("status = ${bind_idx}"));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let query = format!("SELECT {COLUMNS} FROM class_sessions {where_clause} ORDER BY id");

        let mut q = sqlx::query_as::<_, ClassSessionRow>(&query);
        if let Some(teacher_id) = filter.teacher_id {
            q = q.bind(teacher_id);
        }
        if let Some(student_id) = filter.student_id {
            q = q.bind(student_id);
        }
        if let Some(status) = filter.status {
            q = q.bind(status.as_str());
        }
        q.fetch_all(pool).await
    }

    /// Write the status and lifecycle timestamps of `session` only if the
    /// stored status still equals `expected`. Returns `false` when the guard
    /// did not match (or the row is gone).
    pub async fn update_if_status(
        conn: &mut PgConnection,
        expected: &str,
        session: &Session,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE class_sessions SET \
                status = $3, \
                teacher_available_at = $4, \
                class_started_at = $5, \
                class_ended_at = $6, \
                updated_at = now() \
             WHERE id = $1 AND status = $2",
        )
        .bind(session.id)
        .bind(expected)
        .bind(session.status.as_str())
        .bind(session.teacher_available_at)
        .bind(session.class_started_at)
        .bind(session.class_ended_at)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Lock a session row for the rest of the transaction and return its
    /// stored status, or `None` when the row does not exist.
    pub async fn lock_status(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT status FROM class_sessions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Return whether a session row exists.
    pub async fn exists(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM class_sessions WHERE id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await
    }
}
