//! Repository for the `lesson_entries` table.

use classdesk_core::lesson::LessonEntry;
use classdesk_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::lesson::LessonRow;

/// Column list for `lesson_entries` queries.
const COLUMNS: &str = "session_id, position, title, description, status, remarks";

/// Provides reads and wholesale replacement of a session's lessons.
pub struct LessonRepo;

impl LessonRepo {
    /// List one session's lessons in recorded order.
    pub async fn list_for_session(
        pool: &PgPool,
        session_id: DbId,
    ) -> Result<Vec<LessonRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM lesson_entries WHERE session_id = $1 ORDER BY position"
        );
        sqlx::query_as::<_, LessonRow>(&query)
            .bind(session_id)
            .fetch_all(pool)
            .await
    }

    /// Whether at least one lesson of the session has a non-blank title
    /// and description.
    pub async fn has_complete_lesson(
        conn: &mut PgConnection,
        session_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM lesson_entries \
             WHERE session_id = $1 AND btrim(title) <> '' AND btrim(description) <> '')",
        )
        .bind(session_id)
        .fetch_one(conn)
        .await
    }

    /// Replace every lesson of a session. The caller owns the transaction
    /// and must hold the session row lock.
    pub async fn replace(
        conn: &mut PgConnection,
        session_id: DbId,
        lessons: &[LessonEntry],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM lesson_entries WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *conn)
            .await?;

        for lesson in lessons {
            sqlx::query(
                "INSERT INTO lesson_entries \
                    (session_id, position, title, description, status, remarks) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(session_id)
            .bind(lesson.position)
            .bind(&lesson.title)
            .bind(&lesson.description)
            .bind(lesson.status.as_str())
            .bind(&lesson.remarks)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}
