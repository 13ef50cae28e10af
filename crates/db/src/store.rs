//! [`SessionStore`] backed by PostgreSQL.
//!
//! Guarded commits run inside one transaction: every `UPDATE` carries its
//! expected-state predicate and the transaction is dropped (rolled back) as
//! soon as one of them affects no row.
//!
//! Lesson replacement locks the session row, and the `completed` commit
//! re-reads the lessons after its `UPDATE` has taken the same lock, so the
//! two serialise across processes.

use async_trait::async_trait;
use classdesk_core::attendance::AttendanceEntry;
use classdesk_core::error::{CoreError, CoreResult};
use classdesk_core::lesson::LessonEntry;
use classdesk_core::session::{NewSession, Session, SessionFilter, SessionStatus};
use classdesk_core::store::SessionStore;
use classdesk_core::types::DbId;

use crate::repositories::{AttendanceRepo, LessonRepo, SessionRepo};
use crate::DbPool;

/// PostgreSQL implementation of the session store port.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: DbPool,
}

impl PgSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn require_session(&self, session_id: DbId) -> CoreResult<()> {
        if SessionRepo::exists(&self.pool, session_id)
            .await
            .map_err(map_sqlx_error)?
        {
            Ok(())
        } else {
            Err(session_not_found(session_id))
        }
    }
}

/// Refuse lesson writes once the stored status is terminal.
fn ensure_lessons_editable(session_id: DbId, stored: &str) -> CoreResult<()> {
    let status = SessionStatus::from_str_value(stored)?;
    if status.is_terminal() {
        return Err(CoreError::ConcurrencyConflict(format!(
            "session {session_id} is already '{status}'"
        )));
    }
    Ok(())
}

fn session_not_found(id: DbId) -> CoreError {
    CoreError::NotFound {
        entity: "Session",
        id,
    }
}

/// Map a sqlx error onto the domain taxonomy.
///
/// - `RowNotFound` maps to `NotFound`.
/// - Unique violations on `uq_` constraints map to `Conflict`.
/// - Everything else is logged and reported as `Internal`.
pub fn map_sqlx_error(err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::RowNotFound => CoreError::NotFound {
            entity: "Row",
            id: 0,
        },
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            let constraint = db_err.constraint().unwrap_or("unknown");
            if constraint.starts_with("uq_") {
                CoreError::Conflict(format!(
                    "Duplicate value violates unique constraint: {constraint}"
                ))
            } else {
                tracing::error!(error = %db_err, "Database error");
                CoreError::Internal(err.to_string())
            }
        }
        other => {
            tracing::error!(error = %other, "Database error");
            CoreError::Internal(other.to_string())
        }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(&self, input: &NewSession) -> CoreResult<Session> {
        input.validate()?;
        SessionRepo::create(&self.pool, input)
            .await
            .map_err(map_sqlx_error)?
            .into_domain()
    }

    async fn load_session(&self, session_id: DbId) -> CoreResult<Session> {
        SessionRepo::find_by_id(&self.pool, session_id)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| session_not_found(session_id))?
            .into_domain()
    }

    async fn load_attendance(&self, session_id: DbId) -> CoreResult<Vec<AttendanceEntry>> {
        self.require_session(session_id).await?;
        AttendanceRepo::list_for_session(&self.pool, session_id)
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(|row| row.into_domain())
            .collect()
    }

    async fn load_lessons(&self, session_id: DbId) -> CoreResult<Vec<LessonEntry>> {
        self.require_session(session_id).await?;
        LessonRepo::list_for_session(&self.pool, session_id)
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(|row| row.into_domain())
            .collect()
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> CoreResult<Vec<Session>> {
        SessionRepo::list_filtered(&self.pool, filter)
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(|row| row.into_domain())
            .collect()
    }

    async fn list_attendance(&self, session_ids: &[DbId]) -> CoreResult<Vec<AttendanceEntry>> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }
        AttendanceRepo::list_for_sessions(&self.pool, session_ids)
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(|row| row.into_domain())
            .collect()
    }

    async fn commit_transition(
        &self,
        expected: SessionStatus,
        session: &Session,
        attendance: &[AttendanceEntry],
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let updated = SessionRepo::update_if_status(&mut *tx, expected.as_str(), session)
            .await
            .map_err(map_sqlx_error)?;
        if !updated {
            return Err(CoreError::ConcurrencyConflict(format!(
                "session {} is no longer '{}'",
                session.id, expected
            )));
        }

        if session.status == SessionStatus::Completed {
            let complete = LessonRepo::has_complete_lesson(&mut *tx, session.id)
                .await
                .map_err(map_sqlx_error)?;
            if !complete {
                return Err(CoreError::LessonIncomplete {
                    reason: "no lesson has both a title and a description".to_string(),
                });
            }
        }

        for entry in attendance {
            let marked = AttendanceRepo::mark_if_unmarked(&mut *tx, entry)
                .await
                .map_err(map_sqlx_error)?;
            if !marked {
                return Err(CoreError::ConcurrencyConflict(format!(
                    "attendance for student {} in session {} was marked concurrently",
                    entry.student_id, entry.session_id
                )));
            }
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn commit_mark(&self, entry: &AttendanceEntry) -> CoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        let marked = AttendanceRepo::mark_if_unmarked(&mut *conn, entry)
            .await
            .map_err(map_sqlx_error)?;
        if marked {
            Ok(())
        } else {
            Err(CoreError::ConcurrencyConflict(format!(
                "attendance for student {} in session {} was marked concurrently",
                entry.student_id, entry.session_id
            )))
        }
    }

    async fn replace_lessons(&self, session_id: DbId, lessons: &[LessonEntry]) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let stored = SessionRepo::lock_status(&mut *tx, session_id)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| session_not_found(session_id))?;
        ensure_lessons_editable(session_id, &stored)?;

        LessonRepo::replace(&mut *tx, session_id, lessons)
            .await
            .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)
    }
}
