//! Persistence port for session state.
//!
//! The engine reads snapshots through [`SessionStore`] and writes them back
//! with compare-and-write commits. An implementation must apply each commit
//! atomically: either every row in it is written or none is, and a commit
//! whose guard no longer holds fails with [`CoreError::ConcurrencyConflict`].
//!
//! [`CoreError::ConcurrencyConflict`]: crate::error::CoreError::ConcurrencyConflict

use async_trait::async_trait;

use crate::attendance::AttendanceEntry;
use crate::error::CoreResult;
use crate::lesson::LessonEntry;
use crate::session::{NewSession, Session, SessionFilter, SessionStatus};
use crate::types::DbId;

pub mod memory;

pub use memory::MemoryStore;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a `pending` session plus one `not_marked` entry per participant.
    async fn create_session(&self, input: &NewSession) -> CoreResult<Session>;

    /// `NotFound` when the session does not exist.
    async fn load_session(&self, session_id: DbId) -> CoreResult<Session>;

    /// Attendance entries of one session, in roster order.
    async fn load_attendance(&self, session_id: DbId) -> CoreResult<Vec<AttendanceEntry>>;

    /// Lesson entries of one session, in position order.
    async fn load_lessons(&self, session_id: DbId) -> CoreResult<Vec<LessonEntry>>;

    async fn list_sessions(&self, filter: &SessionFilter) -> CoreResult<Vec<Session>>;

    /// Attendance entries of many sessions, for statistics.
    async fn list_attendance(&self, session_ids: &[DbId]) -> CoreResult<Vec<AttendanceEntry>>;

    /// Write `session` only if the stored status is still `expected`, and
    /// write every entry in `attendance` only if its stored counterpart is
    /// still `not_marked`. All or nothing.
    async fn commit_transition(
        &self,
        expected: SessionStatus,
        session: &Session,
        attendance: &[AttendanceEntry],
    ) -> CoreResult<()>;

    /// Write one marked entry only if the stored entry is still `not_marked`.
    async fn commit_mark(&self, entry: &AttendanceEntry) -> CoreResult<()>;

    /// Replace a session's lesson list wholesale.
    async fn replace_lessons(&self, session_id: DbId, lessons: &[LessonEntry]) -> CoreResult<()>;
}
