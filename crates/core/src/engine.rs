//! Lifecycle engine: the single writer of session state.
//!
//! Every mutating operation runs read → validate → write inside the
//! session's mutex, then commits through the store's compare-and-write so a
//! writer in another process cannot slip in between. Attendance marks take
//! the same per-session lock as transitions, which serializes `mark` against
//! the whole-roster `mark_leave` batch.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::FixedOffset;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::attendance::{AttendanceEntry, AttendanceLedger, AttendanceStatus};
use crate::dates;
use crate::error::{CoreError, CoreResult};
use crate::lesson::{LessonDraft, LessonEntry, LessonRecords};
use crate::lifecycle::{self, ClosureReadiness, LifecycleOperation};
use crate::session::{NewSession, Session, SessionFilter, SessionStatus};
use crate::stats::{self, SessionStats};
use crate::store::SessionStore;
use crate::types::{system_clock, Clock, DbId};

/// Lock entries are pruned once the registry grows past this size.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Result of a successful lifecycle transition.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub operation: LifecycleOperation,
    pub previous: SessionStatus,
    pub session: Session,
    /// Attendance entries written by this transition (only `mark_leave`).
    pub attendance: Vec<AttendanceEntry>,
}

/// Everything known about one session, plus the operations legal next.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session: Session,
    pub attendance: Vec<AttendanceEntry>,
    pub lessons: Vec<LessonEntry>,
    pub allowed_operations: Vec<LifecycleOperation>,
}

// ---------------------------------------------------------------------------
// Lock registry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SessionLocks {
    locks: Mutex<HashMap<DbId, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: DbId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() > LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            Arc::clone(locks.entry(session_id).or_default())
        };
        lock.lock_owned().await
    }
}

// ---------------------------------------------------------------------------
// LifecycleEngine
// ---------------------------------------------------------------------------

pub struct LifecycleEngine {
    store: Arc<dyn SessionStore>,
    locks: SessionLocks,
    clock: Clock,
}

impl LifecycleEngine {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_clock(store, system_clock())
    }

    pub fn with_clock(store: Arc<dyn SessionStore>, clock: Clock) -> Self {
        Self {
            store,
            locks: SessionLocks::default(),
            clock,
        }
    }

    // --- Registration --------------------------------------------------------

    /// Register a pre-assigned session in `pending`.
    pub async fn create_session(&self, input: &NewSession) -> CoreResult<SessionSnapshot> {
        let session = self.store.create_session(input).await?;
        tracing::info!(
            session_id = session.id,
            teacher_id = session.teacher_id,
            participants = session.participants.len(),
            "Session registered",
        );
        self.snapshot(session.id).await
    }

    // --- Transitions ---------------------------------------------------------

    pub async fn mark_available(&self, session_id: DbId) -> CoreResult<TransitionOutcome> {
        let _guard = self.locks.acquire(session_id).await;
        let session = self.store.load_session(session_id).await?;
        let next = self.checked(
            LifecycleOperation::MarkAvailable,
            &session,
            lifecycle::mark_available(&session, (self.clock)()),
        )?;
        self.commit(LifecycleOperation::MarkAvailable, session, next, Vec::new())
            .await
    }

    pub async fn start_class(&self, session_id: DbId) -> CoreResult<TransitionOutcome> {
        let _guard = self.locks.acquire(session_id).await;
        let session = self.store.load_session(session_id).await?;
        let next = self.checked(
            LifecycleOperation::StartClass,
            &session,
            lifecycle::start_class(&session, (self.clock)()),
        )?;
        self.commit(LifecycleOperation::StartClass, session, next, Vec::new())
            .await
    }

    /// Close a running class once attendance and lessons are complete.
    pub async fn end_class(&self, session_id: DbId) -> CoreResult<TransitionOutcome> {
        let _guard = self.locks.acquire(session_id).await;
        let session = self.store.load_session(session_id).await?;
        let attendance = AttendanceLedger::new(self.store.load_attendance(session_id).await?);
        let lessons = LessonRecords::new(self.store.load_lessons(session_id).await?);
        let next = self.checked(
            LifecycleOperation::EndClass,
            &session,
            lifecycle::end_class(&session, &attendance, &lessons, (self.clock)()),
        )?;
        self.commit(LifecycleOperation::EndClass, session, next, Vec::new())
            .await
    }

    /// Put the whole roster on leave. Applies to every participant or none.
    pub async fn mark_leave(&self, session_id: DbId) -> CoreResult<TransitionOutcome> {
        let _guard = self.locks.acquire(session_id).await;
        let session = self.store.load_session(session_id).await?;
        let attendance = AttendanceLedger::new(self.store.load_attendance(session_id).await?);
        let (next, entries) = self.checked(
            LifecycleOperation::MarkLeave,
            &session,
            lifecycle::mark_leave(&session, &attendance, (self.clock)()),
        )?;
        self.commit(LifecycleOperation::MarkLeave, session, next, entries)
            .await
    }

    pub async fn mark_absent(&self, session_id: DbId) -> CoreResult<TransitionOutcome> {
        let _guard = self.locks.acquire(session_id).await;
        let session = self.store.load_session(session_id).await?;
        let next = self.checked(
            LifecycleOperation::MarkAbsent,
            &session,
            lifecycle::mark_absent(&session),
        )?;
        self.commit(LifecycleOperation::MarkAbsent, session, next, Vec::new())
            .await
    }

    // --- Attendance and lessons ---------------------------------------------

    /// Mark one participant's attendance. An entry can be marked only once.
    pub async fn mark_attendance(
        &self,
        session_id: DbId,
        student_id: DbId,
        status: AttendanceStatus,
        remarks: &str,
    ) -> CoreResult<AttendanceEntry> {
        let _guard = self.locks.acquire(session_id).await;
        let session = self.store.load_session(session_id).await?;
        if !session.has_participant(student_id) {
            return Err(CoreError::NotFound {
                entity: "Participant",
                id: student_id,
            });
        }
        if session.status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                operation: "mark_attendance",
                from: session.status,
            });
        }

        let ledger = AttendanceLedger::new(self.store.load_attendance(session_id).await?);
        let entry = ledger
            .mark(session_id, student_id, status, remarks, (self.clock)())
            .inspect_err(|e| {
                tracing::debug!(session_id, student_id, error = %e, "Attendance mark rejected");
            })?;
        self.store.commit_mark(&entry).await?;

        tracing::info!(
            session_id,
            student_id,
            status = %entry.status,
            "Attendance marked",
        );
        Ok(entry)
    }

    /// Replace the session's lesson list. Drafts may be incomplete.
    pub async fn upsert_lessons(
        &self,
        session_id: DbId,
        drafts: &[LessonDraft],
    ) -> CoreResult<Vec<LessonEntry>> {
        let _guard = self.locks.acquire(session_id).await;
        let session = self.store.load_session(session_id).await?;
        if session.status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                operation: "upsert_lessons",
                from: session.status,
            });
        }

        let lessons = LessonRecords::upsert(session_id, drafts)?;
        self.store.replace_lessons(session_id, &lessons).await?;

        tracing::info!(session_id, lessons = lessons.len(), "Lessons updated");
        Ok(lessons)
    }

    // --- Reads ---------------------------------------------------------------

    pub async fn snapshot(&self, session_id: DbId) -> CoreResult<SessionSnapshot> {
        let session = self.store.load_session(session_id).await?;
        let attendance = self.store.load_attendance(session_id).await?;
        let lessons = self.store.load_lessons(session_id).await?;
        Ok(SessionSnapshot {
            allowed_operations: lifecycle::allowed_operations(session.status),
            session,
            attendance,
            lessons,
        })
    }

    pub async fn is_attendance_complete(&self, session_id: DbId) -> CoreResult<bool> {
        let session = self.store.load_session(session_id).await?;
        let ledger = AttendanceLedger::new(self.store.load_attendance(session_id).await?);
        Ok(ledger.is_complete(session_id, &session.participants))
    }

    pub async fn is_lesson_complete(&self, session_id: DbId) -> CoreResult<bool> {
        let lessons = LessonRecords::new(self.store.load_lessons(session_id).await?);
        Ok(lessons.is_complete(session_id))
    }

    /// What still blocks `end_class` for this session.
    pub async fn readiness(&self, session_id: DbId) -> CoreResult<ClosureReadiness> {
        let session = self.store.load_session(session_id).await?;
        let attendance = AttendanceLedger::new(self.store.load_attendance(session_id).await?);
        let lessons = LessonRecords::new(self.store.load_lessons(session_id).await?);
        Ok(lifecycle::evaluate_readiness(&session, &attendance, &lessons))
    }

    /// Dashboard statistics for the sessions matching `filter`.
    pub async fn stats(
        &self,
        filter: &SessionFilter,
        reference: &FixedOffset,
    ) -> CoreResult<SessionStats> {
        let sessions = self.store.list_sessions(filter).await?;
        let ids: Vec<DbId> = sessions.iter().map(|s| s.id).collect();
        let attendance = self.store.list_attendance(&ids).await?;
        let today = dates::today_in(reference, (self.clock)());
        Ok(stats::aggregate(&sessions, &attendance, today, reference))
    }

    // --- Helpers -------------------------------------------------------------

    fn checked<T>(
        &self,
        op: LifecycleOperation,
        session: &Session,
        result: CoreResult<T>,
    ) -> CoreResult<T> {
        result.inspect_err(|e| {
            tracing::debug!(
                session_id = session.id,
                operation = op.as_str(),
                status = %session.status,
                error = %e,
                "Lifecycle operation rejected",
            );
        })
    }

    async fn commit(
        &self,
        operation: LifecycleOperation,
        previous: Session,
        next: Session,
        attendance: Vec<AttendanceEntry>,
    ) -> CoreResult<TransitionOutcome> {
        self.store
            .commit_transition(previous.status, &next, &attendance)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    session_id = next.id,
                    operation = operation.as_str(),
                    error = %e,
                    "Lifecycle commit failed",
                );
            })?;

        tracing::info!(
            session_id = next.id,
            operation = operation.as_str(),
            from = %previous.status,
            to = %next.status,
            "Session transitioned",
        );

        Ok(TransitionOutcome {
            operation,
            previous: previous.status,
            session: next,
            attendance,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TimeSlot;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    fn ticking_clock() -> Clock {
        let start = Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap();
        let ticks = Arc::new(AtomicI64::new(0));
        Arc::new(move || start + Duration::minutes(ticks.fetch_add(1, Ordering::SeqCst)))
    }

    fn engine() -> LifecycleEngine {
        LifecycleEngine::with_clock(Arc::new(MemoryStore::new()), ticking_clock())
    }

    fn new_session(participants: Vec<DbId>) -> NewSession {
        NewSession {
            subject_id: 7,
            teacher_id: 3,
            slot: TimeSlot {
                day: "Monday".into(),
                start_time: "10:00".into(),
                end_time: "11:00".into(),
                class_date: "2024-05-06".into(),
            },
            participants,
        }
    }

    fn complete_lesson() -> Vec<LessonDraft> {
        vec![LessonDraft {
            title: "Photosynthesis".into(),
            description: "Light and dark reactions".into(),
            ..Default::default()
        }]
    }

    async fn registered(engine: &LifecycleEngine, participants: Vec<DbId>) -> DbId {
        engine
            .create_session(&new_session(participants))
            .await
            .unwrap()
            .session
            .id
    }

    #[tokio::test]
    async fn mark_available_twice_is_rejected() {
        let engine = engine();
        let id = registered(&engine, vec![10]).await;

        let outcome = engine.mark_available(id).await.unwrap();
        assert_eq!(outcome.previous, SessionStatus::Pending);
        assert_eq!(outcome.session.status, SessionStatus::Available);
        assert!(outcome.session.teacher_available_at.is_some());

        assert_matches!(
            engine.mark_available(id).await,
            Err(CoreError::InvalidTransition { .. })
        );
    }

    #[tokio::test]
    async fn end_before_attendance_is_incomplete() {
        let engine = engine();
        let id = registered(&engine, vec![10]).await;
        engine.mark_available(id).await.unwrap();
        assert_eq!(
            engine.start_class(id).await.unwrap().session.status,
            SessionStatus::InProgress
        );

        assert_matches!(
            engine.end_class(id).await,
            Err(CoreError::AttendanceIncomplete { missing_students }) if missing_students == vec![10]
        );
    }

    #[tokio::test]
    async fn end_without_lesson_is_incomplete() {
        let engine = engine();
        let id = registered(&engine, vec![10]).await;
        engine.mark_available(id).await.unwrap();
        engine.start_class(id).await.unwrap();
        engine
            .mark_attendance(id, 10, AttendanceStatus::Present, "")
            .await
            .unwrap();

        assert_matches!(
            engine.end_class(id).await,
            Err(CoreError::LessonIncomplete { .. })
        );
        assert_eq!(
            engine.snapshot(id).await.unwrap().session.status,
            SessionStatus::InProgress
        );
    }

    #[tokio::test]
    async fn full_flow_completes_with_ordered_stamps() {
        let engine = engine();
        let id = registered(&engine, vec![10]).await;
        engine.mark_available(id).await.unwrap();
        engine.start_class(id).await.unwrap();
        engine
            .mark_attendance(id, 10, AttendanceStatus::Present, "")
            .await
            .unwrap();
        assert!(!engine.is_lesson_complete(id).await.unwrap());
        engine.upsert_lessons(id, &complete_lesson()).await.unwrap();
        assert!(engine.is_lesson_complete(id).await.unwrap());
        assert!(engine.readiness(id).await.unwrap().can_end);

        let done = engine.end_class(id).await.unwrap().session;
        assert_eq!(done.status, SessionStatus::Completed);
        assert!(done.class_ended_at.is_some());
        assert!(done.teacher_available_at <= done.class_started_at);
        assert!(done.class_started_at <= done.class_ended_at);

        let snapshot = engine.snapshot(id).await.unwrap();
        assert!(snapshot.allowed_operations.is_empty());
    }

    #[tokio::test]
    async fn leave_marks_everyone_then_reports_already_marked() {
        let engine = engine();
        let id = registered(&engine, vec![10, 11]).await;

        let outcome = engine.mark_leave(id).await.unwrap();
        assert_eq!(outcome.session.status, SessionStatus::Leave);
        assert_eq!(outcome.attendance.len(), 2);

        let stored = engine.snapshot(id).await.unwrap().attendance;
        assert!(stored
            .iter()
            .all(|e| e.status == AttendanceStatus::Leave && e.marked_at.is_some()));

        assert_matches!(
            engine.mark_leave(id).await,
            Err(CoreError::AttendanceAlreadyMarked { marked_students }) if marked_students == vec![10, 11]
        );
    }

    #[tokio::test]
    async fn leave_with_partial_roster_changes_nothing() {
        let engine = engine();
        let id = registered(&engine, vec![10, 11]).await;
        engine
            .mark_attendance(id, 10, AttendanceStatus::Present, "")
            .await
            .unwrap();

        assert_matches!(
            engine.mark_leave(id).await,
            Err(CoreError::AttendanceAlreadyMarked { .. })
        );
        let snapshot = engine.snapshot(id).await.unwrap();
        assert_eq!(snapshot.session.status, SessionStatus::Pending);
        assert_eq!(snapshot.attendance[1].status, AttendanceStatus::NotMarked);
    }

    #[tokio::test]
    async fn mark_attendance_guards() {
        let engine = engine();
        let id = registered(&engine, vec![10]).await;

        assert_matches!(
            engine
                .mark_attendance(id, 99, AttendanceStatus::Present, "")
                .await,
            Err(CoreError::NotFound { entity: "Participant", id: 99 })
        );

        engine
            .mark_attendance(id, 10, AttendanceStatus::Absent, "sick")
            .await
            .unwrap();
        assert_matches!(
            engine
                .mark_attendance(id, 10, AttendanceStatus::Present, "")
                .await,
            Err(CoreError::AlreadyMarked { student_id: 10, .. })
        );
        assert!(engine.is_attendance_complete(id).await.unwrap());
    }

    #[tokio::test]
    async fn closed_sessions_reject_lessons_and_marks() {
        let engine = engine();
        let id = registered(&engine, vec![10]).await;
        engine.mark_absent(id).await.unwrap();

        assert_matches!(
            engine.upsert_lessons(id, &complete_lesson()).await,
            Err(CoreError::InvalidTransition { operation: "upsert_lessons", .. })
        );
        assert_matches!(
            engine
                .mark_attendance(id, 10, AttendanceStatus::Present, "")
                .await,
            Err(CoreError::InvalidTransition { operation: "mark_attendance", .. })
        );
    }

    #[tokio::test]
    async fn concurrent_mark_available_has_one_winner() {
        let engine = Arc::new(engine());
        let id = registered(&engine, vec![10]).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.mark_available(id).await })
            })
            .collect();

        let mut successes = 0;
        let mut rejections = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(CoreError::InvalidTransition { .. }) => rejections += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(rejections, 7);
    }

    #[tokio::test]
    async fn concurrent_mark_and_leave_never_mix() {
        let engine = Arc::new(engine());
        let id = registered(&engine, vec![10, 11]).await;

        let leave = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.mark_leave(id).await })
        };
        let mark = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .mark_attendance(id, 10, AttendanceStatus::Present, "")
                    .await
            })
        };
        let (leave, mark) = (leave.await.unwrap(), mark.await.unwrap());

        let attendance = engine.snapshot(id).await.unwrap().attendance;
        match (leave, mark) {
            (Ok(_), Err(_)) => {
                assert!(attendance.iter().all(|e| e.status == AttendanceStatus::Leave));
            }
            (Err(CoreError::AttendanceAlreadyMarked { .. }), Ok(_)) => {
                assert_eq!(attendance[0].status, AttendanceStatus::Present);
                assert_eq!(attendance[1].status, AttendanceStatus::NotMarked);
            }
            other => panic!("unexpected interleaving: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stats_cover_filtered_sessions() {
        let engine = engine();
        let a = registered(&engine, vec![10]).await;
        let b = registered(&engine, vec![11]).await;
        let c = registered(&engine, vec![12]).await;

        for (id, student, status) in [
            (a, 10, AttendanceStatus::Present),
            (b, 11, AttendanceStatus::Present),
        ] {
            engine.mark_available(id).await.unwrap();
            engine.start_class(id).await.unwrap();
            engine.mark_attendance(id, student, status, "").await.unwrap();
            engine.upsert_lessons(id, &complete_lesson()).await.unwrap();
            engine.end_class(id).await.unwrap();
        }
        engine
            .mark_attendance(c, 12, AttendanceStatus::Absent, "")
            .await
            .unwrap();

        let stats = engine
            .stats(&SessionFilter::default(), &dates::default_reference_offset())
            .await
            .unwrap();
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.sessions_by_status.completed, 2);
        assert_eq!(stats.sessions_by_status.pending, 1);
        assert_eq!(stats.attendance_percentage, Some(66.7));
        assert_eq!(stats.todays_sessions, 3);

        // A fourth session nobody has marked yet dilutes the percentage.
        registered(&engine, vec![13]).await;
        let stats = engine
            .stats(&SessionFilter::default(), &dates::default_reference_offset())
            .await
            .unwrap();
        assert_eq!(stats.sessions_by_status.pending, 2);
        assert_eq!(stats.attendance.not_marked, 1);
        assert_eq!(stats.attendance_percentage, Some(50.0));
    }
}
