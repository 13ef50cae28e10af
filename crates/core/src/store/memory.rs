//! In-process [`SessionStore`] used by tests and database-less deployments.
//!
//! All tables live behind one `RwLock`, so a commit is applied in a single
//! write-guard scope and readers see either the state before it or after it.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::SessionStore;
use crate::attendance::AttendanceEntry;
use crate::error::{CoreError, CoreResult};
use crate::lesson::{LessonEntry, LessonRecords};
use crate::session::{NewSession, Session, SessionFilter, SessionStatus};
use crate::types::DbId;

#[derive(Default)]
struct Tables {
    last_id: DbId,
    sessions: BTreeMap<DbId, Session>,
    attendance: HashMap<DbId, Vec<AttendanceEntry>>,
    lessons: HashMap<DbId, Vec<LessonEntry>>,
}

impl Tables {
    fn session(&self, session_id: DbId) -> CoreResult<&Session> {
        self.sessions.get(&session_id).ok_or(CoreError::NotFound {
            entity: "Session",
            id: session_id,
        })
    }

    fn stored_entry(&self, entry: &AttendanceEntry) -> CoreResult<&AttendanceEntry> {
        self.attendance
            .get(&entry.session_id)
            .and_then(|rows| rows.iter().find(|e| e.student_id == entry.student_id))
            .ok_or(CoreError::NotFound {
                entity: "AttendanceEntry",
                id: entry.student_id,
            })
    }

    fn check_unmarked(&self, entry: &AttendanceEntry) -> CoreResult<()> {
        if self.stored_entry(entry)?.is_marked() {
            return Err(CoreError::ConcurrencyConflict(format!(
                "attendance for student {} in session {} was marked concurrently",
                entry.student_id, entry.session_id
            )));
        }
        Ok(())
    }

    fn check_lessons(&self, session_id: DbId) -> CoreResult<()> {
        let stored = self.lessons.get(&session_id).cloned().unwrap_or_default();
        let lessons = LessonRecords::new(stored);
        match lessons.incompleteness(session_id) {
            Some(reason) => Err(CoreError::LessonIncomplete { reason }),
            None => Ok(()),
        }
    }

    fn put_entry(&mut self, entry: &AttendanceEntry) {
        if let Some(slot) = self
            .attendance
            .get_mut(&entry.session_id)
            .and_then(|rows| rows.iter_mut().find(|e| e.student_id == entry.student_id))
        {
            *slot = entry.clone();
        }
    }
}

/// Memory-backed store. Ids are assigned sequentially from 1.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, input: &NewSession) -> CoreResult<Session> {
        input.validate()?;
        let mut tables = self.tables.write().await;
        tables.last_id += 1;
        let id = tables.last_id;

        let session = Session {
            id,
            subject_id: input.subject_id,
            teacher_id: input.teacher_id,
            slot: input.slot.clone(),
            status: SessionStatus::Pending,
            participants: input.participants.clone(),
            teacher_available_at: None,
            class_started_at: None,
            class_ended_at: None,
        };
        let entries = input
            .participants
            .iter()
            .map(|student| AttendanceEntry::unmarked(id, *student))
            .collect();

        tables.sessions.insert(id, session.clone());
        tables.attendance.insert(id, entries);
        tables.lessons.insert(id, Vec::new());
        Ok(session)
    }

    async fn load_session(&self, session_id: DbId) -> CoreResult<Session> {
        self.tables.read().await.session(session_id).cloned()
    }

    async fn load_attendance(&self, session_id: DbId) -> CoreResult<Vec<AttendanceEntry>> {
        let tables = self.tables.read().await;
        tables.session(session_id)?;
        Ok(tables.attendance.get(&session_id).cloned().unwrap_or_default())
    }

    async fn load_lessons(&self, session_id: DbId) -> CoreResult<Vec<LessonEntry>> {
        let tables = self.tables.read().await;
        tables.session(session_id)?;
        Ok(tables.lessons.get(&session_id).cloned().unwrap_or_default())
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> CoreResult<Vec<Session>> {
        Ok(self
            .tables
            .read()
            .await
            .sessions
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    async fn list_attendance(&self, session_ids: &[DbId]) -> CoreResult<Vec<AttendanceEntry>> {
        let tables = self.tables.read().await;
        Ok(session_ids
            .iter()
            .filter_map(|id| tables.attendance.get(id))
            .flatten()
            .cloned()
            .collect())
    }

    async fn commit_transition(
        &self,
        expected: SessionStatus,
        session: &Session,
        attendance: &[AttendanceEntry],
    ) -> CoreResult<()> {
        let mut tables = self.tables.write().await;

        let stored = tables.session(session.id)?;
        if stored.status != expected {
            return Err(CoreError::ConcurrencyConflict(format!(
                "session {} is '{}', expected '{}'",
                session.id, stored.status, expected
            )));
        }
        for entry in attendance {
            tables.check_unmarked(entry)?;
        }
        if session.status == SessionStatus::Completed {
            tables.check_lessons(session.id)?;
        }

        tables.sessions.insert(session.id, session.clone());
        for entry in attendance {
            tables.put_entry(entry);
        }
        Ok(())
    }

    async fn commit_mark(&self, entry: &AttendanceEntry) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.check_unmarked(entry)?;
        tables.put_entry(entry);
        Ok(())
    }

    async fn replace_lessons(&self, session_id: DbId, lessons: &[LessonEntry]) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        let stored = tables.session(session_id)?;
        if stored.status.is_terminal() {
            return Err(CoreError::ConcurrencyConflict(format!(
                "session {} is already '{}'",
                session_id, stored.status
            )));
        }
        tables.lessons.insert(session_id, lessons.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::AttendanceStatus;
    use crate::session::TimeSlot;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn input(participants: Vec<DbId>) -> NewSession {
        NewSession {
            subject_id: 1,
            teacher_id: 2,
            slot: TimeSlot {
                day: "Tuesday".into(),
                start_time: "17:00".into(),
                end_time: "18:00".into(),
                class_date: "2024-05-07".into(),
            },
            participants,
        }
    }

    #[tokio::test]
    async fn create_seeds_unmarked_attendance() {
        let store = MemoryStore::new();
        let session = store.create_session(&input(vec![10, 11])).await.unwrap();
        assert_eq!(session.id, 1);
        assert_eq!(session.status, SessionStatus::Pending);

        let entries = store.load_attendance(session.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| !e.is_marked()));
        assert!(store.load_lessons(session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_invalid_roster() {
        let store = MemoryStore::new();
        assert_matches!(
            store.create_session(&input(vec![])).await,
            Err(CoreError::Validation(_))
        );
    }

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let store = MemoryStore::new();
        assert_matches!(
            store.load_session(42).await,
            Err(CoreError::NotFound { entity: "Session", id: 42 })
        );
        assert!(store.load_attendance(42).await.is_err());
    }

    #[tokio::test]
    async fn stale_status_guard_conflicts() {
        let store = MemoryStore::new();
        let session = store.create_session(&input(vec![10])).await.unwrap();
        let next = Session {
            status: SessionStatus::Available,
            ..session.clone()
        };

        assert_matches!(
            store
                .commit_transition(SessionStatus::Available, &next, &[])
                .await,
            Err(CoreError::ConcurrencyConflict(_))
        );
        store
            .commit_transition(SessionStatus::Pending, &next, &[])
            .await
            .unwrap();
        assert_eq!(
            store.load_session(session.id).await.unwrap().status,
            SessionStatus::Available
        );
    }

    #[tokio::test]
    async fn transition_batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        let session = store.create_session(&input(vec![10, 11])).await.unwrap();
        let now = Utc::now();

        let first = AttendanceEntry::unmarked(session.id, 10)
            .marked(AttendanceStatus::Present, "", now)
            .unwrap();
        store.commit_mark(&first).await.unwrap();

        let leave: Vec<_> = [10, 11]
            .iter()
            .map(|s| {
                AttendanceEntry::unmarked(session.id, *s)
                    .marked(AttendanceStatus::Leave, "", now)
                    .unwrap()
            })
            .collect();
        let next = Session {
            status: SessionStatus::Leave,
            ..session.clone()
        };
        assert_matches!(
            store
                .commit_transition(SessionStatus::Pending, &next, &leave)
                .await,
            Err(CoreError::ConcurrencyConflict(_))
        );

        assert_eq!(
            store.load_session(session.id).await.unwrap().status,
            SessionStatus::Pending
        );
        let entries = store.load_attendance(session.id).await.unwrap();
        assert_eq!(entries[0].status, AttendanceStatus::Present);
        assert_eq!(entries[1].status, AttendanceStatus::NotMarked);
    }

    #[tokio::test]
    async fn second_mark_conflicts() {
        let store = MemoryStore::new();
        let session = store.create_session(&input(vec![10])).await.unwrap();
        let entry = AttendanceEntry::unmarked(session.id, 10)
            .marked(AttendanceStatus::Absent, "", Utc::now())
            .unwrap();
        store.commit_mark(&entry).await.unwrap();
        assert_matches!(
            store.commit_mark(&entry).await,
            Err(CoreError::ConcurrencyConflict(_))
        );
    }

    #[tokio::test]
    async fn list_filters_and_bulk_attendance() {
        let store = MemoryStore::new();
        let a = store.create_session(&input(vec![10])).await.unwrap();
        let mut other = input(vec![11, 12]);
        other.teacher_id = 9;
        let b = store.create_session(&other).await.unwrap();

        let by_teacher = store
            .list_sessions(&SessionFilter {
                teacher_id: Some(9),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_teacher.len(), 1);
        assert_eq!(by_teacher[0].id, b.id);

        let entries = store.list_attendance(&[a.id, b.id]).await.unwrap();
        assert_eq!(entries.len(), 3);
    }

    fn lesson(session_id: DbId, title: &str, description: &str) -> LessonEntry {
        LessonEntry {
            session_id,
            position: 0,
            title: title.into(),
            description: description.into(),
            status: Default::default(),
            remarks: String::new(),
        }
    }

    async fn in_progress(store: &MemoryStore, participants: Vec<DbId>) -> Session {
        let session = store.create_session(&input(participants)).await.unwrap();
        let running = Session {
            status: SessionStatus::InProgress,
            ..session
        };
        store
            .commit_transition(SessionStatus::Pending, &running, &[])
            .await
            .unwrap();
        running
    }

    #[tokio::test]
    async fn completing_rechecks_lessons_under_the_write_guard() {
        let store = MemoryStore::new();
        let session = in_progress(&store, vec![10]).await;
        // Lessons were emptied after the caller validated them.
        store
            .replace_lessons(session.id, &[lesson(session.id, "Fractions", "  ")])
            .await
            .unwrap();

        let done = Session {
            status: SessionStatus::Completed,
            ..session.clone()
        };
        assert_matches!(
            store
                .commit_transition(SessionStatus::InProgress, &done, &[])
                .await,
            Err(CoreError::LessonIncomplete { .. })
        );
        assert_eq!(
            store.load_session(session.id).await.unwrap().status,
            SessionStatus::InProgress
        );

        store
            .replace_lessons(session.id, &[lesson(session.id, "Fractions", "Halves")])
            .await
            .unwrap();
        store
            .commit_transition(SessionStatus::InProgress, &done, &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lessons_of_terminal_sessions_are_frozen() {
        let store = MemoryStore::new();
        let session = in_progress(&store, vec![10]).await;
        let original = [lesson(session.id, "Fractions", "Halves")];
        store.replace_lessons(session.id, &original).await.unwrap();
        let done = Session {
            status: SessionStatus::Completed,
            ..session.clone()
        };
        store
            .commit_transition(SessionStatus::InProgress, &done, &[])
            .await
            .unwrap();

        assert_matches!(
            store.replace_lessons(session.id, &[]).await,
            Err(CoreError::ConcurrencyConflict(_))
        );
        assert_eq!(store.load_lessons(session.id).await.unwrap(), original);
    }

    #[tokio::test]
    async fn lessons_are_replaced_wholesale() {
        let store = MemoryStore::new();
        let session = store.create_session(&input(vec![10])).await.unwrap();
        let lesson = |title: &str| LessonEntry {
            session_id: session.id,
            position: 0,
            title: title.into(),
            description: "d".into(),
            status: Default::default(),
            remarks: String::new(),
        };

        store
            .replace_lessons(session.id, &[lesson("one"), lesson("two")])
            .await
            .unwrap();
        store
            .replace_lessons(session.id, &[lesson("three")])
            .await
            .unwrap();

        let lessons = store.load_lessons(session.id).await.unwrap();
        assert_eq!(lessons.len(), 1);
        assert_eq!(lessons[0].title, "three");
    }
}
