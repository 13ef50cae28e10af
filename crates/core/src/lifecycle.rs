//! Session lifecycle rules.
//!
//! ```text
//! pending ──mark_available──▶ available ──start_class──▶ in_progress ──end_class──▶ completed
//!    │                            │
//!    ├──mark_leave / mark_absent──┴──▶ leave | absent
//! ```
//!
//! Every function here is pure: it takes the current snapshots and `now`,
//! checks the guards and returns the replacement snapshots. Persisting the
//! result atomically is the engine's job.

use serde::Serialize;

use crate::attendance::{AttendanceEntry, AttendanceLedger, AttendanceStatus};
use crate::error::{CoreError, CoreResult};
use crate::lesson::LessonRecords;
use crate::session::{Session, SessionStatus};
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleOperation {
    MarkAvailable,
    StartClass,
    EndClass,
    MarkLeave,
    MarkAbsent,
}

impl LifecycleOperation {
    pub const ALL: [LifecycleOperation; 5] = [
        Self::MarkAvailable,
        Self::StartClass,
        Self::EndClass,
        Self::MarkLeave,
        Self::MarkAbsent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarkAvailable => "mark_available",
            Self::StartClass => "start_class",
            Self::EndClass => "end_class",
            Self::MarkLeave => "mark_leave",
            Self::MarkAbsent => "mark_absent",
        }
    }

    /// The status this operation moves `from` into, if the edge exists.
    pub fn target(&self, from: SessionStatus) -> Option<SessionStatus> {
        use SessionStatus::*;
        match (self, from) {
            (Self::MarkAvailable, Pending) => Some(Available),
            (Self::StartClass, Available) => Some(InProgress),
            (Self::EndClass, InProgress) => Some(Completed),
            (Self::MarkLeave, Pending | Available) => Some(Leave),
            (Self::MarkAbsent, Pending | Available) => Some(Absent),
            _ => None,
        }
    }
}

/// Operations with an edge out of `status`. Empty for terminal statuses.
pub fn allowed_operations(status: SessionStatus) -> Vec<LifecycleOperation> {
    LifecycleOperation::ALL
        .into_iter()
        .filter(|op| op.target(status).is_some())
        .collect()
}

fn target_or_reject(op: LifecycleOperation, session: &Session) -> CoreResult<SessionStatus> {
    op.target(session.status).ok_or(CoreError::InvalidTransition {
        operation: op.as_str(),
        from: session.status,
    })
}

fn reject(op: LifecycleOperation, session: &Session) -> CoreError {
    CoreError::InvalidTransition {
        operation: op.as_str(),
        from: session.status,
    }
}

/// Stamp for a new lifecycle timestamp: never earlier than the previous one.
fn stamp_after(now: Timestamp, previous: Option<Timestamp>) -> Timestamp {
    previous.map_or(now, |prev| now.max(prev))
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// `pending → available`; records `teacher_available_at`.
pub fn mark_available(session: &Session, now: Timestamp) -> CoreResult<Session> {
    let op = LifecycleOperation::MarkAvailable;
    let next = target_or_reject(op, session)?;
    if session.teacher_available_at.is_some() {
        return Err(reject(op, session));
    }
    Ok(Session {
        status: next,
        teacher_available_at: Some(now),
        ..session.clone()
    })
}

/// `available → in_progress`; records `class_started_at`.
pub fn start_class(session: &Session, now: Timestamp) -> CoreResult<Session> {
    let op = LifecycleOperation::StartClass;
    let next = target_or_reject(op, session)?;
    if session.class_started_at.is_some() || session.teacher_available_at.is_none() {
        return Err(reject(op, session));
    }
    Ok(Session {
        status: next,
        class_started_at: Some(stamp_after(now, session.teacher_available_at)),
        ..session.clone()
    })
}

/// `in_progress → completed`, gated on full attendance and one complete lesson.
pub fn end_class(
    session: &Session,
    attendance: &AttendanceLedger,
    lessons: &LessonRecords,
    now: Timestamp,
) -> CoreResult<Session> {
    let op = LifecycleOperation::EndClass;
    let next = target_or_reject(op, session)?;
    if session.class_ended_at.is_some() || session.class_started_at.is_none() {
        return Err(reject(op, session));
    }

    let missing_students = attendance.unmarked_students(session.id, &session.participants);
    if !missing_students.is_empty() {
        return Err(CoreError::AttendanceIncomplete { missing_students });
    }
    if let Some(reason) = lessons.incompleteness(session.id) {
        return Err(CoreError::LessonIncomplete { reason });
    }

    Ok(Session {
        status: next,
        class_ended_at: Some(stamp_after(now, session.class_started_at)),
        ..session.clone()
    })
}

/// Whole-roster leave: `pending | available → leave`, marking every
/// participant `leave` in the same step.
///
/// Refused with `AttendanceAlreadyMarked` (listing the conflicting students)
/// if any participant was marked before; nothing is produced in that case.
pub fn mark_leave(
    session: &Session,
    attendance: &AttendanceLedger,
    now: Timestamp,
) -> CoreResult<(Session, Vec<AttendanceEntry>)> {
    let marked_students = attendance.marked_students(session.id, &session.participants);
    if !marked_students.is_empty() {
        return Err(CoreError::AttendanceAlreadyMarked { marked_students });
    }
    let next = target_or_reject(LifecycleOperation::MarkLeave, session)?;

    let entries = session
        .participants
        .iter()
        .map(|student| attendance.mark(session.id, *student, AttendanceStatus::Leave, "", now))
        .collect::<CoreResult<Vec<_>>>()?;

    Ok((
        Session {
            status: next,
            ..session.clone()
        },
        entries,
    ))
}

/// Administrative shortcut: `pending | available → absent`.
pub fn mark_absent(session: &Session) -> CoreResult<Session> {
    let next = target_or_reject(LifecycleOperation::MarkAbsent, session)?;
    Ok(Session {
        status: next,
        ..session.clone()
    })
}

// ---------------------------------------------------------------------------
// Closure readiness
// ---------------------------------------------------------------------------

/// What still blocks `end_class` for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosureReadiness {
    pub session_id: DbId,
    pub status: SessionStatus,
    /// Participants without a marked attendance entry.
    pub missing_students: Vec<DbId>,
    pub lesson_complete: bool,
    pub lesson_issue: Option<String>,
    /// True only when the session is running and nothing is missing.
    pub can_end: bool,
}

/// Evaluate closure readiness against pre-loaded data.
pub fn evaluate_readiness(
    session: &Session,
    attendance: &AttendanceLedger,
    lessons: &LessonRecords,
) -> ClosureReadiness {
    let missing_students = attendance.unmarked_students(session.id, &session.participants);
    let lesson_issue = lessons.incompleteness(session.id);
    let can_end = session.status == SessionStatus::InProgress
        && missing_students.is_empty()
        && lesson_issue.is_none();

    ClosureReadiness {
        session_id: session.id,
        status: session.status,
        missing_students,
        lesson_complete: lesson_issue.is_none(),
        lesson_issue,
        can_end,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
