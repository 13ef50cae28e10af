//! Attendance ledger.
//!
//! One [`AttendanceEntry`] exists per (session, student) from the moment a
//! session is created. An entry is marked exactly once; after that it is
//! immutable. The ledger itself never mutates: [`AttendanceLedger::mark`]
//! validates against the current entry and returns the replacement value,
//! which the engine then commits.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Status constants
// ---------------------------------------------------------------------------

pub const ATTENDANCE_NOT_MARKED: &str = "not_marked";
pub const ATTENDANCE_PRESENT: &str = "present";
pub const ATTENDANCE_ABSENT: &str = "absent";
pub const ATTENDANCE_LEAVE: &str = "leave";

/// Statuses a caller may mark an entry with.
pub const MARKABLE_STATUSES: &[&str] = &[ATTENDANCE_PRESENT, ATTENDANCE_ABSENT, ATTENDANCE_LEAVE];

/// Maximum length for free-text attendance remarks (characters).
pub const MAX_REMARKS_LENGTH: usize = 1_000;

// ---------------------------------------------------------------------------
// AttendanceStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    #[default]
    NotMarked,
    Present,
    Absent,
    Leave,
}

impl AttendanceStatus {
    /// Convert from a database string value (any of the four statuses).
    pub fn from_str_value(s: &str) -> CoreResult<Self> {
        match s {
            ATTENDANCE_NOT_MARKED => Ok(Self::NotMarked),
            other => Self::parse_markable(other),
        }
    }

    /// Parse a status a caller is allowed to mark with.
    ///
    /// `not_marked` is rejected: an entry can never be reset.
    pub fn parse_markable(s: &str) -> CoreResult<Self> {
        match s {
            ATTENDANCE_PRESENT => Ok(Self::Present),
            ATTENDANCE_ABSENT => Ok(Self::Absent),
            ATTENDANCE_LEAVE => Ok(Self::Leave),
            _ => Err(CoreError::Validation(format!(
                "Invalid attendance status '{s}'. Must be one of: {}",
                MARKABLE_STATUSES.join(", ")
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotMarked => ATTENDANCE_NOT_MARKED,
            Self::Present => ATTENDANCE_PRESENT,
            Self::Absent => ATTENDANCE_ABSENT,
            Self::Leave => ATTENDANCE_LEAVE,
        }
    }

    pub fn is_marked(&self) -> bool {
        *self != Self::NotMarked
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AttendanceEntry
// ---------------------------------------------------------------------------

/// Attendance of one participant in one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub session_id: DbId,
    pub student_id: DbId,
    pub status: AttendanceStatus,
    pub remarks: String,
    /// Set once, when the entry leaves `not_marked`.
    pub marked_at: Option<Timestamp>,
}

impl AttendanceEntry {
    /// The entry every participant starts with.
    pub fn unmarked(session_id: DbId, student_id: DbId) -> Self {
        Self {
            session_id,
            student_id,
            status: AttendanceStatus::NotMarked,
            remarks: String::new(),
            marked_at: None,
        }
    }

    pub fn is_marked(&self) -> bool {
        self.status.is_marked()
    }

    /// The marked replacement for this entry.
    ///
    /// Fails with `AlreadyMarked` if this entry was marked before, and with
    /// `Validation` for `not_marked` or over-long remarks.
    pub fn marked(
        &self,
        status: AttendanceStatus,
        remarks: &str,
        now: Timestamp,
    ) -> CoreResult<Self> {
        if self.is_marked() {
            return Err(CoreError::AlreadyMarked {
                session_id: self.session_id,
                student_id: self.student_id,
            });
        }
        if !status.is_marked() {
            return Err(CoreError::Validation(format!(
                "Invalid attendance status '{status}'. Must be one of: {}",
                MARKABLE_STATUSES.join(", ")
            )));
        }
        validate_remarks(remarks)?;

        Ok(Self {
            status,
            remarks: remarks.trim().to_string(),
            marked_at: Some(now),
            ..self.clone()
        })
    }
}

/// Validate the free-text remarks length.
pub fn validate_remarks(remarks: &str) -> CoreResult<()> {
    let len = remarks.chars().count();
    if len > MAX_REMARKS_LENGTH {
        return Err(CoreError::Validation(format!(
            "Remarks exceed maximum length of {MAX_REMARKS_LENGTH} characters (got {len})"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Counts
// ---------------------------------------------------------------------------

/// Attendance totals over a set of sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceCounts {
    pub present: usize,
    pub absent: usize,
    pub leave: usize,
    pub not_marked: usize,
}

impl AttendanceCounts {
    fn add(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::NotMarked => self.not_marked += 1,
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Leave => self.leave += 1,
        }
    }

    /// Entries that carry a decision.
    pub fn marked(&self) -> usize {
        self.present + self.absent + self.leave
    }

    pub fn total(&self) -> usize {
        self.marked() + self.not_marked
    }
}

// ---------------------------------------------------------------------------
// AttendanceLedger
// ---------------------------------------------------------------------------

/// Read-only view over attendance entries for one or more sessions.
#[derive(Debug, Clone, Default)]
pub struct AttendanceLedger {
    entries: Vec<AttendanceEntry>,
}

impl AttendanceLedger {
    pub fn new(entries: Vec<AttendanceEntry>) -> Self {
        Self { entries }
    }

    pub fn entry(&self, session_id: DbId, student_id: DbId) -> Option<&AttendanceEntry> {
        self.entries
            .iter()
            .find(|e| e.session_id == session_id && e.student_id == student_id)
    }

    /// Validate a marking decision and return the replacement entry.
    pub fn mark(
        &self,
        session_id: DbId,
        student_id: DbId,
        status: AttendanceStatus,
        remarks: &str,
        now: Timestamp,
    ) -> CoreResult<AttendanceEntry> {
        let current = self
            .entry(session_id, student_id)
            .cloned()
            .unwrap_or_else(|| AttendanceEntry::unmarked(session_id, student_id));
        current.marked(status, remarks, now)
    }

    /// Participants whose entry is missing or still `not_marked`, in roster order.
    pub fn unmarked_students(&self, session_id: DbId, participants: &[DbId]) -> Vec<DbId> {
        participants
            .iter()
            .copied()
            .filter(|student| {
                self.entry(session_id, *student)
                    .map_or(true, |e| !e.is_marked())
            })
            .collect()
    }

    /// Participants whose entry already carries a decision, in roster order.
    pub fn marked_students(&self, session_id: DbId, participants: &[DbId]) -> Vec<DbId> {
        participants
            .iter()
            .copied()
            .filter(|student| {
                self.entry(session_id, *student)
                    .is_some_and(AttendanceEntry::is_marked)
            })
            .collect()
    }

    /// True iff every participant has a marked entry.
    pub fn is_complete(&self, session_id: DbId, participants: &[DbId]) -> bool {
        self.unmarked_students(session_id, participants).is_empty()
    }

    /// Count entries by status across the given sessions.
    pub fn stats(&self, session_ids: &[DbId]) -> AttendanceCounts {
        let mut counts = AttendanceCounts::default();
        for entry in self
            .entries
            .iter()
            .filter(|e| session_ids.contains(&e.session_id))
        {
            counts.add(entry.status);
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap()
    }

    fn ledger() -> AttendanceLedger {
        AttendanceLedger::new(vec![
            AttendanceEntry::unmarked(1, 10),
            AttendanceEntry::unmarked(1, 11),
        ])
    }

    #[test]
    fn marking_sets_status_remarks_and_timestamp() {
        let entry = ledger()
            .mark(1, 10, AttendanceStatus::Present, "  on time ", now())
            .unwrap();
        assert_eq!(entry.status, AttendanceStatus::Present);
        assert_eq!(entry.remarks, "on time");
        assert_eq!(entry.marked_at, Some(now()));
    }

    #[test]
    fn marked_entry_cannot_be_marked_again() {
        let marked = ledger()
            .mark(1, 10, AttendanceStatus::Absent, "", now())
            .unwrap();
        let ledger = AttendanceLedger::new(vec![marked]);

        for status in [AttendanceStatus::Present, AttendanceStatus::Absent, AttendanceStatus::Leave] {
            assert_matches!(
                ledger.mark(1, 10, status, "changed my mind", now()),
                Err(CoreError::AlreadyMarked { session_id: 1, student_id: 10 })
            );
        }
    }

    #[test]
    fn not_marked_is_not_a_markable_status() {
        assert_matches!(
            ledger().mark(1, 10, AttendanceStatus::NotMarked, "", now()),
            Err(CoreError::Validation(_))
        );
        assert!(AttendanceStatus::parse_markable("not_marked").is_err());
        assert!(AttendanceStatus::parse_markable("late").is_err());
        assert_eq!(
            AttendanceStatus::parse_markable("leave").unwrap(),
            AttendanceStatus::Leave
        );
    }

    #[test]
    fn remarks_over_limit_are_rejected() {
        let long = "x".repeat(MAX_REMARKS_LENGTH + 1);
        assert_matches!(
            ledger().mark(1, 10, AttendanceStatus::Present, &long, now()),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn completeness_requires_every_participant() {
        let first = ledger()
            .mark(1, 10, AttendanceStatus::Present, "", now())
            .unwrap();
        let half = AttendanceLedger::new(vec![first.clone(), AttendanceEntry::unmarked(1, 11)]);
        assert!(!half.is_complete(1, &[10, 11]));
        assert_eq!(half.unmarked_students(1, &[10, 11]), vec![11]);
        assert_eq!(half.marked_students(1, &[10, 11]), vec![10]);

        let second = half.mark(1, 11, AttendanceStatus::Leave, "", now()).unwrap();
        let full = AttendanceLedger::new(vec![first, second]);
        assert!(full.is_complete(1, &[10, 11]));
    }

    #[test]
    fn missing_entry_counts_as_unmarked() {
        let ledger = AttendanceLedger::new(vec![]);
        assert!(!ledger.is_complete(1, &[10]));
        assert_eq!(ledger.unmarked_students(1, &[10]), vec![10]);
    }

    #[test]
    fn stats_only_counts_requested_sessions() {
        let mut entries = vec![
            AttendanceEntry::unmarked(1, 10),
            AttendanceEntry::unmarked(2, 10),
            AttendanceEntry::unmarked(3, 10),
        ];
        entries[0] = entries[0].marked(AttendanceStatus::Present, "", now()).unwrap();
        entries[1] = entries[1].marked(AttendanceStatus::Absent, "", now()).unwrap();
        entries[2] = entries[2].marked(AttendanceStatus::Present, "", now()).unwrap();
        let ledger = AttendanceLedger::new(entries);

        let counts = ledger.stats(&[1, 2]);
        assert_eq!(counts.present, 1);
        assert_eq!(counts.absent, 1);
        assert_eq!(counts.leave, 0);
        assert_eq!(counts.marked(), 2);
    }
}
