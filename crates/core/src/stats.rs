//! Dashboard statistics over a collection of sessions.
//!
//! Pure aggregation: recomputed on every read, never stored.

use chrono::{FixedOffset, NaiveDate};
use serde::Serialize;

use crate::attendance::{AttendanceCounts, AttendanceEntry, AttendanceLedger};
use crate::dates;
use crate::session::{Session, SessionStatus};
use crate::types::DbId;

/// Session totals per lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatusCounts {
    pub pending: usize,
    pub available: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub absent: usize,
    pub leave: usize,
}

impl SessionStatusCounts {
    fn add(&mut self, status: SessionStatus) {
        match status {
            SessionStatus::Pending => self.pending += 1,
            SessionStatus::Available => self.available += 1,
            SessionStatus::InProgress => self.in_progress += 1,
            SessionStatus::Completed => self.completed += 1,
            SessionStatus::Absent => self.absent += 1,
            SessionStatus::Leave => self.leave += 1,
        }
    }

    pub fn get(&self, status: SessionStatus) -> usize {
        match status {
            SessionStatus::Pending => self.pending,
            SessionStatus::Available => self.available,
            SessionStatus::InProgress => self.in_progress,
            SessionStatus::Completed => self.completed,
            SessionStatus::Absent => self.absent,
            SessionStatus::Leave => self.leave,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub sessions_by_status: SessionStatusCounts,
    pub attendance: AttendanceCounts,
    /// Sessions whose class date is `today` in the reference zone.
    pub todays_sessions: usize,
    /// `present / all attendance entries` as a percentage with one decimal.
    /// `None` when the sessions carry no entries at all.
    pub attendance_percentage: Option<f64>,
}

/// Aggregate statistics for `sessions`.
///
/// Only attendance entries belonging to the given sessions are counted.
/// Unmarked entries count towards the percentage denominator.
pub fn aggregate(
    sessions: &[Session],
    attendance: &[AttendanceEntry],
    today: NaiveDate,
    reference: &FixedOffset,
) -> SessionStats {
    let mut by_status = SessionStatusCounts::default();
    let mut todays_sessions = 0;
    for session in sessions {
        by_status.add(session.status);
        if dates::is_on(&session.slot.class_date, today, reference) {
            todays_sessions += 1;
        }
    }

    let session_ids: Vec<DbId> = sessions.iter().map(|s| s.id).collect();
    let counts = AttendanceLedger::new(attendance.to_vec()).stats(&session_ids);

    SessionStats {
        total_sessions: sessions.len(),
        sessions_by_status: by_status,
        attendance: counts,
        todays_sessions,
        attendance_percentage: percentage(counts.present, counts.total()),
    }
}

fn percentage(part: usize, whole: usize) -> Option<f64> {
    if whole == 0 {
        return None;
    }
    let pct = part as f64 * 100.0 / whole as f64;
    Some((pct * 10.0).round() / 10.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
