//! Class session model.
//!
//! A session is one scheduled occurrence of a class: a subject taught by a
//! teacher to one or more students in a fixed time slot. Sessions are
//! created `pending` by the scheduling process and only ever move forward
//! through the lifecycle rules in [`crate::lifecycle`].

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dates;
use crate::error::{CoreError, CoreResult};
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Status constants
// ---------------------------------------------------------------------------

/// Scheduled, teacher has not checked in.
pub const STATUS_PENDING: &str = "pending";
/// Teacher has checked in and is ready to start.
pub const STATUS_AVAILABLE: &str = "available";
/// Class is running.
pub const STATUS_IN_PROGRESS: &str = "in_progress";
/// Class ended with full attendance and a lesson record.
pub const STATUS_COMPLETED: &str = "completed";
/// Class did not happen (administrative).
pub const STATUS_ABSENT: &str = "absent";
/// Whole roster was on leave.
pub const STATUS_LEAVE: &str = "leave";

/// All valid session statuses.
pub const VALID_STATUSES: &[&str] = &[
    STATUS_PENDING,
    STATUS_AVAILABLE,
    STATUS_IN_PROGRESS,
    STATUS_COMPLETED,
    STATUS_ABSENT,
    STATUS_LEAVE,
];

/// Maximum number of students one session may serve.
pub const MAX_PARTICIPANTS: usize = 50;

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Available,
    InProgress,
    Completed,
    Absent,
    Leave,
}

impl SessionStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [SessionStatus; 6] = [
        Self::Pending,
        Self::Available,
        Self::InProgress,
        Self::Completed,
        Self::Absent,
        Self::Leave,
    ];

    /// Convert from a database string value.
    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s {
            STATUS_PENDING => Ok(Self::Pending),
            STATUS_AVAILABLE => Ok(Self::Available),
            STATUS_IN_PROGRESS => Ok(Self::InProgress),
            STATUS_COMPLETED => Ok(Self::Completed),
            STATUS_ABSENT => Ok(Self::Absent),
            STATUS_LEAVE => Ok(Self::Leave),
            _ => Err(CoreError::Validation(format!(
                "Invalid session status '{s}'. Must be one of: {}",
                VALID_STATUSES.join(", ")
            ))),
        }
    }

    /// Convert to the database string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => STATUS_PENDING,
            Self::Available => STATUS_AVAILABLE,
            Self::InProgress => STATUS_IN_PROGRESS,
            Self::Completed => STATUS_COMPLETED,
            Self::Absent => STATUS_ABSENT,
            Self::Leave => STATUS_LEAVE,
        }
    }

    /// `completed`, `absent` and `leave` admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Absent | Self::Leave)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The fixed time slot a session was scheduled into.
///
/// `class_date` is kept as the scheduler supplied it; legacy rows mix ISO
/// datetimes, `dd-mm-yyyy` and `yyyy-mm-dd`. Use [`dates::normalize_class_date`]
/// before comparing calendar days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub class_date: String,
}

/// Immutable snapshot of a class session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: DbId,
    pub subject_id: DbId,
    pub teacher_id: DbId,
    pub slot: TimeSlot,
    pub status: SessionStatus,
    /// Students served by this session, in roster order.
    pub participants: Vec<DbId>,
    pub teacher_available_at: Option<Timestamp>,
    pub class_started_at: Option<Timestamp>,
    pub class_ended_at: Option<Timestamp>,
}

impl Session {
    pub fn has_participant(&self, student_id: DbId) -> bool {
        self.participants.contains(&student_id)
    }
}

/// Input for registering a pre-assigned session.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSession {
    pub subject_id: DbId,
    pub teacher_id: DbId,
    pub slot: TimeSlot,
    pub participants: Vec<DbId>,
}

impl NewSession {
    /// Reject rosters that are empty, oversized or contain duplicates, and
    /// class dates no supported format can read.
    pub fn validate(&self) -> CoreResult<()> {
        if self.participants.is_empty() {
            return Err(CoreError::Validation(
                "A session must have at least one participant".into(),
            ));
        }
        if self.participants.len() > MAX_PARTICIPANTS {
            return Err(CoreError::Validation(format!(
                "A session may have at most {MAX_PARTICIPANTS} participants (got {})",
                self.participants.len()
            )));
        }
        let mut seen = HashSet::with_capacity(self.participants.len());
        if let Some(dup) = self.participants.iter().find(|id| !seen.insert(**id)) {
            return Err(CoreError::Validation(format!(
                "Student {dup} appears more than once in the roster"
            )));
        }
        if dates::parse_calendar_date(&self.slot.class_date).is_none() {
            return Err(CoreError::Validation(format!(
                "Unrecognised class date '{}'",
                self.slot.class_date
            )));
        }
        Ok(())
    }
}

/// Optional filters for listing sessions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionFilter {
    pub teacher_id: Option<DbId>,
    pub student_id: Option<DbId>,
    pub status: Option<SessionStatus>,
}

impl SessionFilter {
    pub fn matches(&self, session: &Session) -> bool {
        self.teacher_id.map_or(true, |t| session.teacher_id == t)
            && self.student_id.map_or(true, |s| session.has_participant(s))
            && self.status.map_or(true, |s| session.status == s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
