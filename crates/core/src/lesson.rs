//! Lesson records attached to a session.
//!
//! The lesson list is always replaced wholesale: callers submit the full
//! desired set. Drafts with an empty title or description are accepted on
//! upsert; completeness is only enforced when the class is ended.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::DbId;

/// Maximum length for a lesson title (characters).
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum length for a lesson description (characters).
pub const MAX_DESCRIPTION_LENGTH: usize = 5_000;

/// Maximum number of lesson entries per session.
pub const MAX_LESSONS_PER_SESSION: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LessonStatus {
    #[default]
    InProgress,
    Completed,
}

impl LessonStatus {
    pub fn from_str_value(s: &str) -> CoreResult<Self> {
        match s {
            "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            _ => Err(CoreError::Validation(format!(
                "Invalid lesson status '{s}'. Must be one of: in-progress, completed"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
        }
    }
}

/// A lesson as submitted by the teacher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LessonDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: LessonStatus,
    #[serde(default)]
    pub remarks: String,
}

/// A stored lesson entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonEntry {
    pub session_id: DbId,
    /// Zero-based order within the session's lesson list.
    pub position: i32,
    pub title: String,
    pub description: String,
    pub status: LessonStatus,
    pub remarks: String,
}

impl LessonEntry {
    /// Both title and description carry non-whitespace text.
    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty() && !self.description.trim().is_empty()
    }
}

/// Read-only view over the lessons of one or more sessions.
#[derive(Debug, Clone, Default)]
pub struct LessonRecords {
    lessons: Vec<LessonEntry>,
}

impl LessonRecords {
    pub fn new(lessons: Vec<LessonEntry>) -> Self {
        Self { lessons }
    }

    pub fn for_session(&self, session_id: DbId) -> impl Iterator<Item = &LessonEntry> {
        self.lessons.iter().filter(move |l| l.session_id == session_id)
    }

    /// True iff at least one lesson has both a title and a description.
    pub fn is_complete(&self, session_id: DbId) -> bool {
        self.for_session(session_id).any(LessonEntry::is_complete)
    }

    /// Why the session's lessons do not satisfy completeness, if they don't.
    pub fn incompleteness(&self, session_id: DbId) -> Option<String> {
        let mut lessons = self.for_session(session_id).peekable();
        if lessons.peek().is_none() {
            return Some("no lesson has been recorded".to_string());
        }
        if lessons.any(LessonEntry::is_complete) {
            return None;
        }
        let (mut no_title, mut no_description) = (false, false);
        for lesson in self.for_session(session_id) {
            no_title |= lesson.title.trim().is_empty();
            no_description |= lesson.description.trim().is_empty();
        }
        let missing = match (no_title, no_description) {
            (true, true) => "title and description",
            (true, false) => "title",
            _ => "description",
        };
        Some(format!("no lesson has both a title and a description (missing {missing})"))
    }

    /// Validate a full replacement set and build the entries to store.
    pub fn upsert(session_id: DbId, drafts: &[LessonDraft]) -> CoreResult<Vec<LessonEntry>> {
        validate_drafts(drafts)?;
        Ok(drafts
            .iter()
            .zip(0..)
            .map(|(draft, position)| LessonEntry {
                session_id,
                position,
                title: draft.title.trim().to_string(),
                description: draft.description.trim().to_string(),
                status: draft.status,
                remarks: draft.remarks.trim().to_string(),
            })
            .collect())
    }
}

/// Validate lesson draft sizes. Empty fields are allowed.
pub fn validate_drafts(drafts: &[LessonDraft]) -> CoreResult<()> {
    if drafts.len() > MAX_LESSONS_PER_SESSION {
        return Err(CoreError::Validation(format!(
            "A session may have at most {MAX_LESSONS_PER_SESSION} lessons (got {})",
            drafts.len()
        )));
    }
    for (idx, draft) in drafts.iter().enumerate() {
        let title_len = draft.title.chars().count();
        if title_len > MAX_TITLE_LENGTH {
            return Err(CoreError::Validation(format!(
                "Lesson {idx}: title exceeds maximum length of {MAX_TITLE_LENGTH} characters (got {title_len})"
            )));
        }
        let desc_len = draft.description.chars().count();
        if desc_len > MAX_DESCRIPTION_LENGTH {
            return Err(CoreError::Validation(format!(
                "Lesson {idx}: description exceeds maximum length of {MAX_DESCRIPTION_LENGTH} characters (got {desc_len})"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
