//! Lesson entry row model.

use classdesk_core::error::CoreError;
use classdesk_core::lesson::{LessonEntry, LessonStatus};
use classdesk_core::types::DbId;
use sqlx::FromRow;

/// A row from the `lesson_entries` table.
#[derive(Debug, Clone, FromRow)]
pub struct LessonRow {
    pub session_id: DbId,
    pub position: i32,
    pub title: String,
    pub description: String,
    pub status: String,
    pub remarks: String,
}

impl LessonRow {
    pub fn into_domain(self) -> Result<LessonEntry, CoreError> {
        let status = LessonStatus::from_str_value(&self.status).map_err(|_| {
            CoreError::Internal(format!(
                "lesson_entries row ({}, {}) has unknown status '{}'",
                self.session_id, self.position, self.status
            ))
        })?;
        Ok(LessonEntry {
            session_id: self.session_id,
            position: self.position,
            title: self.title,
            description: self.description,
            status,
            remarks: self.remarks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_converts_to_lesson() {
        let lesson = LessonRow {
            session_id: 3,
            position: 0,
            title: "Algebra".into(),
            description: "Linear equations".into(),
            status: "in-progress".into(),
            remarks: String::new(),
        }
        .into_domain()
        .unwrap();
        assert_eq!(lesson.status, LessonStatus::InProgress);
        assert!(lesson.is_complete());
    }
}
