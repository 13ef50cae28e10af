use std::sync::Arc;

/// Sessions, students, teachers and subjects are keyed by PostgreSQL BIGSERIAL ids.
pub type DbId = i64;

/// All lifecycle and attendance timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Source of "now" for lifecycle stamps. Injected so tests can pin time.
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// The wall clock.
pub fn system_clock() -> Clock {
    Arc::new(chrono::Utc::now)
}
