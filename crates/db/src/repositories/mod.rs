//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Guarded writes that must share a
//! transaction take `&mut PgConnection` instead.

pub mod attendance_repo;
pub mod lesson_repo;
pub mod session_event_repo;
pub mod session_repo;

pub use attendance_repo::AttendanceRepo;
pub use lesson_repo::LessonRepo;
pub use session_event_repo::SessionEventRepo;
pub use session_repo::SessionRepo;
