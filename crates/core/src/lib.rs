//! Class-session lifecycle domain.
//!
//! Pure rules for advancing a scheduled class from `pending` to a closed
//! status, the attendance and lesson records that gate closing it, and the
//! statistics derived from many sessions. [`engine::LifecycleEngine`] applies
//! the rules atomically against a [`store::SessionStore`].

pub mod attendance;
pub mod dates;
pub mod engine;
pub mod error;
pub mod lesson;
pub mod lifecycle;
pub mod session;
pub mod stats;
pub mod store;
pub mod types;
