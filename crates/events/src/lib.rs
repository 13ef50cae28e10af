//! Lifecycle event bus and journal.
//!
//! - [`EventBus`] is the in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`LifecycleEvent`] is the envelope published after every committed
//!   session change.
//! - [`SessionEventJournal`] is the background service that appends every
//!   event to the `session_events` table.

pub mod bus;
pub mod journal;

pub use bus::{EventBus, LifecycleEvent};
pub use journal::SessionEventJournal;
