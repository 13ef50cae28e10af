use std::sync::Arc;

use classdesk_core::engine::LifecycleEngine;
use classdesk_db::DbPool;
use classdesk_events::EventBus;

use crate::config::ServerConfig;

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// The single writer of session state.
    pub engine: Arc<LifecycleEngine>,
    pub config: Arc<ServerConfig>,
    /// Publishes a lifecycle event after every committed change.
    pub event_bus: Arc<EventBus>,
    /// Present when the engine runs on PostgreSQL; used by the health check.
    pub pool: Option<DbPool>,
}
