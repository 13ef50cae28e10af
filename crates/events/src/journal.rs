//! Durable journal of lifecycle events.
//!
//! [`SessionEventJournal`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and appends every [`LifecycleEvent`] to the `session_events` table. It runs
//! as a long-lived background task and stops when the bus is dropped.

use classdesk_core::types::DbId;
use classdesk_db::repositories::SessionEventRepo;
use classdesk_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::LifecycleEvent;

/// Background service that persists lifecycle events.
pub struct SessionEventJournal;

impl SessionEventJournal {
    /// Run the journal loop until the channel closes.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<LifecycleEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = Self::persist(&pool, &event).await {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            session_id = event.session_id,
                            "Failed to journal session event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Session event journal lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, session event journal shutting down");
                    break;
                }
            }
        }
    }

    async fn persist(pool: &DbPool, event: &LifecycleEvent) -> Result<DbId, sqlx::Error> {
        SessionEventRepo::insert(
            pool,
            &event.event_type,
            event.session_id,
            &event.payload,
            event.timestamp,
        )
        .await
    }
}
