//! Repository for the `session_events` journal.

use classdesk_core::types::{DbId, Timestamp};
use sqlx::PgPool;

/// Append-only access to journaled lifecycle events.
pub struct SessionEventRepo;

impl SessionEventRepo {
    /// Insert a new event row, returning the generated ID.
    pub async fn insert(
        pool: &PgPool,
        event_type: &str,
        session_id: DbId,
        payload: &serde_json::Value,
        occurred_at: Timestamp,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO session_events (event_type, session_id, payload, occurred_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(event_type)
        .bind(session_id)
        .bind(payload)
        .bind(occurred_at)
        .fetch_one(pool)
        .await
    }
}
