//! `PostgreSQL` implementation of the `Outbox` trait.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use shorturl_core::error::DomainError;
use shorturl_core::outbox::{Outbox, OutboxEvent};

use crate::infrastructure;

/// Default number of rows returned by one pull.
pub const DEFAULT_BATCH_SIZE: i64 = 100;

/// PostgreSQL-backed outbox reading rows staged by `PgEventStore`.
#[derive(Debug, Clone)]
pub struct PgOutbox {
    pool: PgPool,
    batch_size: i64,
}

impl PgOutbox {
    /// Creates a new `PgOutbox` pulling at most `batch_size` rows at a time.
    #[must_use]
    pub fn new(pool: PgPool, batch_size: i64) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: i64,
    payload: Vec<u8>,
}

#[async_trait]
impl Outbox for PgOutbox {
    #[instrument(skip(self))]
    async fn pull_events(&self) -> Result<Vec<OutboxEvent>, DomainError> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r"
            SELECT id, payload
            FROM outbox
            WHERE sent_at IS NULL
            ORDER BY id ASC
            LIMIT $1
            ",
        )
        .bind(self.batch_size)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;

        Ok(rows
            .into_iter()
            .map(|row| OutboxEvent {
                id: row.id,
                payload: row.payload,
            })
            .collect())
    }

    #[instrument(skip(self, events), fields(count = events.len()))]
    async fn mark_events_as_sent(&self, events: &[OutboxEvent]) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
        sqlx::query("UPDATE outbox SET sent_at = NOW() WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;

        Ok(())
    }
}
