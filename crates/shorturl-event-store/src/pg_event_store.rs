//! `PostgreSQL` implementation of the `EventStore` trait.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use shorturl_core::error::DomainError;
use shorturl_core::event::{DomainEvent, Stream};
use shorturl_core::serializer::Serializer;
use shorturl_core::store::EventStore;

use crate::infrastructure;

/// PostgreSQL-backed event store.
///
/// Events are stored as serializer envelopes. Each newly inserted event is
/// also staged in the `outbox` table within the same transaction, so a stored
/// event is always eventually relayed.
#[derive(Debug, Clone)]
pub struct PgEventStore<E> {
    pool: PgPool,
    serializer: Arc<Serializer<E>>,
}

impl<E: DomainEvent> PgEventStore<E> {
    /// Creates a new `PgEventStore`.
    #[must_use]
    pub fn new(pool: PgPool, serializer: Arc<Serializer<E>>) -> Self {
        Self { pool, serializer }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    version: i64,
    payload: serde_json::Value,
}

#[async_trait]
impl<E: DomainEvent> EventStore<E> for PgEventStore<E> {
    #[instrument(skip(self, events), fields(count = events.len()))]
    async fn append(&self, entity_id: &str, events: &[E]) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(infrastructure)?;

        for event in events {
            let bytes = self.serializer.marshal(event)?;
            let payload: serde_json::Value =
                serde_json::from_slice(&bytes).map_err(infrastructure)?;

            let inserted = sqlx::query(
                r"
                INSERT INTO domain_events (entity_id, version, event_type, payload, happened_on)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (entity_id, version) DO NOTHING
                ",
            )
            .bind(entity_id)
            .bind(event.version())
            .bind(event.event_type())
            .bind(&payload)
            .bind(event.metadata().happened_on)
            .execute(&mut *tx)
            .await
            .map_err(infrastructure)?
            .rows_affected();

            if inserted == 0 {
                debug!(entity_id, version = event.version(), "event already stored, skipping");
                continue;
            }

            sqlx::query("INSERT INTO outbox (payload) VALUES ($1)")
                .bind(&bytes)
                .execute(&mut *tx)
                .await
                .map_err(infrastructure)?;
        }

        tx.commit().await.map_err(infrastructure)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load(&self, entity_id: &str) -> Result<Stream<E>, DomainError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"
            SELECT version, payload
            FROM domain_events
            WHERE entity_id = $1
            ORDER BY version ASC
            ",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;

        if rows.is_empty() {
            return Err(DomainError::EntityNotFound(entity_id.to_owned()));
        }

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let bytes = serde_json::to_vec(&row.payload).map_err(infrastructure)?;
            let event = self.serializer.unmarshal(&bytes)?;
            if event.version() != row.version {
                return Err(DomainError::Infrastructure(format!(
                    "stored event {entity_id}@{} decoded as version {}",
                    row.version,
                    event.version()
                )));
            }
            events.push(event);
        }

        Ok(Stream::new(entity_id, events))
    }
}
