//! Integration tests for `PgEventStore` and `PgOutbox`.
//!
//! These need a `PostgreSQL` server reachable through `DATABASE_URL`; run
//! them with `cargo test -- --ignored`.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde::Deserialize;
use shorturl_core::error::DomainError;
use shorturl_core::event::{DomainEvent, EventMetadata};
use shorturl_core::outbox::Outbox;
use shorturl_core::serializer::Serializer;
use shorturl_core::store::EventStore;
use shorturl_event_store::pg_event_store::PgEventStore;
use shorturl_event_store::pg_outbox::PgOutbox;
use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq)]
struct Counted {
    metadata: EventMetadata,
    count: u32,
}

impl DomainEvent for Counted {
    fn event_type(&self) -> &'static str {
        "test.counted"
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn to_data(&self) -> Result<serde_json::Value, serde_json::Error> {
        Ok(serde_json::json!({
            "entity_id": self.metadata.entity_id,
            "version": self.metadata.version,
            "happened_on": self.metadata.happened_on,
            "count": self.count,
        }))
    }
}

fn decode_counted(data: serde_json::Value) -> Result<Counted, serde_json::Error> {
    #[derive(Deserialize)]
    struct Data {
        #[serde(flatten)]
        metadata: EventMetadata,
        count: u32,
    }
    let data: Data = serde_json::from_value(data)?;
    Ok(Counted {
        metadata: data.metadata,
        count: data.count,
    })
}

fn counted(entity_id: &str, version: i64) -> Counted {
    Counted {
        metadata: EventMetadata::new(
            entity_id,
            version,
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ),
        count: u32::try_from(version).unwrap() * 10,
    }
}

fn store(pool: PgPool) -> PgEventStore<Counted> {
    PgEventStore::new(
        pool,
        Arc::new(Serializer::new().bind("test.counted", decode_counted)),
    )
}

// --- load ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_load_missing_entity_fails_with_entity_not_found(pool: PgPool) {
    let store = store(pool);

    let result = store.load("missing").await;

    assert!(matches!(result, Err(DomainError::EntityNotFound(_))));
}

// --- append + load round-trip ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_append_and_load_preserves_version_order(pool: PgPool) {
    // Arrange
    let store = store(pool);

    // Act
    store
        .append("abc", &[counted("abc", 1), counted("abc", 0)])
        .await
        .unwrap();
    store.append("abc", &[counted("abc", 2)]).await.unwrap();
    let stream = store.load("abc").await.unwrap();

    // Assert
    assert_eq!(stream.version(), 2);
    assert_eq!(
        stream.events(),
        &[counted("abc", 0), counted("abc", 1), counted("abc", 2)]
    );
}

// --- idempotency ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_duplicate_append_is_noop_and_not_restaged(pool: PgPool) {
    // Arrange
    let store = store(pool.clone());
    let outbox = PgOutbox::new(pool, 100);
    store.append("abc", &[counted("abc", 0)]).await.unwrap();

    // Act
    let result = store.append("abc", &[counted("abc", 0)]).await;

    // Assert
    assert!(result.is_ok());
    assert_eq!(store.load("abc").await.unwrap().events().len(), 1);
    assert_eq!(outbox.pull_events().await.unwrap().len(), 1);
}

// --- outbox ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_appended_events_are_staged_and_can_be_marked_sent(pool: PgPool) {
    // Arrange
    let store = store(pool.clone());
    let outbox = PgOutbox::new(pool, 100);
    store
        .append("abc", &[counted("abc", 0), counted("abc", 1)])
        .await
        .unwrap();
    let pulled = outbox.pull_events().await.unwrap();
    assert_eq!(pulled.len(), 2);
    assert!(pulled[0].id < pulled[1].id);

    // Act
    outbox.mark_events_as_sent(&pulled[..1]).await.unwrap();

    // Assert
    let remaining = outbox.pull_events().await.unwrap();
    assert_eq!(remaining, vec![pulled[1].clone()]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
async fn test_pull_respects_batch_size(pool: PgPool) {
    let store = store(pool.clone());
    let outbox = PgOutbox::new(pool, 2);
    store
        .append(
            "abc",
            &[counted("abc", 0), counted("abc", 1), counted("abc", 2)],
        )
        .await
        .unwrap();

    let pulled = outbox.pull_events().await.unwrap();

    assert_eq!(pulled.len(), 2);
}
