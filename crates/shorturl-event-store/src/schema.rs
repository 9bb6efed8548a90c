//! Event store database schema.

use sqlx::migrate::Migrator;

/// Migrations creating the `domain_events` and `outbox` tables.
///
/// Run once at startup before the store or outbox is used.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
