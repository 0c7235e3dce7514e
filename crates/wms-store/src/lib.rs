//! WMS Store — `PostgreSQL` persistence for aggregate state and the outbox.
//!
//! One `aggregate_states` table holds every context's aggregates as JSON
//! documents; `outbox_events` holds the records the publisher relays.

pub mod datastore;
pub mod outbox_store;

use wms_core::error::DomainError;

pub use datastore::{PgDatastore, PgStoreTransaction};
pub use outbox_store::PgOutboxStore;

/// Embedded schema migrations.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> DomainError {
    move |e| DomainError::Persistence(format!("{context}: {e}"))
}

fn to_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
