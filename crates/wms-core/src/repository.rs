//! Transactional datastore abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DomainError;
use crate::outbox::OutboxRecord;

/// Persisted form of any aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAggregate {
    /// Entity kind (e.g. `shipment`).
    pub aggregate_type: String,
    /// Business key.
    pub aggregate_id: String,
    /// Status name at the time of the save.
    pub status: String,
    /// Version after the save.
    pub version: i64,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
    /// Serialized aggregate state.
    pub state: serde_json::Value,
}

/// Opens transactions and reads committed aggregate state.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Starts a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError>;

    /// Loads the committed row of one aggregate.
    async fn load_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Option<StoredAggregate>, DomainError>;
}

/// An open transaction. Nothing written through it is visible until
/// [`StoreTransaction::commit`] succeeds.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Inserts or updates an aggregate row.
    ///
    /// `expected_version` is the version the caller loaded (0 for a new
    /// aggregate). A mismatch fails with `DomainError::ConcurrencyConflict`.
    async fn upsert_aggregate(
        &mut self,
        row: &StoredAggregate,
        expected_version: i64,
    ) -> Result<(), DomainError>;

    /// Appends an outbox record in this transaction.
    async fn append_outbox(&mut self, record: &OutboxRecord) -> Result<(), DomainError>;

    /// Makes every write in this transaction durable and visible.
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    /// Discards every write in this transaction.
    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}
