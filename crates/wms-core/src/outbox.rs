//! Outbox record and the store contract the publisher works against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::Envelope;
use crate::error::DomainError;

/// A durable, not-yet-or-already delivered event.
///
/// Written only inside the transaction that changed the aggregate state which
/// produced it. The id equals the envelope id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    /// Record id, identical to the envelope id.
    pub id: Uuid,
    /// Entity kind of the owning aggregate.
    pub aggregate_type: String,
    /// Business key of the owning aggregate; also the bus partition key.
    pub aggregate_id: String,
    /// Event-type name.
    pub event_type: String,
    /// Topic or stream the record is delivered to.
    pub destination: String,
    /// Serialized envelope, delivered verbatim on every attempt.
    pub envelope: serde_json::Value,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
    /// Whether delivery has been acknowledged.
    pub published: bool,
    /// When the first acknowledged delivery was marked.
    pub published_at: Option<DateTime<Utc>>,
    /// Number of failed delivery attempts.
    pub attempts: i32,
    /// Message of the most recent delivery failure.
    pub last_error: Option<String>,
}

impl OutboxRecord {
    /// Creates an unpublished record for `envelope`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the envelope cannot be serialized.
    pub fn new(
        aggregate_type: &str,
        aggregate_id: &str,
        destination: &str,
        envelope: &Envelope,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let serialized = serde_json::to_value(envelope)
            .map_err(|e| DomainError::Persistence(format!("envelope serialization failed: {e}")))?;
        Ok(Self {
            id: envelope.id,
            aggregate_type: aggregate_type.to_owned(),
            aggregate_id: aggregate_id.to_owned(),
            event_type: envelope.event_type.clone(),
            destination: destination.to_owned(),
            envelope: serialized,
            created_at,
            published: false,
            published_at: None,
            attempts: 0,
            last_error: None,
        })
    }

    /// Decodes the stored envelope.
    ///
    /// # Errors
    ///
    /// Returns the decode error if the stored document is not an envelope.
    pub fn decode_envelope(&self) -> Result<Envelope, serde_json::Error> {
        serde_json::from_value(self.envelope.clone())
    }
}

/// Summary of undelivered work in the outbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutboxBacklog {
    /// Number of unpublished records.
    pub unpublished: i64,
    /// Creation time of the oldest unpublished record.
    pub oldest_unpublished_at: Option<DateTime<Utc>>,
    /// Highest attempt count among unpublished records.
    pub max_attempts: i32,
    /// Unpublished records that reached the attempt limit and are no longer
    /// polled. Later records of the same aggregate wait behind them.
    pub parked: i64,
}

/// Read/update side of the outbox, used by the publisher and retention jobs.
///
/// Appending is deliberately absent: records are only written through
/// [`crate::repository::StoreTransaction::append_outbox`].
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Returns up to `limit` deliverable records, oldest-created first.
    ///
    /// Selection is per aggregate and keyed on its oldest unpublished record
    /// (the head):
    /// - head attempts reached `attempt_limit`: the aggregate is parked and
    ///   contributes nothing;
    /// - head has failed before: only the head is returned, so a failing
    ///   aggregate never fills a batch;
    /// - otherwise every unpublished record of the aggregate is eligible.
    async fn find_unpublished(
        &self,
        limit: usize,
        attempt_limit: i32,
    ) -> Result<Vec<OutboxRecord>, DomainError>;

    /// Marks a record delivered. Marking twice keeps the first timestamp.
    ///
    /// Fails with `DomainError::OutboxRecordNotFound` for an unknown id.
    async fn mark_published(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DomainError>;

    /// Increments the attempt count and stores the failure message.
    async fn record_failure(&self, id: Uuid, error: &str) -> Result<(), DomainError>;

    /// Loads one record.
    async fn get(&self, id: Uuid) -> Result<Option<OutboxRecord>, DomainError>;

    /// Returns every record of one aggregate in creation order.
    async fn find_by_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Vec<OutboxRecord>, DomainError>;

    /// Summarizes unpublished records; records with at least
    /// `attempt_limit` attempts count as parked.
    async fn backlog(&self, attempt_limit: i32) -> Result<OutboxBacklog, DomainError>;

    /// Returns up to `limit` records published before `cutoff`.
    async fn find_published_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, DomainError>;

    /// Deletes records published before `cutoff`; returns how many went.
    /// Unpublished records are never deleted.
    async fn delete_published_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError>;
}
