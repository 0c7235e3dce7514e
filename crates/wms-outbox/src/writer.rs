//! Atomic save of aggregate state plus its outbox records.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use wms_core::aggregate::{AggregateRoot, Status};
use wms_core::clock::Clock;
use wms_core::envelope::{CorrelationContext, EnvelopeFactory, EnvelopeInput, EnvelopeRegistry};
use wms_core::error::DomainError;
use wms_core::event::DomainEvent;
use wms_core::outbox::OutboxRecord;
use wms_core::repository::{StoreTransaction, StoredAggregate, TransactionalStore};

/// Result of a committed save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Aggregate version after the save.
    pub version: i64,
    /// Ids of the outbox records written, in emission order.
    pub event_ids: Vec<Uuid>,
}

/// Persists aggregates and their pending events in one transaction.
#[derive(Clone)]
pub struct TransactionalWriter {
    store: Arc<dyn TransactionalStore>,
    registry: Arc<EnvelopeRegistry>,
    factory: EnvelopeFactory,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TransactionalWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalWriter")
            .field("routes", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl TransactionalWriter {
    /// Creates a writer over `store`, routing events through `registry`.
    #[must_use]
    pub fn new(
        store: Arc<dyn TransactionalStore>,
        registry: Arc<EnvelopeRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            factory: EnvelopeFactory::new(Arc::clone(&clock)),
            clock,
        }
    }

    /// Commits the aggregate's state and one outbox record per pending event.
    ///
    /// On success the pending events are drained and the version advances.
    /// On failure nothing is persisted and the aggregate keeps its pending
    /// events and version, so the caller may retry the whole operation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if an event type has no route,
    /// `DomainError::ConcurrencyConflict` if the stored version moved, or
    /// `DomainError::Persistence` if the datastore fails.
    #[instrument(
        skip_all,
        fields(
            aggregate_type = A::AGGREGATE_TYPE,
            aggregate_id = %aggregate.aggregate_id(),
            correlation_id = %ctx.correlation_id,
        )
    )]
    pub async fn save<A: AggregateRoot>(
        &self,
        aggregate: &mut A,
        ctx: &CorrelationContext,
    ) -> Result<SaveOutcome, DomainError> {
        let records = self.build_records(&*aggregate, ctx)?;
        let expected_version = aggregate.version();
        let row = StoredAggregate {
            aggregate_type: A::AGGREGATE_TYPE.to_owned(),
            aggregate_id: aggregate.aggregate_id().to_owned(),
            status: aggregate.status().as_str().to_owned(),
            version: expected_version + 1,
            updated_at: aggregate.updated_at(),
            state: aggregate.to_state()?,
        };

        let mut tx = self.store.begin().await?;
        if let Err(e) = write_all(tx.as_mut(), &row, expected_version, &records).await {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback after failed save also failed");
            }
            return Err(e);
        }
        tx.commit().await?;

        aggregate.drain_events();
        aggregate.set_version(row.version);

        let event_ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        info!(
            version = row.version,
            events = event_ids.len(),
            status = %row.status,
            "aggregate saved"
        );
        Ok(SaveOutcome {
            version: row.version,
            event_ids,
        })
    }

    /// Loads and rehydrates an aggregate by business key.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if no row exists, or
    /// `DomainError::Persistence` if the read or rehydration fails.
    #[instrument(skip(self), fields(aggregate_type = A::AGGREGATE_TYPE))]
    pub async fn load<A: AggregateRoot>(&self, aggregate_id: &str) -> Result<A, DomainError> {
        let row = self
            .store
            .load_aggregate(A::AGGREGATE_TYPE, aggregate_id)
            .await?
            .ok_or_else(|| DomainError::AggregateNotFound {
                aggregate_type: A::AGGREGATE_TYPE,
                aggregate_id: aggregate_id.to_owned(),
            })?;
        debug!(version = row.version, status = %row.status, "aggregate loaded");
        A::from_state(row.state, row.version)
    }

    fn build_records<A: AggregateRoot>(
        &self,
        aggregate: &A,
        ctx: &CorrelationContext,
    ) -> Result<Vec<OutboxRecord>, DomainError> {
        let source = aggregate.source_path();
        let now = self.clock.now();
        aggregate
            .pending_events()
            .iter()
            .map(|event| {
                let route = self.registry.require_route(event.event_type())?;
                let envelope = route.build(
                    &self.factory,
                    EnvelopeInput {
                        event_type: event.event_type(),
                        source: &source,
                        payload: event.to_payload(),
                        ctx,
                    },
                );
                OutboxRecord::new(
                    A::AGGREGATE_TYPE,
                    aggregate.aggregate_id(),
                    &route.destination,
                    &envelope,
                    now,
                )
            })
            .collect()
    }
}

async fn write_all(
    tx: &mut dyn StoreTransaction,
    row: &StoredAggregate,
    expected_version: i64,
    records: &[OutboxRecord],
) -> Result<(), DomainError> {
    tx.upsert_aggregate(row, expected_version).await?;
    for record in records {
        tx.append_outbox(record).await?;
    }
    Ok(())
}
