//! In-memory transactional datastore with fault injection.
//!
//! Writes made through a transaction are staged and applied to the shared
//! state in one step at commit, so a failure anywhere before commit leaves
//! the committed state untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use wms_core::error::DomainError;
use wms_core::outbox::{OutboxBacklog, OutboxRecord, OutboxStore};
use wms_core::repository::{StoreTransaction, StoredAggregate, TransactionalStore};

#[derive(Debug, Default)]
struct State {
    aggregates: HashMap<(String, String), StoredAggregate>,
    outbox: Vec<OutboxRecord>,
}

impl State {
    fn current_version(&self, aggregate_type: &str, aggregate_id: &str) -> i64 {
        self.aggregates
            .get(&(aggregate_type.to_owned(), aggregate_id.to_owned()))
            .map_or(0, |row| row.version)
    }

    fn record_mut(&mut self, id: Uuid) -> Result<&mut OutboxRecord, DomainError> {
        self.outbox
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(DomainError::OutboxRecordNotFound(id))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    begin: bool,
    upsert: bool,
    append_at: Option<usize>,
    commit: bool,
    find_unpublished: bool,
    mark_published: bool,
}

fn injected(operation: &str) -> DomainError {
    DomainError::Persistence(format!("injected failure: {operation}"))
}

/// A `TransactionalStore` and `OutboxStore` backed by process memory.
///
/// Clones share the same state, so a test can hand one clone to the writer
/// and the publisher and inspect another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatastore {
    state: Arc<Mutex<State>>,
    faults: Arc<Mutex<Faults>>,
}

impl InMemoryDatastore {
    /// Create an empty datastore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `begin` fail while set.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_begin(&self, fail: bool) {
        self.faults.lock().unwrap().begin = fail;
    }

    /// Makes `upsert_aggregate` fail while set.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_upsert(&self, fail: bool) {
        self.faults.lock().unwrap().upsert = fail;
    }

    /// Makes the `index`-th (zero-based) `append_outbox` of each subsequent
    /// transaction fail. `None` clears the fault.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_append_at(&self, index: Option<usize>) {
        self.faults.lock().unwrap().append_at = index;
    }

    /// Makes `commit` fail while set. Nothing staged is applied.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_commit(&self, fail: bool) {
        self.faults.lock().unwrap().commit = fail;
    }

    /// Makes `find_unpublished` fail while set.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_find_unpublished(&self, fail: bool) {
        self.faults.lock().unwrap().find_unpublished = fail;
    }

    /// Makes `mark_published` fail while set.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_mark_published(&self, fail: bool) {
        self.faults.lock().unwrap().mark_published = fail;
    }

    /// Inserts a record directly, bypassing any transaction.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert_record(&self, record: OutboxRecord) {
        self.state.lock().unwrap().outbox.push(record);
    }

    /// Returns a snapshot of every outbox record in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn records(&self) -> Vec<OutboxRecord> {
        self.state.lock().unwrap().outbox.clone()
    }

    /// Returns the committed row of one aggregate.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn aggregate(&self, aggregate_type: &str, aggregate_id: &str) -> Option<StoredAggregate> {
        self.state
            .lock()
            .unwrap()
            .aggregates
            .get(&(aggregate_type.to_owned(), aggregate_id.to_owned()))
            .cloned()
    }

    /// Number of committed aggregate rows.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn aggregate_count(&self) -> usize {
        self.state.lock().unwrap().aggregates.len()
    }
}

#[async_trait]
impl TransactionalStore for InMemoryDatastore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError> {
        let faults = *self.faults.lock().unwrap();
        if faults.begin {
            return Err(injected("begin"));
        }
        Ok(Box::new(InMemoryTransaction {
            state: Arc::clone(&self.state),
            faults,
            aggregates: Vec::new(),
            outbox: Vec::new(),
        }))
    }

    async fn load_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Option<StoredAggregate>, DomainError> {
        Ok(self.aggregate(aggregate_type, aggregate_id))
    }
}

/// Staged writes of one in-memory transaction.
#[derive(Debug)]
struct InMemoryTransaction {
    state: Arc<Mutex<State>>,
    faults: Faults,
    aggregates: Vec<(StoredAggregate, i64)>,
    outbox: Vec<OutboxRecord>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn upsert_aggregate(
        &mut self,
        row: &StoredAggregate,
        expected_version: i64,
    ) -> Result<(), DomainError> {
        if self.faults.upsert {
            return Err(injected("upsert_aggregate"));
        }
        let actual = self
            .state
            .lock()
            .unwrap()
            .current_version(&row.aggregate_type, &row.aggregate_id);
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: row.aggregate_id.clone(),
                expected: expected_version,
                actual,
            });
        }
        self.aggregates.push((row.clone(), expected_version));
        Ok(())
    }

    async fn append_outbox(&mut self, record: &OutboxRecord) -> Result<(), DomainError> {
        if self.faults.append_at == Some(self.outbox.len()) {
            return Err(injected("append_outbox"));
        }
        self.outbox.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let Self {
            state: shared,
            faults,
            aggregates,
            outbox,
        } = *self;
        if faults.commit {
            return Err(injected("commit"));
        }
        let mut state = shared.lock().unwrap();
        for (row, expected) in &aggregates {
            let actual = state.current_version(&row.aggregate_type, &row.aggregate_id);
            if actual != *expected {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id: row.aggregate_id.clone(),
                    expected: *expected,
                    actual,
                });
            }
        }
        if let Some(duplicate) = outbox
            .iter()
            .find(|record| state.outbox.iter().any(|existing| existing.id == record.id))
        {
            return Err(DomainError::Persistence(format!(
                "duplicate outbox record id {}",
                duplicate.id
            )));
        }
        for (row, _) in aggregates {
            state
                .aggregates
                .insert((row.aggregate_type.clone(), row.aggregate_id.clone()), row);
        }
        state.outbox.extend(outbox);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryDatastore {
    async fn find_unpublished(
        &self,
        limit: usize,
        attempt_limit: i32,
    ) -> Result<Vec<OutboxRecord>, DomainError> {
        if self.faults.lock().unwrap().find_unpublished {
            return Err(injected("find_unpublished"));
        }
        let state = self.state.lock().unwrap();
        let mut heads: HashMap<(&str, &str), &OutboxRecord> = HashMap::new();
        for record in state.outbox.iter().filter(|r| !r.published) {
            heads
                .entry((record.aggregate_type.as_str(), record.aggregate_id.as_str()))
                .or_insert(record);
        }
        Ok(state
            .outbox
            .iter()
            .filter(|record| !record.published)
            .filter(|record| {
                heads
                    .get(&(record.aggregate_type.as_str(), record.aggregate_id.as_str()))
                    .is_some_and(|head| {
                        head.attempts < attempt_limit
                            && (head.attempts == 0 || head.id == record.id)
                    })
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.faults.lock().unwrap().mark_published {
            return Err(injected("mark_published"));
        }
        let mut state = self.state.lock().unwrap();
        let record = state.record_mut(id)?;
        if !record.published {
            record.published = true;
            record.published_at = Some(at);
        }
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        let record = state.record_mut(id)?;
        record.attempts += 1;
        record.last_error = Some(error.to_owned());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<OutboxRecord>, DomainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .outbox
            .iter()
            .find(|record| record.id == id)
            .cloned())
    }

    async fn find_by_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Vec<OutboxRecord>, DomainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .outbox
            .iter()
            .filter(|r| r.aggregate_type == aggregate_type && r.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }

    async fn backlog(&self, attempt_limit: i32) -> Result<OutboxBacklog, DomainError> {
        let state = self.state.lock().unwrap();
        let pending: Vec<&OutboxRecord> = state.outbox.iter().filter(|r| !r.published).collect();
        let parked = pending.iter().filter(|r| r.attempts >= attempt_limit).count();
        Ok(OutboxBacklog {
            unpublished: i64::try_from(pending.len()).unwrap_or(i64::MAX),
            oldest_unpublished_at: pending.iter().map(|r| r.created_at).min(),
            max_attempts: pending.iter().map(|r| r.attempts).max().unwrap_or(0),
            parked: i64::try_from(parked).unwrap_or(i64::MAX),
        })
    }

    async fn find_published_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, DomainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .outbox
            .iter()
            .filter(|r| r.published && r.published_at.is_some_and(|at| at < cutoff))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_published_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut state = self.state.lock().unwrap();
        let before = state.outbox.len();
        state
            .outbox
            .retain(|r| !(r.published && r.published_at.is_some_and(|at| at < cutoff)));
        Ok(u64::try_from(before - state.outbox.len()).unwrap_or(u64::MAX))
    }
}
