//! Aggregate root and state-machine abstractions.
//!
//! Legal status changes are declared as data in a [`TransitionTable`] and
//! checked by the provided methods on [`AggregateRoot`], so a context adds
//! states or edges by editing its table, never the check logic.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DomainError;
use crate::event::DomainEvent;

/// Declarative mapping from a status to the statuses reachable from it by one
/// legal operation. A status with no outgoing edges is terminal.
#[derive(Debug, Clone, Copy)]
pub struct TransitionTable<S: 'static> {
    edges: &'static [(S, &'static [S])],
}

impl<S: Copy + PartialEq + 'static> TransitionTable<S> {
    /// Creates a table from `(from, allowed targets)` rows.
    #[must_use]
    pub const fn new(edges: &'static [(S, &'static [S])]) -> Self {
        Self { edges }
    }

    /// Returns the statuses reachable from `from`. Unlisted statuses have none.
    #[must_use]
    pub fn allowed_targets(&self, from: S) -> &'static [S] {
        self.edges
            .iter()
            .find(|(status, _)| *status == from)
            .map_or(&[], |(_, targets)| *targets)
    }

    /// Returns `true` if `from -> to` is a declared edge.
    #[must_use]
    pub fn can_transition(&self, from: S, to: S) -> bool {
        self.allowed_targets(from).contains(&to)
    }

    /// Returns `true` if no edge leaves `status`.
    #[must_use]
    pub fn is_terminal(&self, status: S) -> bool {
        self.allowed_targets(status).is_empty()
    }
}

/// A fixed status enumeration with its declared transition table.
pub trait Status: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// The declared edges for this enumeration.
    const TRANSITIONS: TransitionTable<Self>;

    /// Wire/storage name of the status (e.g. `in_progress`).
    fn as_str(&self) -> &'static str;

    /// Returns `true` if the status rejects all further mutating operations.
    fn is_terminal(self) -> bool {
        Self::TRANSITIONS.is_terminal(self)
    }
}

/// Single-owner buffer of events produced by command handling and not yet
/// flushed to the outbox.
#[derive(Debug, Clone)]
pub struct PendingEvents<E> {
    events: Vec<E>,
}

impl<E> Default for PendingEvents<E> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<E> PendingEvents<E> {
    /// Appends an event.
    pub fn push(&mut self, event: E) {
        self.events.push(event);
    }

    /// Borrows the buffered events in emission order.
    #[must_use]
    pub fn as_slice(&self) -> &[E] {
        &self.events
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns every buffered event and leaves the buffer empty.
    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.events)
    }
}

/// Trait for aggregate roots persisted as a state document plus outbox
/// records.
///
/// The aggregate's serialized form is its state document; the version and
/// the pending-event buffer are not part of it.
pub trait AggregateRoot: Serialize + DeserializeOwned + Send + Sync {
    /// The status enumeration driving this aggregate's state machine.
    type Status: Status;

    /// The event type this aggregate produces.
    type Event: DomainEvent;

    /// Entity kind used in storage rows and envelope source paths
    /// (e.g. `putaway-task`).
    const AGGREGATE_TYPE: &'static str;

    /// Returns the business key.
    fn aggregate_id(&self) -> &str;

    /// Returns the current status.
    fn status(&self) -> Self::Status;

    /// Returns the persisted version (0 before the first save).
    fn version(&self) -> i64;

    /// Sets the persisted version after a load or a committed save.
    fn set_version(&mut self, version: i64);

    /// Returns when the aggregate was last mutated.
    fn updated_at(&self) -> DateTime<Utc>;

    /// Borrows the events not yet flushed to the outbox.
    fn pending_events(&self) -> &[Self::Event];

    /// Returns the pending events and clears them.
    fn drain_events(&mut self) -> Vec<Self::Event>;

    /// Envelope source path: `<entity-kind>/<entity-id>`.
    fn source_path(&self) -> String {
        format!("{}/{}", Self::AGGREGATE_TYPE, self.aggregate_id())
    }

    /// Serializes the state document.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if serialization fails.
    fn to_state(&self) -> Result<serde_json::Value, DomainError> {
        serde_json::to_value(self).map_err(|e| {
            DomainError::Persistence(format!(
                "{} state serialization failed: {e}",
                Self::AGGREGATE_TYPE
            ))
        })
    }

    /// Rehydrates an aggregate from its state document.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the document does not match the
    /// aggregate's shape.
    fn from_state(state: serde_json::Value, version: i64) -> Result<Self, DomainError> {
        let mut aggregate: Self = serde_json::from_value(state).map_err(|e| {
            DomainError::Persistence(format!(
                "{} state deserialization failed: {e}",
                Self::AGGREGATE_TYPE
            ))
        })?;
        aggregate.set_version(version);
        Ok(aggregate)
    }

    /// Checks that `target` is reachable from the current status.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if the edge is not declared.
    fn ensure_transition(&self, target: Self::Status, operation: &str) -> Result<(), DomainError> {
        let from = self.status();
        if <Self::Status as Status>::TRANSITIONS.can_transition(from, target) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                aggregate_type: Self::AGGREGATE_TYPE,
                from: from.as_str().to_owned(),
                operation: operation.to_owned(),
            })
        }
    }

    /// Checks that a status-preserving operation is legal in the current
    /// status. Terminal statuses always fail.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if the current status is not
    /// in `allowed` or is terminal.
    fn ensure_status_in(
        &self,
        allowed: &[Self::Status],
        operation: &str,
    ) -> Result<(), DomainError> {
        let current = self.status();
        if allowed.contains(&current) && !current.is_terminal() {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                aggregate_type: Self::AGGREGATE_TYPE,
                from: current.as_str().to_owned(),
                operation: operation.to_owned(),
            })
        }
    }
}
