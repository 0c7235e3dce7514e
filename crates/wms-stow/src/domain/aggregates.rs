//! Aggregate roots for the Stow context.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wms_core::aggregate::{AggregateRoot, PendingEvents, Status, TransitionTable};
use wms_core::clock::Clock;
use wms_core::error::DomainError;

use super::events::{
    ItemStowed, LocationAssigned, StowEvent, StowEventKind, TaskAssigned, TaskCancelled,
    TaskCompleted, TaskCreated, TaskFailed, TaskRetried, TaskStarted, TaskUnassigned,
};

/// Lifecycle status of a putaway task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PutawayStatus {
    /// Created, waiting for a worker.
    Pending,
    /// Held by a worker, not yet started.
    Assigned,
    /// Units are being stowed.
    InProgress,
    /// Every unit was stowed or the worker closed the task.
    Completed,
    /// Stowing stopped on an error; may be retried.
    Failed,
    /// Abandoned.
    Cancelled,
}

impl Status for PutawayStatus {
    const TRANSITIONS: TransitionTable<Self> = TransitionTable::new(&[
        (
            Self::Pending,
            &[Self::Assigned, Self::Failed, Self::Cancelled],
        ),
        (
            Self::Assigned,
            &[Self::InProgress, Self::Pending, Self::Failed, Self::Cancelled],
        ),
        (
            Self::InProgress,
            &[Self::Completed, Self::Failed, Self::Cancelled],
        ),
        (Self::Failed, &[Self::Pending, Self::Cancelled]),
        (Self::Completed, &[]),
        (Self::Cancelled, &[]),
    ]);

    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PutawayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the target location is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageStrategy {
    /// Any location with room.
    #[default]
    Chaotic,
    /// System-assigned by rules.
    Directed,
    /// By pick frequency.
    Velocity,
    /// By product category zone.
    ZoneBased,
}

impl StorageStrategy {
    /// Wire name of the strategy.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chaotic => "chaotic",
            Self::Directed => "directed",
            Self::Velocity => "velocity",
            Self::ZoneBased => "zone_based",
        }
    }
}

/// A storage location offered for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageLocation {
    /// Location identifier.
    pub location_id: String,
    /// Zone the location belongs to.
    pub zone: String,
    /// Total unit capacity.
    pub capacity: u32,
    /// Units already stored.
    pub current_quantity: u32,
}

impl StorageLocation {
    /// Units the location can still take.
    #[must_use]
    pub fn available_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.current_quantity)
    }
}

/// Input for [`PutawayTask::create`].
#[derive(Debug, Clone)]
pub struct NewPutawayTask {
    /// Business key.
    pub task_id: String,
    /// Originating inbound shipment, if any.
    pub shipment_id: Option<String>,
    /// Stock keeping unit.
    pub sku: String,
    /// Product display name.
    pub product_name: String,
    /// Units to stow.
    pub quantity: u32,
    /// Tote the units arrive in.
    pub source_tote_id: String,
    /// Location strategy.
    pub strategy: StorageStrategy,
    /// 1 (highest) to 5 (lowest).
    pub priority: u8,
}

/// A task to move received units from a tote into storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutawayTask {
    pub(crate) task_id: String,
    pub(crate) shipment_id: Option<String>,
    pub(crate) sku: String,
    pub(crate) product_name: String,
    pub(crate) quantity: u32,
    pub(crate) source_tote_id: String,
    pub(crate) target_location: Option<StorageLocation>,
    pub(crate) strategy: StorageStrategy,
    pub(crate) status: PutawayStatus,
    pub(crate) assigned_worker_id: Option<String>,
    pub(crate) priority: u8,
    pub(crate) stowed_quantity: u32,
    pub(crate) failure_reason: Option<String>,
    pub(crate) assigned_at: Option<DateTime<Utc>>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    /// Persisted version; not part of the state document.
    #[serde(skip)]
    pub(crate) version: i64,
    /// Events not yet written to the outbox.
    #[serde(skip)]
    pending_events: PendingEvents<StowEvent>,
}

fn require(value: &str, field: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

impl PutawayTask {
    /// Creates a pending task, producing a `TaskCreated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the identifiers are blank, the
    /// quantity is zero, or the priority is outside 1..=5.
    pub fn create(input: NewPutawayTask, clock: &dyn Clock) -> Result<Self, DomainError> {
        require(&input.task_id, "task id")?;
        require(&input.sku, "sku")?;
        require(&input.source_tote_id, "source tote id")?;
        if input.quantity == 0 {
            return Err(DomainError::Validation(
                "quantity must be greater than zero".into(),
            ));
        }
        if !(1..=5).contains(&input.priority) {
            return Err(DomainError::Validation(format!(
                "priority {} is outside 1..=5",
                input.priority
            )));
        }

        let now = clock.now();
        let mut task = Self {
            task_id: input.task_id,
            shipment_id: input.shipment_id,
            sku: input.sku,
            product_name: input.product_name,
            quantity: input.quantity,
            source_tote_id: input.source_tote_id,
            target_location: None,
            strategy: input.strategy,
            status: PutawayStatus::Pending,
            assigned_worker_id: None,
            priority: input.priority,
            stowed_quantity: 0,
            failure_reason: None,
            assigned_at: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
            pending_events: PendingEvents::default(),
        };
        task.record(
            now,
            StowEventKind::TaskCreated(TaskCreated {
                task_id: task.task_id.clone(),
                shipment_id: task.shipment_id.clone(),
                sku: task.sku.clone(),
                quantity: task.quantity,
                source_tote_id: task.source_tote_id.clone(),
                strategy: task.strategy.as_str().to_owned(),
                created_at: now,
            }),
        );
        Ok(task)
    }

    /// Business key.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Units still to stow.
    #[must_use]
    pub fn remaining_quantity(&self) -> u32 {
        self.quantity.saturating_sub(self.stowed_quantity)
    }

    /// Units stowed so far.
    #[must_use]
    pub fn stowed_quantity(&self) -> u32 {
        self.stowed_quantity
    }

    fn record(&mut self, at: DateTime<Utc>, kind: StowEventKind) {
        self.updated_at = at;
        self.pending_events.push(StowEvent {
            occurred_at: at,
            kind,
        });
    }

    fn location_id(&self) -> String {
        self.target_location
            .as_ref()
            .map(|l| l.location_id.clone())
            .unwrap_or_default()
    }

    /// Assigns the task to a worker, producing a `TaskAssigned` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the task is pending,
    /// or `DomainError::Validation` for a blank worker id.
    pub fn assign(&mut self, worker_id: &str, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_transition(PutawayStatus::Assigned, "assign")?;
        require(worker_id, "worker id")?;

        let now = clock.now();
        self.status = PutawayStatus::Assigned;
        self.assigned_worker_id = Some(worker_id.to_owned());
        self.assigned_at = Some(now);
        self.record(
            now,
            StowEventKind::TaskAssigned(TaskAssigned {
                task_id: self.task_id.clone(),
                worker_id: worker_id.to_owned(),
                assigned_at: now,
            }),
        );
        Ok(())
    }

    /// Releases the worker and returns the task to pending, producing a
    /// `TaskUnassigned` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the task is assigned.
    pub fn unassign(&mut self, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_status_in(&[PutawayStatus::Assigned], "unassign")?;
        self.ensure_transition(PutawayStatus::Pending, "unassign")?;

        let now = clock.now();
        let previous_worker_id = self.assigned_worker_id.take().unwrap_or_default();
        self.status = PutawayStatus::Pending;
        self.assigned_at = None;
        self.record(
            now,
            StowEventKind::TaskUnassigned(TaskUnassigned {
                task_id: self.task_id.clone(),
                previous_worker_id,
                unassigned_at: now,
            }),
        );
        Ok(())
    }

    /// Chooses the target location, producing a `LocationAssigned` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the task is pending or
    /// assigned, or `DomainError::Validation` if the location cannot take the
    /// remaining quantity.
    pub fn assign_location(
        &mut self,
        location: StorageLocation,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_status_in(
            &[PutawayStatus::Pending, PutawayStatus::Assigned],
            "assign location",
        )?;
        require(&location.location_id, "location id")?;
        if location.available_capacity() < self.remaining_quantity() {
            return Err(DomainError::Validation(format!(
                "location {} has room for {} units, task needs {}",
                location.location_id,
                location.available_capacity(),
                self.remaining_quantity()
            )));
        }

        let now = clock.now();
        let event = LocationAssigned {
            task_id: self.task_id.clone(),
            sku: self.sku.clone(),
            location_id: location.location_id.clone(),
            zone: location.zone.clone(),
            strategy: self.strategy.as_str().to_owned(),
            assigned_at: now,
        };
        self.target_location = Some(location);
        self.record(now, StowEventKind::LocationAssigned(event));
        Ok(())
    }

    /// Begins stowing, producing a `TaskStarted` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the task is assigned,
    /// or `DomainError::Validation` if no target location has been chosen.
    pub fn start(&mut self, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_transition(PutawayStatus::InProgress, "start")?;
        if self.target_location.is_none() {
            return Err(DomainError::Validation(format!(
                "task {} has no target location",
                self.task_id
            )));
        }

        let now = clock.now();
        self.status = PutawayStatus::InProgress;
        self.started_at = Some(now);
        self.record(
            now,
            StowEventKind::TaskStarted(TaskStarted {
                task_id: self.task_id.clone(),
                worker_id: self.assigned_worker_id.clone(),
                location_id: self.location_id(),
                started_at: now,
            }),
        );
        Ok(())
    }

    /// Records stowed units, producing an `ItemStowed` event.
    ///
    /// The requested quantity is clamped to the remaining quantity. When the
    /// clamp exhausts it the task completes and a single `TaskCompleted`
    /// event follows. Returns the quantity actually recorded.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the task is in
    /// progress, or `DomainError::Validation` for a zero quantity.
    pub fn record_stow(&mut self, quantity: u32, clock: &dyn Clock) -> Result<u32, DomainError> {
        self.ensure_status_in(&[PutawayStatus::InProgress], "record stow")?;
        if quantity == 0 {
            return Err(DomainError::Validation(
                "stowed quantity must be greater than zero".into(),
            ));
        }

        let now = clock.now();
        let applied = quantity.min(self.remaining_quantity());
        self.stowed_quantity += applied;
        self.record(
            now,
            StowEventKind::ItemStowed(ItemStowed {
                task_id: self.task_id.clone(),
                sku: self.sku.clone(),
                quantity: applied,
                requested_quantity: quantity,
                stowed_quantity: self.stowed_quantity,
                location_id: self.location_id(),
                tote_id: self.source_tote_id.clone(),
                stowed_at: now,
            }),
        );

        if self.remaining_quantity() == 0 {
            self.finish(now);
        }
        Ok(applied)
    }

    /// Completes the task with whatever has been stowed, producing a
    /// `TaskCompleted` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the task is in progress.
    pub fn complete(&mut self, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_transition(PutawayStatus::Completed, "complete")?;
        self.finish(clock.now());
        Ok(())
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.status = PutawayStatus::Completed;
        self.completed_at = Some(now);
        self.record(
            now,
            StowEventKind::TaskCompleted(TaskCompleted {
                task_id: self.task_id.clone(),
                sku: self.sku.clone(),
                stowed_quantity: self.stowed_quantity,
                location_id: self.location_id(),
                completed_at: now,
            }),
        );
    }

    /// Marks the task failed, producing a `TaskFailed` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` once the task is completed,
    /// failed or cancelled, or `DomainError::Validation` for a blank reason.
    pub fn fail(&mut self, reason: &str, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_transition(PutawayStatus::Failed, "fail")?;
        require(reason, "failure reason")?;

        let now = clock.now();
        self.status = PutawayStatus::Failed;
        self.failure_reason = Some(reason.to_owned());
        self.record(
            now,
            StowEventKind::TaskFailed(TaskFailed {
                task_id: self.task_id.clone(),
                reason: reason.to_owned(),
                failed_at: now,
            }),
        );
        Ok(())
    }

    /// Cancels the task, producing a `TaskCancelled` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` from completed or cancelled.
    pub fn cancel(&mut self, reason: &str, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_transition(PutawayStatus::Cancelled, "cancel")?;

        let now = clock.now();
        self.status = PutawayStatus::Cancelled;
        self.failure_reason = Some(reason.to_owned());
        self.record(
            now,
            StowEventKind::TaskCancelled(TaskCancelled {
                task_id: self.task_id.clone(),
                reason: reason.to_owned(),
                cancelled_at: now,
            }),
        );
        Ok(())
    }

    /// Resets a failed task to pending with no progress, producing a
    /// `TaskRetried` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the task has failed.
    pub fn retry(&mut self, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_status_in(&[PutawayStatus::Failed], "retry")?;
        self.ensure_transition(PutawayStatus::Pending, "retry")?;

        let now = clock.now();
        let previous_failure = self.failure_reason.take();
        self.status = PutawayStatus::Pending;
        self.assigned_worker_id = None;
        self.assigned_at = None;
        self.started_at = None;
        self.stowed_quantity = 0;
        self.record(
            now,
            StowEventKind::TaskRetried(TaskRetried {
                task_id: self.task_id.clone(),
                previous_failure,
                retried_at: now,
            }),
        );
        Ok(())
    }
}

impl AggregateRoot for PutawayTask {
    type Status = PutawayStatus;
    type Event = StowEvent;
    const AGGREGATE_TYPE: &'static str = "putaway-task";

    fn aggregate_id(&self) -> &str {
        &self.task_id
    }

    fn status(&self) -> PutawayStatus {
        self.status
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn pending_events(&self) -> &[StowEvent] {
        self.pending_events.as_slice()
    }

    fn drain_events(&mut self) -> Vec<StowEvent> {
        self.pending_events.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wms_core::event::DomainEvent;
    use wms_test_support::FixedClock;

    use crate::domain::events::{
        ITEM_STOWED_EVENT_TYPE, LOCATION_ASSIGNED_EVENT_TYPE, TASK_COMPLETED_EVENT_TYPE,
        TASK_CREATED_EVENT_TYPE,
    };

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }

    fn new_task(quantity: u32) -> NewPutawayTask {
        NewPutawayTask {
            task_id: "T1".into(),
            shipment_id: Some("IN-42".into()),
            sku: "SKU-1".into(),
            product_name: "Widget".into(),
            quantity,
            source_tote_id: "TOTE-9".into(),
            strategy: StorageStrategy::Chaotic,
            priority: 3,
        }
    }

    fn location(capacity: u32) -> StorageLocation {
        StorageLocation {
            location_id: "A-01-03".into(),
            zone: "A".into(),
            capacity,
            current_quantity: 0,
        }
    }

    fn in_progress_task(quantity: u32) -> PutawayTask {
        let clock = clock();
        let mut task = PutawayTask::create(new_task(quantity), &clock).unwrap();
        task.assign("W7", &clock).unwrap();
        task.assign_location(location(100), &clock).unwrap();
        task.start(&clock).unwrap();
        task.drain_events();
        task
    }

    fn event_types(task: &PutawayTask) -> Vec<&'static str> {
        task.pending_events()
            .iter()
            .map(DomainEvent::event_type)
            .collect()
    }

    #[test]
    fn test_create_produces_pending_task_with_created_event() {
        // Arrange
        let clock = clock();

        // Act
        let task = PutawayTask::create(new_task(10), &clock).unwrap();

        // Assert
        assert_eq!(task.status(), PutawayStatus::Pending);
        assert_eq!(task.version(), 0);
        assert_eq!(event_types(&task), vec![TASK_CREATED_EVENT_TYPE]);
        match &task.pending_events()[0].kind {
            StowEventKind::TaskCreated(payload) => {
                assert_eq!(payload.task_id, "T1");
                assert_eq!(payload.quantity, 10);
                assert_eq!(payload.strategy, "chaotic");
                assert_eq!(payload.created_at, clock.0);
            }
            other => panic!("expected TaskCreated, got {other:?}"),
        }
    }

    #[test]
    fn test_create_rejects_zero_quantity() {
        let result = PutawayTask::create(new_task(0), &clock());

        match result.unwrap_err() {
            DomainError::Validation(msg) => assert!(msg.contains("quantity")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_assign_from_in_progress_is_invalid_and_leaves_task_unchanged() {
        // Arrange
        let mut task = in_progress_task(10);

        // Act
        let result = task.assign("W8", &clock());

        // Assert
        match result.unwrap_err() {
            DomainError::InvalidTransition { from, operation, .. } => {
                assert_eq!(from, "in_progress");
                assert_eq!(operation, "assign");
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
        assert_eq!(task.status(), PutawayStatus::InProgress);
        assert_eq!(task.assigned_worker_id.as_deref(), Some("W7"));
        assert!(task.pending_events().is_empty());
    }

    #[test]
    fn test_unassign_returns_task_to_pending() {
        let clock = clock();
        let mut task = PutawayTask::create(new_task(10), &clock).unwrap();
        task.assign("W7", &clock).unwrap();

        task.unassign(&clock).unwrap();

        assert_eq!(task.status(), PutawayStatus::Pending);
        assert!(task.assigned_worker_id.is_none());
    }

    #[test]
    fn test_unassign_from_failed_is_invalid() {
        let clock = clock();
        let mut task = in_progress_task(10);
        task.fail("damaged tote", &clock).unwrap();

        let result = task.unassign(&clock);

        assert!(matches!(
            result,
            Err(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(task.status(), PutawayStatus::Failed);
    }

    #[test]
    fn test_assign_location_rejects_location_without_room() {
        let clock = clock();
        let mut task = PutawayTask::create(new_task(10), &clock).unwrap();

        let result = task.assign_location(location(4), &clock);

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert!(task.target_location.is_none());
        assert_eq!(event_types(&task), vec![TASK_CREATED_EVENT_TYPE]);
    }

    #[test]
    fn test_assign_location_emits_location_assigned() {
        let clock = clock();
        let mut task = PutawayTask::create(new_task(10), &clock).unwrap();

        task.assign_location(location(50), &clock).unwrap();

        assert_eq!(
            event_types(&task),
            vec![TASK_CREATED_EVENT_TYPE, LOCATION_ASSIGNED_EVENT_TYPE]
        );
        assert_eq!(task.status(), PutawayStatus::Pending);
    }

    #[test]
    fn test_start_without_location_is_rejected() {
        let clock = clock();
        let mut task = PutawayTask::create(new_task(10), &clock).unwrap();
        task.assign("W7", &clock).unwrap();

        let result = task.start(&clock);

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(task.status(), PutawayStatus::Assigned);
    }

    #[test]
    fn test_record_stow_accumulates_partial_progress() {
        let clock = clock();
        let mut task = in_progress_task(10);

        let applied = task.record_stow(4, &clock).unwrap();

        assert_eq!(applied, 4);
        assert_eq!(task.stowed_quantity(), 4);
        assert_eq!(task.remaining_quantity(), 6);
        assert_eq!(task.status(), PutawayStatus::InProgress);
        assert_eq!(event_types(&task), vec![ITEM_STOWED_EVENT_TYPE]);
    }

    #[test]
    fn test_record_stow_clamps_overflow_and_auto_completes() {
        // Arrange
        let clock = clock();
        let mut task = in_progress_task(10);
        task.record_stow(7, &clock).unwrap();
        task.drain_events();

        // Act
        let applied = task.record_stow(10, &clock).unwrap();

        // Assert
        assert_eq!(applied, 3);
        assert_eq!(task.stowed_quantity(), 10);
        assert_eq!(task.status(), PutawayStatus::Completed);
        assert_eq!(
            event_types(&task),
            vec![ITEM_STOWED_EVENT_TYPE, TASK_COMPLETED_EVENT_TYPE]
        );
        match &task.pending_events()[0].kind {
            StowEventKind::ItemStowed(payload) => {
                assert_eq!(payload.quantity, 3);
                assert_eq!(payload.requested_quantity, 10);
            }
            other => panic!("expected ItemStowed, got {other:?}"),
        }
    }

    #[test]
    fn test_record_stow_rejects_zero() {
        let mut task = in_progress_task(10);

        let result = task.record_stow(0, &clock());

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(task.stowed_quantity(), 0);
    }

    #[test]
    fn test_completed_task_rejects_every_mutation() {
        // Arrange
        let clock = clock();
        let mut task = in_progress_task(5);
        task.record_stow(5, &clock).unwrap();
        task.drain_events();

        // Act
        let results = [
            task.assign("W8", &clock),
            task.unassign(&clock),
            task.assign_location(location(100), &clock),
            task.start(&clock),
            task.record_stow(1, &clock).map(|_| ()),
            task.complete(&clock),
            task.fail("late", &clock),
            task.cancel("late", &clock),
            task.retry(&clock),
        ];

        // Assert
        for result in results {
            assert!(matches!(
                result,
                Err(DomainError::InvalidTransition { .. })
            ));
        }
        assert_eq!(task.status(), PutawayStatus::Completed);
        assert!(task.pending_events().is_empty());
    }

    #[test]
    fn test_retry_resets_progress() {
        let clock = clock();
        let mut task = in_progress_task(10);
        task.record_stow(4, &clock).unwrap();
        task.fail("scanner offline", &clock).unwrap();

        task.retry(&clock).unwrap();

        assert_eq!(task.status(), PutawayStatus::Pending);
        assert_eq!(task.stowed_quantity(), 0);
        assert!(task.assigned_worker_id.is_none());
        assert!(task.failure_reason.is_none());
        assert!(task.target_location.is_some());
    }

    #[test]
    fn test_state_document_round_trips_without_version_or_events() {
        let task = in_progress_task(10);

        let state = task.to_state().unwrap();
        let restored = PutawayTask::from_state(state.clone(), 3).unwrap();

        assert_eq!(state["status"], "in_progress");
        assert_eq!(state["taskId"], "T1");
        assert!(state.get("version").is_none());
        assert_eq!(restored.version(), 3);
        assert_eq!(restored.status(), PutawayStatus::InProgress);
        assert!(restored.pending_events().is_empty());
    }

    #[test]
    fn test_terminal_task_reports_transition_before_input_validation() {
        // Arrange
        let clock = clock();
        let mut task = PutawayTask::create(new_task(5), &clock).unwrap();
        task.cancel("duplicate receipt", &clock).unwrap();
        task.drain_events();

        // Act
        let results = [
            task.assign(" ", &clock),
            task.record_stow(0, &clock).map(|_| ()),
            task.fail("", &clock),
        ];

        // Assert
        for result in results {
            match result.unwrap_err() {
                DomainError::InvalidTransition { from, .. } => assert_eq!(from, "cancelled"),
                other => panic!("expected InvalidTransition, got {other:?}"),
            }
        }
        assert!(task.pending_events().is_empty());
    }

    #[test]
    fn test_task_can_fail_before_work_starts() {
        let clock = clock();
        let mut pending = PutawayTask::create(new_task(5), &clock).unwrap();
        let mut assigned = PutawayTask::create(new_task(5), &clock).unwrap();
        assigned.assign("W7", &clock).unwrap();

        pending.fail("sku not found", &clock).unwrap();
        assigned.fail("worker called off", &clock).unwrap();

        assert_eq!(pending.status(), PutawayStatus::Failed);
        assert_eq!(assigned.status(), PutawayStatus::Failed);
        assert_eq!(
            assigned.pending_events().last().map(DomainEvent::event_type),
            Some("stow.task.failed")
        );
    }

    #[test]
    fn test_failed_task_can_be_cancelled_but_not_failed_again() {
        // Arrange
        let clock = clock();
        let mut task = in_progress_task(5);
        task.fail("damaged tote", &clock).unwrap();

        // Act
        let refail = task.fail("still damaged", &clock);
        task.cancel("written off", &clock).unwrap();

        // Assert
        assert!(matches!(
            refail,
            Err(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(task.status(), PutawayStatus::Cancelled);
        assert_eq!(task.failure_reason.as_deref(), Some("written off"));
    }
}
