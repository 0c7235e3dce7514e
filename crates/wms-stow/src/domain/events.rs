//! Domain events for the Stow context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wms_core::envelope::EnvelopeRegistry;
use wms_core::error::DomainError;
use wms_core::event::DomainEvent;

/// Event type for `TaskCreated`.
pub const TASK_CREATED_EVENT_TYPE: &str = "stow.task.created";
/// Event type for `TaskAssigned`.
pub const TASK_ASSIGNED_EVENT_TYPE: &str = "stow.task.assigned";
/// Event type for `TaskUnassigned`.
pub const TASK_UNASSIGNED_EVENT_TYPE: &str = "stow.task.unassigned";
/// Event type for `LocationAssigned`.
pub const LOCATION_ASSIGNED_EVENT_TYPE: &str = "stow.location.assigned";
/// Event type for `TaskStarted`.
pub const TASK_STARTED_EVENT_TYPE: &str = "stow.task.started";
/// Event type for `ItemStowed`.
pub const ITEM_STOWED_EVENT_TYPE: &str = "stow.item.stowed";
/// Event type for `TaskCompleted`.
pub const TASK_COMPLETED_EVENT_TYPE: &str = "stow.task.completed";
/// Event type for `TaskFailed`.
pub const TASK_FAILED_EVENT_TYPE: &str = "stow.task.failed";
/// Event type for `TaskCancelled`.
pub const TASK_CANCELLED_EVENT_TYPE: &str = "stow.task.cancelled";
/// Event type for `TaskRetried`.
pub const TASK_RETRIED_EVENT_TYPE: &str = "stow.task.retried";

/// Stream every Stow event is delivered to.
pub const STOW_EVENTS_DESTINATION: &str = "wms.stow.events";

const EVENT_TYPES: [&str; 10] = [
    TASK_CREATED_EVENT_TYPE,
    TASK_ASSIGNED_EVENT_TYPE,
    TASK_UNASSIGNED_EVENT_TYPE,
    LOCATION_ASSIGNED_EVENT_TYPE,
    TASK_STARTED_EVENT_TYPE,
    ITEM_STOWED_EVENT_TYPE,
    TASK_COMPLETED_EVENT_TYPE,
    TASK_FAILED_EVENT_TYPE,
    TASK_CANCELLED_EVENT_TYPE,
    TASK_RETRIED_EVENT_TYPE,
];

/// Registers every Stow event type under [`STOW_EVENTS_DESTINATION`].
///
/// # Errors
///
/// Returns `DomainError::Validation` if any type is already registered.
pub fn register_routes(registry: &mut EnvelopeRegistry) -> Result<(), DomainError> {
    for event_type in EVENT_TYPES {
        registry.register(event_type, STOW_EVENTS_DESTINATION)?;
    }
    Ok(())
}

/// Emitted when a putaway task is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreated {
    /// The task identifier.
    pub task_id: String,
    /// Originating inbound shipment, if any.
    pub shipment_id: Option<String>,
    /// Stock keeping unit being stowed.
    pub sku: String,
    /// Units to stow.
    pub quantity: u32,
    /// Tote the units arrive in.
    pub source_tote_id: String,
    /// Storage strategy name.
    pub strategy: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Emitted when a worker takes a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssigned {
    /// The task identifier.
    pub task_id: String,
    /// The assigned worker.
    pub worker_id: String,
    /// Assignment time.
    pub assigned_at: DateTime<Utc>,
}

/// Emitted when a worker releases a task before starting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUnassigned {
    /// The task identifier.
    pub task_id: String,
    /// The worker that held the task.
    pub previous_worker_id: String,
    /// Release time.
    pub unassigned_at: DateTime<Utc>,
}

/// Emitted when a target storage location is chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationAssigned {
    /// The task identifier.
    pub task_id: String,
    /// Stock keeping unit being stowed.
    pub sku: String,
    /// Chosen location.
    pub location_id: String,
    /// Zone of the chosen location.
    pub zone: String,
    /// Storage strategy name.
    pub strategy: String,
    /// Assignment time.
    pub assigned_at: DateTime<Utc>,
}

/// Emitted when stowing begins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStarted {
    /// The task identifier.
    pub task_id: String,
    /// Worker performing the stow.
    pub worker_id: Option<String>,
    /// Target location.
    pub location_id: String,
    /// Start time.
    pub started_at: DateTime<Utc>,
}

/// Emitted for each recorded batch of stowed units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStowed {
    /// The task identifier.
    pub task_id: String,
    /// Stock keeping unit stowed.
    pub sku: String,
    /// Units actually recorded, after clamping to the remaining quantity.
    pub quantity: u32,
    /// Units the caller asked to record.
    pub requested_quantity: u32,
    /// Running total stowed on the task.
    pub stowed_quantity: u32,
    /// Location the units went to.
    pub location_id: String,
    /// Tote the units came from.
    pub tote_id: String,
    /// Recording time.
    pub stowed_at: DateTime<Utc>,
}

/// Emitted when a task completes, explicitly or by stowing its full quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompleted {
    /// The task identifier.
    pub task_id: String,
    /// Stock keeping unit stowed.
    pub sku: String,
    /// Units stowed in total.
    pub stowed_quantity: u32,
    /// Location the units went to.
    pub location_id: String,
    /// Completion time.
    pub completed_at: DateTime<Utc>,
}

/// Emitted when a task fails during stowing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFailed {
    /// The task identifier.
    pub task_id: String,
    /// Why the task failed.
    pub reason: String,
    /// Failure time.
    pub failed_at: DateTime<Utc>,
}

/// Emitted when a task is cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCancelled {
    /// The task identifier.
    pub task_id: String,
    /// Why the task was cancelled.
    pub reason: String,
    /// Cancellation time.
    pub cancelled_at: DateTime<Utc>,
}

/// Emitted when a failed task is reset to pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRetried {
    /// The task identifier.
    pub task_id: String,
    /// The failure being retried.
    pub previous_failure: Option<String>,
    /// Retry time.
    pub retried_at: DateTime<Utc>,
}

/// Event payload variants for the Stow context.
///
/// Serialized untagged, so the payload on the wire is the inner struct.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StowEventKind {
    /// A task has been created.
    TaskCreated(TaskCreated),
    /// A task has been assigned to a worker.
    TaskAssigned(TaskAssigned),
    /// A task has been released by its worker.
    TaskUnassigned(TaskUnassigned),
    /// A target location has been chosen.
    LocationAssigned(LocationAssigned),
    /// Stowing has begun.
    TaskStarted(TaskStarted),
    /// Units have been stowed.
    ItemStowed(ItemStowed),
    /// The task has completed.
    TaskCompleted(TaskCompleted),
    /// The task has failed.
    TaskFailed(TaskFailed),
    /// The task has been cancelled.
    TaskCancelled(TaskCancelled),
    /// The task has been reset for another attempt.
    TaskRetried(TaskRetried),
}

/// Domain event for the Stow context.
#[derive(Debug, Clone)]
pub struct StowEvent {
    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
    /// Event-specific payload.
    pub kind: StowEventKind,
}

impl DomainEvent for StowEvent {
    fn event_type(&self) -> &'static str {
        match &self.kind {
            StowEventKind::TaskCreated(_) => TASK_CREATED_EVENT_TYPE,
            StowEventKind::TaskAssigned(_) => TASK_ASSIGNED_EVENT_TYPE,
            StowEventKind::TaskUnassigned(_) => TASK_UNASSIGNED_EVENT_TYPE,
            StowEventKind::LocationAssigned(_) => LOCATION_ASSIGNED_EVENT_TYPE,
            StowEventKind::TaskStarted(_) => TASK_STARTED_EVENT_TYPE,
            StowEventKind::ItemStowed(_) => ITEM_STOWED_EVENT_TYPE,
            StowEventKind::TaskCompleted(_) => TASK_COMPLETED_EVENT_TYPE,
            StowEventKind::TaskFailed(_) => TASK_FAILED_EVENT_TYPE,
            StowEventKind::TaskCancelled(_) => TASK_CANCELLED_EVENT_TYPE,
            StowEventKind::TaskRetried(_) => TASK_RETRIED_EVENT_TYPE,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("StowEventKind serialization is infallible")
    }
}
