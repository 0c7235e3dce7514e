//! Commands for the Stow context.

use uuid::Uuid;
use wms_core::command::Command;

use super::aggregates::{StorageLocation, StorageStrategy};

/// Command to create a putaway task.
#[derive(Debug, Clone)]
pub struct CreatePutawayTask {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The task identifier.
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

impl Command for CreatePutawayTask {
    fn command_type(&self) -> &'static str {
        "stow.create_task"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to assign a task to a worker.
#[derive(Debug, Clone)]
pub struct AssignPutawayTask {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The task identifier.
    pub task_id: String,
    /// The worker taking the task.
    pub worker_id: String,
}

impl Command for AssignPutawayTask {
    fn command_type(&self) -> &'static str {
        "stow.assign_task"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to release a task back to pending.
#[derive(Debug, Clone)]
pub struct UnassignPutawayTask {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The task identifier.
    pub task_id: String,
}

impl Command for UnassignPutawayTask {
    fn command_type(&self) -> &'static str {
        "stow.unassign_task"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to choose a task's target storage location.
#[derive(Debug, Clone)]
pub struct AssignStorageLocation {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The task identifier.
    pub task_id: String,
    /// The chosen location.
    pub location: StorageLocation,
}

impl Command for AssignStorageLocation {
    fn command_type(&self) -> &'static str {
        "stow.assign_location"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to begin stowing.
#[derive(Debug, Clone)]
pub struct StartPutawayTask {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The task identifier.
    pub task_id: String,
}

impl Command for StartPutawayTask {
    fn command_type(&self) -> &'static str {
        "stow.start_task"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to record stowed units.
#[derive(Debug, Clone)]
pub struct RecordStow {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The task identifier.
    pub task_id: String,
    /// Units the worker reports as stowed.
    pub quantity: u32,
}

impl Command for RecordStow {
    fn command_type(&self) -> &'static str {
        "stow.record_stow"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to complete a task with its current progress.
#[derive(Debug, Clone)]
pub struct CompletePutawayTask {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The task identifier.
    pub task_id: String,
}

impl Command for CompletePutawayTask {
    fn command_type(&self) -> &'static str {
        "stow.complete_task"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to fail a task.
#[derive(Debug, Clone)]
pub struct FailPutawayTask {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The task identifier.
    pub task_id: String,
    /// Why the task failed.
    pub reason: String,
}

impl Command for FailPutawayTask {
    fn command_type(&self) -> &'static str {
        "stow.fail_task"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to cancel a task.
#[derive(Debug, Clone)]
pub struct CancelPutawayTask {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The task identifier.
    pub task_id: String,
    /// Why the task was cancelled.
    pub reason: String,
}

impl Command for CancelPutawayTask {
    fn command_type(&self) -> &'static str {
        "stow.cancel_task"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to reset a failed task.
#[derive(Debug, Clone)]
pub struct RetryPutawayTask {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The task identifier.
    pub task_id: String,
}

impl Command for RetryPutawayTask {
    fn command_type(&self) -> &'static str {
        "stow.retry_task"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
