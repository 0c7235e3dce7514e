//! Query handlers for the Stow context.

use chrono::{DateTime, Utc};
use serde::Serialize;
use wms_core::aggregate::AggregateRoot;
use wms_core::error::DomainError;
use wms_outbox::TransactionalWriter;

use crate::domain::aggregates::{PutawayStatus, PutawayTask, StorageLocation};

/// Read-only view of a putaway task.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutawayTaskView {
    /// The task identifier.
    pub task_id: String,
    /// Current status.
    pub status: PutawayStatus,
    /// Stock keeping unit.
    pub sku: String,
    /// Units to stow.
    pub quantity: u32,
    /// Units stowed so far.
    pub stowed_quantity: u32,
    /// Units still to stow.
    pub remaining_quantity: u32,
    /// Target location, once chosen.
    pub target_location: Option<StorageLocation>,
    /// Assigned worker, if any.
    pub assigned_worker_id: Option<String>,
    /// Failure or cancellation reason.
    pub failure_reason: Option<String>,
    /// Persisted version.
    pub version: i64,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl From<&PutawayTask> for PutawayTaskView {
    fn from(task: &PutawayTask) -> Self {
        Self {
            task_id: task.task_id.clone(),
            status: task.status,
            sku: task.sku.clone(),
            quantity: task.quantity,
            stowed_quantity: task.stowed_quantity,
            remaining_quantity: task.remaining_quantity(),
            target_location: task.target_location.clone(),
            assigned_worker_id: task.assigned_worker_id.clone(),
            failure_reason: task.failure_reason.clone(),
            version: task.version(),
            updated_at: task.updated_at,
        }
    }
}

/// Retrieves a putaway task by its business key.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the task does not exist, or
/// `DomainError::Persistence` if the read fails.
pub async fn get_putaway_task(
    task_id: &str,
    writer: &TransactionalWriter,
) -> Result<PutawayTaskView, DomainError> {
    let task: PutawayTask = writer.load(task_id).await?;
    Ok(PutawayTaskView::from(&task))
}
