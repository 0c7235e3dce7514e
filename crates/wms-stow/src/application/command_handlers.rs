//! Command handlers for the Stow context.
//!
//! Each handler loads the task, runs one domain operation, and saves the
//! new state together with the produced events in a single transaction.

use tracing::debug;
use uuid::Uuid;
use wms_core::aggregate::AggregateRoot;
use wms_core::clock::Clock;
use wms_core::command::Command;
use wms_core::envelope::CorrelationContext;
use wms_core::error::DomainError;
use wms_outbox::TransactionalWriter;

use crate::domain::aggregates::{NewPutawayTask, PutawayStatus, PutawayTask};
use crate::domain::commands::{
    AssignPutawayTask, AssignStorageLocation, CancelPutawayTask, CompletePutawayTask,
    CreatePutawayTask, FailPutawayTask, RecordStow, RetryPutawayTask, StartPutawayTask,
    UnassignPutawayTask,
};

/// Result of a successfully handled command.
#[derive(Debug, Clone)]
pub struct StowCommandResult {
    /// The task affected by the command.
    pub task_id: String,
    /// Status after the command.
    pub status: PutawayStatus,
    /// Version after the save.
    pub version: i64,
    /// Ids of the outbox records written, in emission order.
    pub event_ids: Vec<Uuid>,
    /// Units recorded by a `RecordStow` command after clamping.
    pub applied_quantity: Option<u32>,
}

async fn save(
    mut task: PutawayTask,
    ctx: &CorrelationContext,
    writer: &TransactionalWriter,
) -> Result<StowCommandResult, DomainError> {
    let outcome = writer.save(&mut task, ctx).await?;
    Ok(StowCommandResult {
        task_id: task.task_id().to_owned(),
        status: task.status(),
        version: outcome.version,
        event_ids: outcome.event_ids,
        applied_quantity: None,
    })
}

async fn load_mutate_save<F>(
    task_id: &str,
    ctx: &CorrelationContext,
    writer: &TransactionalWriter,
    mutate: F,
) -> Result<StowCommandResult, DomainError>
where
    F: FnOnce(&mut PutawayTask) -> Result<(), DomainError> + Send,
{
    let mut task: PutawayTask = writer.load(task_id).await?;
    mutate(&mut task)?;
    save(task, ctx, writer).await
}

/// Handles the `CreatePutawayTask` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` for bad input,
/// `DomainError::ConcurrencyConflict` if the task id already exists, or
/// `DomainError::Persistence` if the save fails.
pub async fn handle_create_task(
    command: &CreatePutawayTask,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<StowCommandResult, DomainError> {
    let task = PutawayTask::create(
        NewPutawayTask {
            task_id: command.task_id.clone(),
            shipment_id: command.shipment_id.clone(),
            sku: command.sku.clone(),
            product_name: command.product_name.clone(),
            quantity: command.quantity,
            source_tote_id: command.source_tote_id.clone(),
            strategy: command.strategy,
            priority: command.priority,
        },
        clock,
    )?;
    save(task, &command.correlation_context(), writer).await
}

/// Handles the `AssignPutawayTask` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `DomainError::InvalidTransition`,
/// or a save error.
pub async fn handle_assign_task(
    command: &AssignPutawayTask,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<StowCommandResult, DomainError> {
    load_mutate_save(&command.task_id, &command.correlation_context(), writer, |task| {
        task.assign(&command.worker_id, clock)
    })
    .await
}

/// Handles the `UnassignPutawayTask` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `DomainError::InvalidTransition`,
/// or a save error.
pub async fn handle_unassign_task(
    command: &UnassignPutawayTask,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<StowCommandResult, DomainError> {
    load_mutate_save(&command.task_id, &command.correlation_context(), writer, |task| {
        task.unassign(clock)
    })
    .await
}

/// Handles the `AssignStorageLocation` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `DomainError::InvalidTransition`,
/// `DomainError::Validation` if the location lacks room, or a save error.
pub async fn handle_assign_location(
    command: &AssignStorageLocation,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<StowCommandResult, DomainError> {
    let location = command.location.clone();
    load_mutate_save(&command.task_id, &command.correlation_context(), writer, |task| {
        task.assign_location(location, clock)
    })
    .await
}

/// Handles the `StartPutawayTask` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `DomainError::InvalidTransition`,
/// `DomainError::Validation` if no location is set, or a save error.
pub async fn handle_start_task(
    command: &StartPutawayTask,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<StowCommandResult, DomainError> {
    load_mutate_save(&command.task_id, &command.correlation_context(), writer, |task| {
        task.start(clock)
    })
    .await
}

/// Handles the `RecordStow` command. The result carries the quantity
/// actually applied.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `DomainError::InvalidTransition`,
/// `DomainError::Validation` for a zero quantity, or a save error.
pub async fn handle_record_stow(
    command: &RecordStow,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<StowCommandResult, DomainError> {
    let mut task: PutawayTask = writer.load(&command.task_id).await?;
    let applied = task.record_stow(command.quantity, clock)?;
    if applied < command.quantity {
        debug!(
            task_id = %command.task_id,
            requested = command.quantity,
            applied,
            "stow quantity clamped to remaining"
        );
    }
    let mut result = save(task, &command.correlation_context(), writer).await?;
    result.applied_quantity = Some(applied);
    Ok(result)
}

/// Handles the `CompletePutawayTask` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `DomainError::InvalidTransition`,
/// or a save error.
pub async fn handle_complete_task(
    command: &CompletePutawayTask,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<StowCommandResult, DomainError> {
    load_mutate_save(&command.task_id, &command.correlation_context(), writer, |task| {
        task.complete(clock)
    })
    .await
}

/// Handles the `FailPutawayTask` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `DomainError::InvalidTransition`,
/// or a save error.
pub async fn handle_fail_task(
    command: &FailPutawayTask,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<StowCommandResult, DomainError> {
    load_mutate_save(&command.task_id, &command.correlation_context(), writer, |task| {
        task.fail(&command.reason, clock)
    })
    .await
}

/// Handles the `CancelPutawayTask` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `DomainError::InvalidTransition`,
/// or a save error.
pub async fn handle_cancel_task(
    command: &CancelPutawayTask,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<StowCommandResult, DomainError> {
    load_mutate_save(&command.task_id, &command.correlation_context(), writer, |task| {
        task.cancel(&command.reason, clock)
    })
    .await
}

/// Handles the `RetryPutawayTask` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `DomainError::InvalidTransition`,
/// or a save error.
pub async fn handle_retry_task(
    command: &RetryPutawayTask,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<StowCommandResult, DomainError> {
    load_mutate_save(&command.task_id, &command.correlation_context(), writer, |task| {
        task.retry(clock)
    })
    .await
}
