//! Integration tests for `PgDatastore` and `PgOutboxStore`.
//!
//! `#[sqlx::test]` creates a fresh database per test through `DATABASE_URL`.

use chrono::{Duration, TimeZone, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use wms_core::error::DomainError;
use wms_core::outbox::{OutboxRecord, OutboxStore};
use wms_core::repository::{StoredAggregate, TransactionalStore};
use wms_store::{PgDatastore, PgOutboxStore};

fn base_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

fn make_row(aggregate_id: &str, version: i64, status: &str) -> StoredAggregate {
    StoredAggregate {
        aggregate_type: "putaway-task".to_string(),
        aggregate_id: aggregate_id.to_string(),
        status: status.to_string(),
        version,
        updated_at: base_time(),
        state: serde_json::json!({ "taskId": aggregate_id, "status": status }),
    }
}

fn make_record(aggregate_id: &str, event_type: &str) -> OutboxRecord {
    let id = Uuid::new_v4();
    OutboxRecord {
        id,
        aggregate_type: "putaway-task".to_string(),
        aggregate_id: aggregate_id.to_string(),
        event_type: event_type.to_string(),
        destination: "wms.stow.events".to_string(),
        envelope: serde_json::json!({ "id": id, "type": event_type }),
        created_at: base_time(),
        published: false,
        published_at: None,
        attempts: 0,
        last_error: None,
    }
}

async fn commit_records(datastore: &PgDatastore, records: &[OutboxRecord]) {
    let mut tx = datastore.begin().await.unwrap();
    for record in records {
        tx.append_outbox(record).await.unwrap();
    }
    tx.commit().await.unwrap();
}

// --- aggregate state ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_insert_then_update_aggregate(pool: PgPool) {
    let datastore = PgDatastore::new(pool);

    let mut tx = datastore.begin().await.unwrap();
    tx.upsert_aggregate(&make_row("T1", 1, "pending"), 0)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = datastore.begin().await.unwrap();
    tx.upsert_aggregate(&make_row("T1", 2, "assigned"), 1)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let loaded = datastore
        .load_aggregate("putaway-task", "T1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.version, 2);
    assert_eq!(loaded.status, "assigned");
    assert_eq!(loaded.state["status"], "assigned");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_load_missing_aggregate_returns_none(pool: PgPool) {
    let datastore = PgDatastore::new(pool);

    let loaded = datastore
        .load_aggregate("putaway-task", "missing")
        .await
        .unwrap();

    assert!(loaded.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_stale_version_is_a_concurrency_conflict(pool: PgPool) {
    let datastore = PgDatastore::new(pool);
    let mut tx = datastore.begin().await.unwrap();
    tx.upsert_aggregate(&make_row("T1", 1, "pending"), 0)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = datastore.begin().await.unwrap();
    let result = tx.upsert_aggregate(&make_row("T1", 1, "pending"), 0).await;

    match result.unwrap_err() {
        DomainError::ConcurrencyConflict {
            expected, actual, ..
        } => {
            assert_eq!(expected, 0);
            assert_eq!(actual, 1);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_rollback_discards_state_and_outbox(pool: PgPool) {
    let datastore = PgDatastore::new(pool.clone());
    let outbox = PgOutboxStore::new(pool);

    let mut tx = datastore.begin().await.unwrap();
    tx.upsert_aggregate(&make_row("T1", 1, "pending"), 0)
        .await
        .unwrap();
    tx.append_outbox(&make_record("T1", "stow.task.created"))
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert!(
        datastore
            .load_aggregate("putaway-task", "T1")
            .await
            .unwrap()
            .is_none()
    );
    assert!(outbox.find_unpublished(10, 10).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_uncommitted_records_are_invisible(pool: PgPool) {
    let datastore = PgDatastore::new(pool.clone());
    let outbox = PgOutboxStore::new(pool);

    let mut tx = datastore.begin().await.unwrap();
    tx.append_outbox(&make_record("T1", "stow.task.created"))
        .await
        .unwrap();

    assert!(outbox.find_unpublished(10, 10).await.unwrap().is_empty());

    tx.commit().await.unwrap();
    assert_eq!(outbox.find_unpublished(10, 10).await.unwrap().len(), 1);
}

// --- outbox ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_unpublished_is_insertion_ordered_and_bounded(pool: PgPool) {
    let datastore = PgDatastore::new(pool.clone());
    let outbox = PgOutboxStore::new(pool);
    let records = vec![
        make_record("T1", "stow.task.created"),
        make_record("T1", "stow.task.assigned"),
        make_record("T1", "stow.task.started"),
    ];
    commit_records(&datastore, &records).await;

    let found = outbox.find_unpublished(2, 10).await.unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].id, records[0].id);
    assert_eq!(found[1].id, records[1].id);
    assert_eq!(found[0].envelope, records[0].envelope);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_mark_published_is_idempotent(pool: PgPool) {
    let datastore = PgDatastore::new(pool.clone());
    let outbox = PgOutboxStore::new(pool);
    let record = make_record("T1", "stow.task.created");
    commit_records(&datastore, std::slice::from_ref(&record)).await;
    let first_at = base_time() + Duration::seconds(1);

    outbox.mark_published(record.id, first_at).await.unwrap();
    outbox
        .mark_published(record.id, first_at + Duration::seconds(30))
        .await
        .unwrap();

    let stored = outbox.get(record.id).await.unwrap().unwrap();
    assert!(stored.published);
    assert_eq!(stored.published_at, Some(first_at));
    assert!(outbox.find_unpublished(10, 10).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_mark_published_unknown_id_is_not_found(pool: PgPool) {
    let outbox = PgOutboxStore::new(pool);
    let id = Uuid::new_v4();

    let result = outbox.mark_published(id, base_time()).await;

    assert_eq!(result.unwrap_err(), DomainError::OutboxRecordNotFound(id));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_record_failure_increments_attempts(pool: PgPool) {
    let datastore = PgDatastore::new(pool.clone());
    let outbox = PgOutboxStore::new(pool);
    let record = make_record("T1", "stow.task.created");
    commit_records(&datastore, std::slice::from_ref(&record)).await;

    outbox.record_failure(record.id, "timeout").await.unwrap();
    outbox
        .record_failure(record.id, "connection refused")
        .await
        .unwrap();

    let stored = outbox.get(record.id).await.unwrap().unwrap();
    assert_eq!(stored.attempts, 2);
    assert_eq!(stored.last_error.as_deref(), Some("connection refused"));
    let backlog = outbox.backlog(10).await.unwrap();
    assert_eq!(backlog.unpublished, 1);
    assert_eq!(backlog.max_attempts, 2);
    assert_eq!(backlog.oldest_unpublished_at, Some(base_time()));
    assert_eq!(outbox.backlog(2).await.unwrap().parked, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_unpublished_retries_failing_heads_alone_and_skips_parked(pool: PgPool) {
    // Arrange
    let datastore = PgDatastore::new(pool.clone());
    let outbox = PgOutboxStore::new(pool);
    let parked = make_record("P1", "stow.task.created");
    let behind_parked = make_record("P1", "stow.task.assigned");
    let failing = make_record("F1", "stow.task.created");
    let behind_failing = make_record("F1", "stow.task.assigned");
    let healthy = make_record("H1", "stow.task.created");
    let healthy_next = make_record("H1", "stow.task.assigned");
    commit_records(
        &datastore,
        &[
            parked.clone(),
            behind_parked,
            failing.clone(),
            behind_failing,
            healthy.clone(),
            healthy_next.clone(),
        ],
    )
    .await;
    for _ in 0..3 {
        outbox.record_failure(parked.id, "rejected").await.unwrap();
    }
    outbox.record_failure(failing.id, "timeout").await.unwrap();

    // Act
    let found = outbox.find_unpublished(10, 3).await.unwrap();

    // Assert
    assert_eq!(
        found.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![failing.id, healthy.id, healthy_next.id]
    );
    let backlog = outbox.backlog(3).await.unwrap();
    assert_eq!(backlog.unpublished, 6);
    assert_eq!(backlog.parked, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_by_aggregate_filters_and_orders(pool: PgPool) {
    let datastore = PgDatastore::new(pool.clone());
    let outbox = PgOutboxStore::new(pool);
    let t1_created = make_record("T1", "stow.task.created");
    let t2_created = make_record("T2", "stow.task.created");
    let t1_assigned = make_record("T1", "stow.task.assigned");
    commit_records(
        &datastore,
        &[t1_created.clone(), t2_created, t1_assigned.clone()],
    )
    .await;

    let found = outbox
        .find_by_aggregate("putaway-task", "T1")
        .await
        .unwrap();

    assert_eq!(
        found.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![t1_created.id, t1_assigned.id]
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_retention_only_touches_old_published_records(pool: PgPool) {
    // Arrange
    let datastore = PgDatastore::new(pool.clone());
    let outbox = PgOutboxStore::new(pool);
    let old = make_record("T1", "stow.task.created");
    let recent = make_record("T1", "stow.task.assigned");
    let pending = make_record("T1", "stow.task.started");
    commit_records(&datastore, &[old.clone(), recent.clone(), pending.clone()]).await;
    outbox.mark_published(old.id, base_time()).await.unwrap();
    outbox
        .mark_published(recent.id, base_time() + Duration::days(10))
        .await
        .unwrap();
    let cutoff = base_time() + Duration::days(7);

    // Act
    let expired = outbox.find_published_before(cutoff, 10).await.unwrap();
    let deleted = outbox.delete_published_before(cutoff).await.unwrap();

    // Assert
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, old.id);
    assert_eq!(deleted, 1);
    assert!(outbox.get(old.id).await.unwrap().is_none());
    assert!(outbox.get(recent.id).await.unwrap().is_some());
    assert!(outbox.get(pending.id).await.unwrap().is_some());
}
