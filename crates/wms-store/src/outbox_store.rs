//! `PostgreSQL` implementation of the outbox store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use wms_core::error::DomainError;
use wms_core::outbox::{OutboxBacklog, OutboxRecord, OutboxStore};

use crate::{db_error, to_limit};

const RECORD_COLUMNS: &str = "id, aggregate_type, aggregate_id, event_type, destination, \
     envelope, created_at, published, published_at, attempts, last_error";

/// Inserts an outbox record inside an open transaction.
///
/// # Errors
///
/// Returns `DomainError::Persistence` if the insert fails; the caller's
/// transaction must then be rolled back.
pub async fn append(
    tx: &mut Transaction<'static, Postgres>,
    record: &OutboxRecord,
) -> Result<(), DomainError> {
    sqlx::query(
        r"
        INSERT INTO outbox_events
            (id, aggregate_type, aggregate_id, event_type, destination, envelope,
             created_at, published, published_at, attempts, last_error)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ",
    )
    .bind(record.id)
    .bind(&record.aggregate_type)
    .bind(&record.aggregate_id)
    .bind(&record.event_type)
    .bind(&record.destination)
    .bind(&record.envelope)
    .bind(record.created_at)
    .bind(record.published)
    .bind(record.published_at)
    .bind(record.attempts)
    .bind(&record.last_error)
    .execute(&mut **tx)
    .await
    .map_err(db_error("append outbox record"))?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    aggregate_type: String,
    aggregate_id: String,
    event_type: String,
    destination: String,
    envelope: serde_json::Value,
    created_at: DateTime<Utc>,
    published: bool,
    published_at: Option<DateTime<Utc>>,
    attempts: i32,
    last_error: Option<String>,
}

impl From<OutboxRow> for OutboxRecord {
    fn from(row: OutboxRow) -> Self {
        Self {
            id: row.id,
            aggregate_type: row.aggregate_type,
            aggregate_id: row.aggregate_id,
            event_type: row.event_type,
            destination: row.destination,
            envelope: row.envelope,
            created_at: row.created_at,
            published: row.published,
            published_at: row.published_at,
            attempts: row.attempts,
            last_error: row.last_error,
        }
    }
}

/// PostgreSQL-backed outbox store.
#[derive(Debug, Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    /// Creates a new `PgOutboxStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn find_unpublished(
        &self,
        limit: usize,
        attempt_limit: i32,
    ) -> Result<Vec<OutboxRecord>, DomainError> {
        let sql = r"
            WITH heads AS (
                SELECT DISTINCT ON (aggregate_type, aggregate_id)
                       aggregate_type, aggregate_id, position AS head_position, attempts AS head_attempts
                FROM outbox_events
                WHERE NOT published
                ORDER BY aggregate_type, aggregate_id, position
            )
            SELECT o.id, o.aggregate_type, o.aggregate_id, o.event_type, o.destination,
                   o.envelope, o.created_at, o.published, o.published_at, o.attempts, o.last_error
            FROM outbox_events o
            JOIN heads h
              ON h.aggregate_type = o.aggregate_type AND h.aggregate_id = o.aggregate_id
            WHERE NOT o.published
              AND h.head_attempts < $2
              AND (h.head_attempts = 0 OR o.position = h.head_position)
            ORDER BY o.position
            LIMIT $1
            ";
        let rows = sqlx::query_as::<_, OutboxRow>(sql)
            .bind(to_limit(limit))
            .bind(attempt_limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("find unpublished"))?;
        Ok(rows.into_iter().map(OutboxRecord::from).collect())
    }

    async fn mark_published(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DomainError> {
        let result = sqlx::query(
            r"
            UPDATE outbox_events
            SET published = TRUE, published_at = COALESCE(published_at, $2)
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_error("mark published"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::OutboxRecordNotFound(id));
        }
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE outbox_events SET attempts = attempts + 1, last_error = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(db_error("record failure"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::OutboxRecordNotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<OutboxRecord>, DomainError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM outbox_events WHERE id = $1");
        let row = sqlx::query_as::<_, OutboxRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("get outbox record"))?;
        Ok(row.map(OutboxRecord::from))
    }

    async fn find_by_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Vec<OutboxRecord>, DomainError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM outbox_events \
             WHERE aggregate_type = $1 AND aggregate_id = $2 ORDER BY position"
        );
        let rows = sqlx::query_as::<_, OutboxRow>(&sql)
            .bind(aggregate_type)
            .bind(aggregate_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("find by aggregate"))?;
        Ok(rows.into_iter().map(OutboxRecord::from).collect())
    }

    async fn backlog(&self, attempt_limit: i32) -> Result<OutboxBacklog, DomainError> {
        let (unpublished, oldest_unpublished_at, max_attempts, parked): (
            i64,
            Option<DateTime<Utc>>,
            i32,
            i64,
        ) = sqlx::query_as(
            r"
            SELECT COUNT(*), MIN(created_at), COALESCE(MAX(attempts), 0),
                   COUNT(*) FILTER (WHERE attempts >= $1)
            FROM outbox_events
            WHERE NOT published
            ",
        )
        .bind(attempt_limit)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("outbox backlog"))?;

        Ok(OutboxBacklog {
            unpublished,
            oldest_unpublished_at,
            max_attempts,
            parked,
        })
    }

    async fn find_published_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, DomainError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM outbox_events \
             WHERE published AND published_at < $1 ORDER BY position LIMIT $2"
        );
        let rows = sqlx::query_as::<_, OutboxRow>(&sql)
            .bind(cutoff)
            .bind(to_limit(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("find published before"))?;
        Ok(rows.into_iter().map(OutboxRecord::from).collect())
    }

    async fn delete_published_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError> {
        let result =
            sqlx::query("DELETE FROM outbox_events WHERE published AND published_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(db_error("delete published before"))?;
        Ok(result.rows_affected())
    }
}
