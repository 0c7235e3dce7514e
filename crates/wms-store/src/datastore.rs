//! `PostgreSQL` implementation of the transactional datastore.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use wms_core::error::DomainError;
use wms_core::outbox::OutboxRecord;
use wms_core::repository::{StoreTransaction, StoredAggregate, TransactionalStore};

use crate::db_error;
use crate::outbox_store;

/// PostgreSQL-backed transactional datastore.
#[derive(Debug, Clone)]
pub struct PgDatastore {
    pool: PgPool,
}

impl PgDatastore {
    /// Creates a new `PgDatastore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AggregateRow {
    aggregate_type: String,
    aggregate_id: String,
    status: String,
    version: i64,
    updated_at: DateTime<Utc>,
    state: serde_json::Value,
}

impl From<AggregateRow> for StoredAggregate {
    fn from(row: AggregateRow) -> Self {
        Self {
            aggregate_type: row.aggregate_type,
            aggregate_id: row.aggregate_id,
            status: row.status,
            version: row.version,
            updated_at: row.updated_at,
            state: row.state,
        }
    }
}

#[async_trait]
impl TransactionalStore for PgDatastore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError> {
        let tx = self.pool.begin().await.map_err(db_error("begin"))?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }

    async fn load_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Option<StoredAggregate>, DomainError> {
        let row = sqlx::query_as::<_, AggregateRow>(
            r"
            SELECT aggregate_type, aggregate_id, status, version, updated_at, state
            FROM aggregate_states
            WHERE aggregate_type = $1 AND aggregate_id = $2
            ",
        )
        .bind(aggregate_type)
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("load aggregate"))?;
        Ok(row.map(StoredAggregate::from))
    }
}

/// An open `PostgreSQL` transaction.
pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

impl fmt::Debug for PgStoreTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgStoreTransaction").finish_non_exhaustive()
    }
}

impl PgStoreTransaction {
    async fn current_version(&mut self, row: &StoredAggregate) -> Result<i64, DomainError> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM aggregate_states WHERE aggregate_type = $1 AND aggregate_id = $2",
        )
        .bind(&row.aggregate_type)
        .bind(&row.aggregate_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("read aggregate version"))?;
        Ok(version.unwrap_or(0))
    }
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn upsert_aggregate(
        &mut self,
        row: &StoredAggregate,
        expected_version: i64,
    ) -> Result<(), DomainError> {
        let result = if expected_version == 0 {
            sqlx::query(
                r"
                INSERT INTO aggregate_states
                    (aggregate_type, aggregate_id, status, version, updated_at, state)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (aggregate_type, aggregate_id) DO NOTHING
                ",
            )
            .bind(&row.aggregate_type)
            .bind(&row.aggregate_id)
            .bind(&row.status)
            .bind(row.version)
            .bind(row.updated_at)
            .bind(&row.state)
            .execute(&mut *self.tx)
            .await
        } else {
            sqlx::query(
                r"
                UPDATE aggregate_states
                SET status = $3, version = $4, updated_at = $5, state = $6
                WHERE aggregate_type = $1 AND aggregate_id = $2 AND version = $7
                ",
            )
            .bind(&row.aggregate_type)
            .bind(&row.aggregate_id)
            .bind(&row.status)
            .bind(row.version)
            .bind(row.updated_at)
            .bind(&row.state)
            .bind(expected_version)
            .execute(&mut *self.tx)
            .await
        }
        .map_err(db_error("upsert aggregate"))?;

        if result.rows_affected() == 0 {
            let actual = self.current_version(row).await?;
            debug!(
                aggregate_id = %row.aggregate_id,
                expected = expected_version,
                actual,
                "aggregate version moved"
            );
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: row.aggregate_id.clone(),
                expected: expected_version,
                actual,
            });
        }
        Ok(())
    }

    async fn append_outbox(&mut self, record: &OutboxRecord) -> Result<(), DomainError> {
        outbox_store::append(&mut self.tx, record).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit().await.map_err(db_error("commit"))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.rollback().await.map_err(db_error("rollback"))
    }
}
