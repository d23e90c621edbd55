//! `PostgreSQL` queue store: claim, attempt accounting, finalizers.

use crate::db_err;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use stayline_core::queue::{ConsumerRole, QueueEntry, QueueEntryStatus, QueueStore};
use stayline_core::store::{Result, StoreError};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// Columns selected whenever a full entry is materialized from a row.
/// Qualified so they stay unambiguous in the claim's `UPDATE ... FROM`.
const ENTRY_COLUMNS: &str = r"
    q.id, q.consumer, q.aggregate_type, q.aggregate_id, q.event_type, q.topic,
    q.payload, q.headers, q.tenant_id, q.entity_id, q.schema_version, q.correlation_id,
    q.status, q.attempt_count, q.next_attempt_utc, q.last_error,
    q.created_at_utc, q.published_at_utc, q.updated_at_utc
";

/// `PostgreSQL`-backed [`QueueStore`].
///
/// The claim runs as a single `UPDATE ... FROM (SELECT ... FOR UPDATE SKIP
/// LOCKED)` statement, so it is its own short transaction: rows locked by a
/// concurrent claimant are skipped, the status flip commits immediately, and
/// per-row work happens afterwards against already-claimed rows.
#[derive(Clone)]
pub struct PostgresQueueStore {
    pool: PgPool,
}

impl PostgresQueueStore {
    /// Create a new queue store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<QueueEntry> {
        let consumer: String = row.get("consumer");
        let status: String = row.get("status");

        Ok(QueueEntry {
            id: row.get("id"),
            consumer: ConsumerRole::parse(&consumer)?,
            aggregate_type: row.get("aggregate_type"),
            aggregate_id: row.get("aggregate_id"),
            event_type: row.get("event_type"),
            topic: row.get("topic"),
            payload: row.get("payload"),
            headers: row.get("headers"),
            tenant_id: row.get("tenant_id"),
            entity_id: row.get("entity_id"),
            schema_version: row.get("schema_version"),
            correlation_id: row.get("correlation_id"),
            status: QueueEntryStatus::parse(&status)?,
            attempt_count: row.get("attempt_count"),
            next_attempt_utc: row.get("next_attempt_utc"),
            last_error: row.get("last_error"),
            created_at_utc: row.get("created_at_utc"),
            published_at_utc: row.get("published_at_utc"),
            updated_at_utc: row.get("updated_at_utc"),
        })
    }
}

impl QueueStore for PostgresQueueStore {
    fn claim_due(
        &self,
        consumer: ConsumerRole,
        batch_size: usize,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<QueueEntry>>> + Send + '_>> {
        Box::pin(async move {
            #[allow(clippy::cast_possible_wrap)] // Batch sizes are small
            let rows = sqlx::query(&format!(
                r"
                WITH due AS (
                    SELECT id
                    FROM event_queue
                    WHERE consumer = $1
                      AND status = 'pending'
                      AND (next_attempt_utc IS NULL OR next_attempt_utc <= $2)
                    ORDER BY COALESCE(next_attempt_utc, created_at_utc) ASC
                    LIMIT $3
                    FOR UPDATE SKIP LOCKED
                )
                UPDATE event_queue q
                SET status = 'processing', updated_at_utc = $2
                FROM due
                WHERE q.id = due.id
                RETURNING {ENTRY_COLUMNS}
                ",
            ))
            .bind(consumer.as_str())
            .bind(now)
            .bind(batch_size as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

            let mut claimed = rows
                .iter()
                .map(Self::row_to_entry)
                .collect::<Result<Vec<_>>>()?;
            // UPDATE ... RETURNING doesn't preserve the CTE's ordering.
            claimed.sort_by_key(|e| e.next_attempt_utc.unwrap_or(e.created_at_utc));

            if !claimed.is_empty() {
                metrics::counter!("pipeline.queue.claimed", "consumer" => consumer.as_str())
                    .increment(claimed.len() as u64);
                tracing::debug!(
                    consumer = consumer.as_str(),
                    claimed = claimed.len(),
                    "Claimed queue batch"
                );
            }

            Ok(claimed)
        })
    }

    fn fetch(&self, id: Uuid) -> Pin<Box<dyn Future<Output = Result<Option<QueueEntry>>> + Send + '_>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {ENTRY_COLUMNS} FROM event_queue q WHERE q.id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

            row.as_ref().map(Self::row_to_entry).transpose()
        })
    }

    fn begin_attempt(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<i32>> + Send + '_>> {
        Box::pin(async move {
            let row: Option<(i32,)> = sqlx::query_as(
                r"
                UPDATE event_queue
                SET attempt_count = attempt_count + 1, updated_at_utc = $2
                WHERE id = $1
                RETURNING attempt_count
                ",
            )
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

            row.map(|(count,)| count).ok_or(StoreError::NotFound(id))
        })
    }

    fn mark_published(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            sqlx::query(
                r"
                UPDATE event_queue
                SET status = 'published', published_at_utc = $2,
                    next_attempt_utc = NULL, updated_at_utc = $2
                WHERE id = $1
                ",
            )
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn reschedule(
        &self,
        id: Uuid,
        attempt_count: i32,
        error: &str,
        next_attempt_utc: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let error = error.to_string();
        Box::pin(async move {
            sqlx::query(
                r"
                UPDATE event_queue
                SET status = 'pending', attempt_count = $2, last_error = $3,
                    next_attempt_utc = $4, updated_at_utc = now()
                WHERE id = $1
                ",
            )
            .bind(id)
            .bind(attempt_count)
            .bind(&error)
            .bind(next_attempt_utc)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn mark_failed(
        &self,
        id: Uuid,
        attempt_count: i32,
        error: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let error = error.to_string();
        Box::pin(async move {
            sqlx::query(
                r"
                UPDATE event_queue
                SET status = 'failed', attempt_count = $2, last_error = $3,
                    next_attempt_utc = NULL, updated_at_utc = now()
                WHERE id = $1
                ",
            )
            .bind(id)
            .bind(attempt_count)
            .bind(&error)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            metrics::counter!("pipeline.queue.failed_terminal").increment(1);
            tracing::warn!(entry_id = %id, attempt_count, "Queue entry failed terminally");
            Ok(())
        })
    }

    fn pending_count(
        &self,
        consumer: ConsumerRole,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM event_queue WHERE consumer = $1 AND status = 'pending'",
            )
            .bind(consumer.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(count)
        })
    }
}
