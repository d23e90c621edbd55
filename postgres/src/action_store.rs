//! `PostgreSQL` scheduled-action store with the transactional materialize step.

use crate::db_err;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use stayline_core::actions::{
    ActionStore, MaterializeOutcome, ScheduledAction, ScheduledActionStatus,
};
use stayline_core::store::{Result, StoreError};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// `PostgreSQL`-backed [`ActionStore`].
#[derive(Clone)]
pub struct PostgresActionStore {
    pool: PgPool,
}

impl PostgresActionStore {
    /// Create a new action store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_action(row: &sqlx::postgres::PgRow) -> Result<ScheduledAction> {
        let status: String = row.get("status");
        Ok(ScheduledAction {
            id: row.get("id"),
            booking_id: row.get("booking_id"),
            event_type: row.get("event_type"),
            due_at_utc: row.get("due_at_utc"),
            status: ScheduledActionStatus::parse(&status)?,
            published_at_utc: row.get("published_at_utc"),
            completed_at_utc: row.get("completed_at_utc"),
            attempt_count: row.get("attempt_count"),
            last_error: row.get("last_error"),
        })
    }
}

impl ActionStore for PostgresActionStore {
    fn materialize(
        &self,
        entry_id: Uuid,
        booking_id: &str,
        event_type: &str,
        due_at_utc: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<MaterializeOutcome>> + Send + '_>> {
        let booking_id = booking_id.to_string();
        let event_type = event_type.to_string();
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_err)?;

            // Re-check under our own transaction: a concurrent instance may
            // have finalized the entry after our claim.
            let status: Option<(String,)> =
                sqlx::query_as("SELECT status FROM event_queue WHERE id = $1 FOR UPDATE")
                    .bind(entry_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_err)?;
            let Some((status,)) = status else {
                return Err(StoreError::NotFound(entry_id));
            };
            if status != "processing" {
                return Ok(MaterializeOutcome::AlreadyFinalized);
            }

            // Lookup-before-insert keeps (booking_id, event_type) unique
            // without a constraint on the table.
            let existing: Option<(Uuid,)> = sqlx::query_as(
                "SELECT id FROM scheduled_actions WHERE booking_id = $1 AND event_type = $2",
            )
            .bind(&booking_id)
            .bind(&event_type)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

            let action_created = existing.is_none();
            if action_created {
                sqlx::query(
                    r"
                    INSERT INTO scheduled_actions (
                        id, booking_id, event_type, due_at_utc, status, attempt_count
                    ) VALUES ($1, $2, $3, $4, 'pending', 0)
                    ",
                )
                .bind(Uuid::new_v4())
                .bind(&booking_id)
                .bind(&event_type)
                .bind(due_at_utc)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }

            sqlx::query(
                r"
                UPDATE event_queue
                SET status = 'published', published_at_utc = $2,
                    next_attempt_utc = NULL, updated_at_utc = $2
                WHERE id = $1
                ",
            )
            .bind(entry_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            tx.commit().await.map_err(db_err)?;

            Ok(MaterializeOutcome::Applied { action_created })
        })
    }

    fn find(
        &self,
        booking_id: &str,
        event_type: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ScheduledAction>>> + Send + '_>> {
        let booking_id = booking_id.to_string();
        let event_type = event_type.to_string();
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT id, booking_id, event_type, due_at_utc, status,
                       published_at_utc, completed_at_utc, attempt_count, last_error
                FROM scheduled_actions
                WHERE booking_id = $1 AND event_type = $2
                ",
            )
            .bind(&booking_id)
            .bind(&event_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

            row.as_ref().map(Self::row_to_action).transpose()
        })
    }
}
