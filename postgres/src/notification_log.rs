//! `PostgreSQL` notification ledger.

use crate::db_err;
use chrono::Utc;
use sqlx::{PgPool, Row};
use stayline_core::notifications::{
    Channel, NewNotificationLogEntry, NotificationLog, NotificationLogEntry, NotificationStatus,
};
use stayline_core::store::Result;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// `PostgreSQL`-backed [`NotificationLog`].
#[derive(Clone)]
pub struct PostgresNotificationLog {
    pool: PgPool,
}

impl PostgresNotificationLog {
    /// Create a new ledger over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<NotificationLogEntry> {
        let channel: String = row.get("channel");
        let status: String = row.get("status");
        Ok(NotificationLogEntry {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            booking_id: row.get("booking_id"),
            guest_id: row.get("guest_id"),
            channel: Channel::parse(&channel)?,
            event_type: row.get("event_type"),
            to_address: row.get("to_address"),
            correlation_id: row.get("correlation_id"),
            idempotency_key: row.get("idempotency_key"),
            provider: row.get("provider"),
            provider_message_id: row.get("provider_message_id"),
            status: NotificationStatus::parse(&status)?,
            attempt_count: row.get("attempt_count"),
            sent_at_utc: row.get("sent_at_utc"),
            created_at_utc: row.get("created_at_utc"),
        })
    }
}

impl NotificationLog for PostgresNotificationLog {
    fn find(
        &self,
        tenant_id: &str,
        idempotency_key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<NotificationLogEntry>>> + Send + '_>> {
        let tenant_id = tenant_id.to_string();
        let idempotency_key = idempotency_key.to_string();
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT id, tenant_id, booking_id, guest_id, channel, event_type,
                       to_address, correlation_id, idempotency_key, provider,
                       provider_message_id, status, attempt_count, sent_at_utc,
                       created_at_utc
                FROM notification_log
                WHERE tenant_id = $1 AND idempotency_key = $2
                ORDER BY created_at_utc ASC
                LIMIT 1
                ",
            )
            .bind(&tenant_id)
            .bind(&idempotency_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

            row.as_ref().map(Self::row_to_entry).transpose()
        })
    }

    fn append(
        &self,
        entry: NewNotificationLogEntry,
    ) -> Pin<Box<dyn Future<Output = Result<NotificationLogEntry>> + Send + '_>> {
        Box::pin(async move {
            let id = Uuid::new_v4();
            let created_at_utc = Utc::now();

            sqlx::query(
                r"
                INSERT INTO notification_log (
                    id, tenant_id, booking_id, guest_id, channel, event_type,
                    to_address, correlation_id, idempotency_key, provider,
                    provider_message_id, status, attempt_count, sent_at_utc,
                    created_at_utc
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 1, $13, $14)
                ",
            )
            .bind(id)
            .bind(&entry.tenant_id)
            .bind(&entry.booking_id)
            .bind(&entry.guest_id)
            .bind(entry.channel.as_str())
            .bind(&entry.event_type)
            .bind(&entry.to_address)
            .bind(&entry.correlation_id)
            .bind(&entry.idempotency_key)
            .bind(&entry.provider)
            .bind(&entry.provider_message_id)
            .bind(entry.status.as_str())
            .bind(entry.sent_at_utc)
            .bind(created_at_utc)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            tracing::debug!(
                idempotency_key = %entry.idempotency_key,
                status = entry.status.as_str(),
                "Notification log entry written"
            );

            Ok(NotificationLogEntry {
                id,
                tenant_id: entry.tenant_id,
                booking_id: entry.booking_id,
                guest_id: entry.guest_id,
                channel: entry.channel,
                event_type: entry.event_type,
                to_address: entry.to_address,
                correlation_id: entry.correlation_id,
                idempotency_key: entry.idempotency_key,
                provider: entry.provider,
                provider_message_id: entry.provider_message_id,
                status: entry.status,
                attempt_count: 1,
                sent_at_utc: entry.sent_at_utc,
                created_at_utc,
            })
        })
    }
}
