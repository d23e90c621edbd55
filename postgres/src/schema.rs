//! Idempotent schema bootstrap for the pipeline tables.

use crate::db_err;
use sqlx::PgPool;
use stayline_core::store::Result;

/// DDL statements, applied in order. Every statement is idempotent so the
/// bootstrap can run on every process start.
const MIGRATIONS: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS event_queue (
        id UUID PRIMARY KEY,
        consumer TEXT NOT NULL,
        aggregate_type TEXT NOT NULL,
        aggregate_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        topic TEXT NOT NULL,
        payload JSONB NOT NULL,
        headers JSONB NOT NULL DEFAULT '{}'::jsonb,
        tenant_id TEXT NOT NULL,
        entity_id TEXT,
        schema_version INT NOT NULL DEFAULT 1,
        correlation_id TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        attempt_count INT NOT NULL DEFAULT 0,
        next_attempt_utc TIMESTAMPTZ,
        last_error TEXT,
        created_at_utc TIMESTAMPTZ NOT NULL DEFAULT now(),
        published_at_utc TIMESTAMPTZ,
        updated_at_utc TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    ",
    // Covers the claim predicate: role, status, due time, creation order.
    r"
    CREATE INDEX IF NOT EXISTS idx_event_queue_claim
    ON event_queue (consumer, status, next_attempt_utc, created_at_utc)
    ",
    r"
    CREATE TABLE IF NOT EXISTS scheduled_actions (
        id UUID PRIMARY KEY,
        booking_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        due_at_utc TIMESTAMPTZ NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        published_at_utc TIMESTAMPTZ,
        completed_at_utc TIMESTAMPTZ,
        attempt_count INT NOT NULL DEFAULT 0,
        last_error TEXT
    )
    ",
    // Deliberately not UNIQUE: uniqueness of (booking_id, event_type) is
    // enforced by the materializer's lookup-before-insert transaction.
    r"
    CREATE INDEX IF NOT EXISTS idx_scheduled_actions_booking
    ON scheduled_actions (booking_id, event_type)
    ",
    r"
    CREATE TABLE IF NOT EXISTS notification_log (
        id UUID PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        booking_id TEXT NOT NULL,
        guest_id TEXT NOT NULL,
        channel TEXT NOT NULL,
        event_type TEXT NOT NULL,
        to_address TEXT,
        correlation_id TEXT,
        idempotency_key TEXT NOT NULL,
        provider TEXT,
        provider_message_id TEXT,
        status TEXT NOT NULL,
        attempt_count INT NOT NULL DEFAULT 1,
        sent_at_utc TIMESTAMPTZ,
        created_at_utc TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_notification_log_key
    ON notification_log (tenant_id, idempotency_key)
    ",
];

/// Create the pipeline tables and indexes if they don't exist yet.
///
/// # Errors
///
/// Returns [`stayline_core::store::StoreError::Database`] if a statement fails.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for statement in MIGRATIONS {
        sqlx::query(statement).execute(pool).await.map_err(db_err)?;
    }
    tracing::info!("Pipeline schema ready");
    Ok(())
}
