//! Producer-side enqueue: the sole contract surface for domain logic.
//!
//! A producing service calls [`enqueue`] with the connection of its *own
//! open transaction*. The queue rows then commit, or roll back, together
//! with the business write that produced the event, which is the whole point
//! of the outbox: the fact and its delivery obligation are atomic. Producers
//! must never publish to the bus themselves.

use crate::db_err;
use sqlx::PgConnection;
use stayline_core::queue::{ConsumerRole, NewQueueEntry};
use stayline_core::store::Result;
use uuid::Uuid;

/// Insert one queue row per consumer role inside the caller's transaction.
///
/// The fan-out gives the dispatch and materialize workers fully independent
/// queues; each row gets its own id, which later doubles as the bus message
/// id for that row's deliveries.
///
/// Returns the new row ids in [`ConsumerRole::ALL`] order.
///
/// # Errors
///
/// Returns [`stayline_core::store::StoreError::Database`] if an insert
/// fails; the caller's transaction should then roll back.
pub async fn enqueue(conn: &mut PgConnection, entry: &NewQueueEntry) -> Result<Vec<Uuid>> {
    let mut ids = Vec::with_capacity(ConsumerRole::ALL.len());

    for role in ConsumerRole::ALL {
        let id = Uuid::new_v4();
        sqlx::query(
            r"
            INSERT INTO event_queue (
                id, consumer, aggregate_type, aggregate_id, event_type, topic,
                payload, headers, tenant_id, entity_id, schema_version,
                correlation_id, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'pending')
            ",
        )
        .bind(id)
        .bind(role.as_str())
        .bind(&entry.aggregate_type)
        .bind(&entry.aggregate_id)
        .bind(&entry.event_type)
        .bind(&entry.topic)
        .bind(&entry.payload)
        .bind(&entry.headers)
        .bind(&entry.tenant_id)
        .bind(&entry.entity_id)
        .bind(entry.schema_version)
        .bind(&entry.correlation_id)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

        ids.push(id);
    }

    tracing::debug!(
        aggregate_id = %entry.aggregate_id,
        event_type = %entry.event_type,
        rows = ids.len(),
        "Queue entry enqueued"
    );

    Ok(ids)
}
