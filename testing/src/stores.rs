//! In-memory implementations of the pipeline store traits.

use chrono::{DateTime, Utc};
use stayline_core::actions::{ActionStore, MaterializeOutcome, ScheduledAction, ScheduledActionStatus};
use stayline_core::notifications::{NewNotificationLogEntry, NotificationLog, NotificationLogEntry};
use stayline_core::queue::{ConsumerRole, NewQueueEntry, QueueEntry, QueueEntryStatus, QueueStore};
use stayline_core::store::{Result, StoreError};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
struct PipelineState {
    queue: HashMap<Uuid, QueueEntry>,
    actions: Vec<ScheduledAction>,
    log: Vec<NotificationLogEntry>,
}

/// In-memory stand-in for the pipeline database.
///
/// Implements [`QueueStore`], [`ActionStore`], and [`NotificationLog`] over
/// one shared state guarded by a single lock, so the claim step and the
/// materialize transaction are atomic exactly as their SQL counterparts are.
///
/// # Example
///
/// ```
/// use stayline_testing::InMemoryPipeline;
/// use stayline_core::queue::ConsumerRole;
///
/// let pipeline = InMemoryPipeline::new();
/// let ids = pipeline.insert(sample_entry());
/// assert_eq!(ids.len(), ConsumerRole::ALL.len());
/// # fn sample_entry() -> stayline_core::queue::NewQueueEntry {
/// #     stayline_core::queue::NewQueueEntry {
/// #         aggregate_type: "booking".into(),
/// #         aggregate_id: "42".into(),
/// #         event_type: "booking.confirmed".into(),
/// #         topic: "booking-events".into(),
/// #         payload: serde_json::json!({}),
/// #         headers: serde_json::json!({}),
/// #         tenant_id: "acme".into(),
/// #         entity_id: None,
/// #         schema_version: 1,
/// #         correlation_id: None,
/// #     }
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryPipeline {
    state: Arc<RwLock<PipelineState>>,
}

impl InMemoryPipeline {
    /// Create an empty pipeline state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer-side insert: fan out one row per consumer role, exactly like
    /// the PostgreSQL producer. Returns the new row ids.
    pub fn insert(&self, entry: NewQueueEntry) -> Vec<Uuid> {
        ConsumerRole::ALL
            .into_iter()
            .map(|role| self.insert_for(role, entry.clone()))
            .collect()
    }

    /// Insert a row for a single consumer role.
    pub fn insert_for(&self, consumer: ConsumerRole, entry: NewQueueEntry) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let row = QueueEntry {
            id,
            consumer,
            aggregate_type: entry.aggregate_type,
            aggregate_id: entry.aggregate_id,
            event_type: entry.event_type,
            topic: entry.topic,
            payload: entry.payload,
            headers: entry.headers,
            tenant_id: entry.tenant_id,
            entity_id: entry.entity_id,
            schema_version: entry.schema_version,
            correlation_id: entry.correlation_id,
            status: QueueEntryStatus::Pending,
            attempt_count: 0,
            next_attempt_utc: None,
            last_error: None,
            created_at_utc: now,
            published_at_utc: None,
            updated_at_utc: now,
        };
        self.state.write().unwrap().queue.insert(id, row);
        id
    }

    /// Snapshot one queue entry.
    #[must_use]
    pub fn entry(&self, id: Uuid) -> Option<QueueEntry> {
        self.state.read().unwrap().queue.get(&id).cloned()
    }

    /// Rewind an entry's `next_attempt_utc` so a rescheduled row is due
    /// again immediately. Lets tests drive multi-attempt retry sequences
    /// without waiting out real backoff delays.
    pub fn make_due(&self, id: Uuid) {
        if let Some(entry) = self.state.write().unwrap().queue.get_mut(&id) {
            entry.next_attempt_utc = None;
        }
    }

    /// Snapshot every queue entry for one consumer role.
    #[must_use]
    pub fn entries_for(&self, consumer: ConsumerRole) -> Vec<QueueEntry> {
        self.state
            .read()
            .unwrap()
            .queue
            .values()
            .filter(|e| e.consumer == consumer)
            .cloned()
            .collect()
    }

    /// Snapshot all scheduled actions.
    #[must_use]
    pub fn actions(&self) -> Vec<ScheduledAction> {
        self.state.read().unwrap().actions.clone()
    }

    /// Snapshot all notification log entries.
    #[must_use]
    pub fn log_entries(&self) -> Vec<NotificationLogEntry> {
        self.state.read().unwrap().log.clone()
    }
}

impl QueueStore for InMemoryPipeline {
    fn claim_due(
        &self,
        consumer: ConsumerRole,
        batch_size: usize,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<QueueEntry>>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            let mut due: Vec<Uuid> = state
                .queue
                .values()
                .filter(|e| e.consumer == consumer && e.is_due(now))
                .map(|e| e.id)
                .collect();
            due.sort_by_key(|id| {
                let e = &state.queue[id];
                e.next_attempt_utc.unwrap_or(e.created_at_utc)
            });
            due.truncate(batch_size);

            let mut claimed = Vec::with_capacity(due.len());
            for id in due {
                let entry = state.queue.get_mut(&id).unwrap();
                entry.status = QueueEntryStatus::Processing;
                entry.updated_at_utc = now;
                claimed.push(entry.clone());
            }
            Ok(claimed)
        })
    }

    fn fetch(&self, id: Uuid) -> Pin<Box<dyn Future<Output = Result<Option<QueueEntry>>> + Send + '_>> {
        Box::pin(async move { Ok(self.state.read().unwrap().queue.get(&id).cloned()) })
    }

    fn begin_attempt(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<i32>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            let entry = state.queue.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            entry.attempt_count += 1;
            entry.updated_at_utc = now;
            Ok(entry.attempt_count)
        })
    }

    fn mark_published(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            let entry = state.queue.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            entry.status = QueueEntryStatus::Published;
            entry.published_at_utc = Some(now);
            entry.next_attempt_utc = None;
            entry.updated_at_utc = now;
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
            let mut state = self.state.write().unwrap();
            let entry = state.queue.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            entry.status = QueueEntryStatus::Pending;
            entry.attempt_count = attempt_count;
            entry.last_error = Some(error);
            entry.next_attempt_utc = Some(next_attempt_utc);
            entry.updated_at_utc = Utc::now();
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
            let mut state = self.state.write().unwrap();
            let entry = state.queue.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            entry.status = QueueEntryStatus::Failed;
            entry.attempt_count = attempt_count;
            entry.last_error = Some(error);
            entry.next_attempt_utc = None;
            entry.updated_at_utc = Utc::now();
            Ok(())
        })
    }

    fn pending_count(
        &self,
        consumer: ConsumerRole,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        Box::pin(async move {
            let state = self.state.read().unwrap();
            let count = state
                .queue
                .values()
                .filter(|e| e.consumer == consumer && e.status == QueueEntryStatus::Pending)
                .count();
            Ok(count as i64)
        })
    }
}

impl ActionStore for InMemoryPipeline {
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
            let mut state = self.state.write().unwrap();

            let status = state
                .queue
                .get(&entry_id)
                .ok_or(StoreError::NotFound(entry_id))?
                .status;
            if status != QueueEntryStatus::Processing {
                return Ok(MaterializeOutcome::AlreadyFinalized);
            }

            let action_created = !state
                .actions
                .iter()
                .any(|a| a.booking_id == booking_id && a.event_type == event_type);
            if action_created {
                state.actions.push(ScheduledAction {
                    id: Uuid::new_v4(),
                    booking_id,
                    event_type,
                    due_at_utc,
                    status: ScheduledActionStatus::Pending,
                    published_at_utc: None,
                    completed_at_utc: None,
                    attempt_count: 0,
                    last_error: None,
                });
            }

            let entry = state.queue.get_mut(&entry_id).unwrap();
            entry.status = QueueEntryStatus::Published;
            entry.published_at_utc = Some(now);
            entry.next_attempt_utc = None;
            entry.updated_at_utc = now;

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
            let state = self.state.read().unwrap();
            Ok(state
                .actions
                .iter()
                .find(|a| a.booking_id == booking_id && a.event_type == event_type)
                .cloned())
        })
    }
}

impl NotificationLog for InMemoryPipeline {
    fn find(
        &self,
        tenant_id: &str,
        idempotency_key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<NotificationLogEntry>>> + Send + '_>> {
        let tenant_id = tenant_id.to_string();
        let idempotency_key = idempotency_key.to_string();
        Box::pin(async move {
            let state = self.state.read().unwrap();
            Ok(state
                .log
                .iter()
                .find(|e| e.tenant_id == tenant_id && e.idempotency_key == idempotency_key)
                .cloned())
        })
    }

    fn append(
        &self,
        entry: NewNotificationLogEntry,
    ) -> Pin<Box<dyn Future<Output = Result<NotificationLogEntry>> + Send + '_>> {
        Box::pin(async move {
            let row = NotificationLogEntry {
                id: Uuid::new_v4(),
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
                created_at_utc: Utc::now(),
            };
            self.state.write().unwrap().log.push(row.clone());
            Ok(row)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_entry() -> NewQueueEntry {
        NewQueueEntry {
            aggregate_type: "booking".to_string(),
            aggregate_id: "42".to_string(),
            event_type: "booking.confirmed".to_string(),
            topic: "booking-events".to_string(),
            payload: serde_json::json!({}),
            headers: serde_json::json!({}),
            tenant_id: "acme".to_string(),
            entity_id: Some("prop-7".to_string()),
            schema_version: 1,
            correlation_id: None,
        }
    }

    #[tokio::test]
    async fn insert_fans_out_per_role() {
        let pipeline = InMemoryPipeline::new();
        pipeline.insert(new_entry());

        assert_eq!(pipeline.entries_for(ConsumerRole::Dispatch).len(), 1);
        assert_eq!(pipeline.entries_for(ConsumerRole::Materialize).len(), 1);
    }

    #[tokio::test]
    async fn claim_flips_to_processing_and_respects_batch_size() {
        let pipeline = InMemoryPipeline::new();
        for _ in 0..5 {
            pipeline.insert_for(ConsumerRole::Dispatch, new_entry());
        }

        let claimed = pipeline
            .claim_due(ConsumerRole::Dispatch, 3, Utc::now())
            .await
            .unwrap();
        assert_eq!(claimed.len(), 3);
        for entry in &claimed {
            assert_eq!(entry.status, QueueEntryStatus::Processing);
        }

        // Claimed rows are not claimable again.
        let second = pipeline
            .claim_due(ConsumerRole::Dispatch, 10, Utc::now())
            .await
            .unwrap();
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn claim_ignores_other_roles() {
        let pipeline = InMemoryPipeline::new();
        pipeline.insert_for(ConsumerRole::Materialize, new_entry());

        let claimed = pipeline
            .claim_due(ConsumerRole::Dispatch, 10, Utc::now())
            .await
            .unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn materialize_is_idempotent() {
        let pipeline = InMemoryPipeline::new();
        let id = pipeline.insert_for(ConsumerRole::Materialize, new_entry());
        let now = Utc::now();
        pipeline.claim_due(ConsumerRole::Materialize, 1, now).await.unwrap();

        let first = pipeline
            .materialize(id, "42", "booking.confirmed", now, now)
            .await
            .unwrap();
        assert_eq!(first, MaterializeOutcome::Applied { action_created: true });

        // Entry is Published now, so a re-run reports it finalized.
        let second = pipeline
            .materialize(id, "42", "booking.confirmed", now, now)
            .await
            .unwrap();
        assert_eq!(second, MaterializeOutcome::AlreadyFinalized);
        assert_eq!(pipeline.actions().len(), 1);
    }
}
