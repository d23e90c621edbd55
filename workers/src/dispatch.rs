//! Claim-and-dispatch worker: queue entries → external bus.
//!
//! # Protocol per poll cycle
//!
//! 1. Claim up to `batch_size` due pending rows for the dispatch role (the
//!    claim flips them to `Processing` and commits immediately).
//! 2. For each row, sequentially: record the attempt, publish, finalize.
//!    Success marks the row `Published`; failure reschedules it with
//!    exponential backoff, or fails it terminally once attempts are
//!    exhausted.
//! 3. Sleep `poll_interval`; repeat until shutdown.
//!
//! The attempt count is persisted *before* the publish runs, so a crash
//! between publish and finalize still counts the attempt, and may hand the
//! bus a duplicate on the retry. That is the at-least-once contract:
//! consumers deduplicate on the message id.
//!
//! A missing bus configuration disables the worker: [`DispatchWorker::run`]
//! logs once and parks until shutdown instead of polling.

use crate::config::DispatchConfig;
use chrono::Utc;
use stayline_core::backoff::backoff_delay;
use stayline_core::bus::{BusPublisher, OutboundMessage};
use stayline_core::queue::{ConsumerRole, QueueEntry, QueueStore};
use stayline_core::store::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Background worker that publishes queue entries to the external bus.
///
/// Returned together with its shutdown sender by [`DispatchWorker::new`];
/// send `true` to stop the loop after the in-flight row completes.
pub struct DispatchWorker {
    store: Arc<dyn QueueStore>,
    bus: Option<Arc<dyn BusPublisher>>,
    config: DispatchConfig,
    shutdown: watch::Receiver<bool>,
}

impl DispatchWorker {
    /// Create a new dispatch worker.
    ///
    /// `bus` is `None` when the process has no bus configuration; the worker
    /// then no-ops cleanly instead of crashing.
    #[must_use]
    pub fn new(
        store: Arc<dyn QueueStore>,
        bus: Option<Arc<dyn BusPublisher>>,
        config: DispatchConfig,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Self {
            store,
            bus,
            config,
            shutdown: shutdown_rx,
        };
        (worker, shutdown_tx)
    }

    /// Run the poll loop until a shutdown signal is received.
    ///
    /// The loop never dies on its own: claim failures and row-level errors
    /// are logged and retried after the normal delay, so the worker heals
    /// itself once a transient outage (e.g. a database blip) passes.
    pub async fn run(&mut self) {
        if self.bus.is_none() {
            tracing::warn!("No bus configured; dispatch worker is disabled");
            while self.shutdown.changed().await.is_ok() {
                if *self.shutdown.borrow() {
                    break;
                }
            }
            return;
        }

        tracing::info!(
            batch_size = self.config.batch_size,
            poll_interval_s = self.config.poll_interval.as_secs(),
            max_attempts = self.config.max_attempts,
            "Dispatch worker started"
        );

        while !*self.shutdown.borrow() {
            match self.run_once().await {
                Ok(dispatched) if dispatched > 0 => {
                    tracing::debug!(dispatched, "Dispatch cycle complete");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Dispatch cycle failed; retrying after delay");
                }
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.poll_interval) => {}
                _ = self.shutdown.changed() => {}
            }
        }

        tracing::info!("Dispatch worker stopped");
    }

    /// Execute one poll cycle: claim a batch and process it sequentially.
    ///
    /// Returns the number of rows claimed. Exposed so hosts and tests can
    /// drive cycles without the timer loop.
    ///
    /// # Errors
    ///
    /// Returns the claim-step store error; row-level failures are absorbed
    /// into the rows' own retry state.
    pub async fn run_once(&self) -> Result<usize> {
        let Some(bus) = self.bus.as_deref() else {
            return Ok(0);
        };

        let batch = self
            .store
            .claim_due(ConsumerRole::Dispatch, self.config.batch_size, Utc::now())
            .await?;
        let claimed = batch.len();

        for entry in batch {
            // Cancellation is honored between rows, never mid-row.
            if *self.shutdown.borrow() {
                break;
            }
            self.process_entry(bus, &entry).await;
        }

        Ok(claimed)
    }

    /// Attempt delivery of one claimed entry. Never propagates errors: every
    /// outcome is folded into the entry's own status.
    async fn process_entry(&self, bus: &dyn BusPublisher, entry: &QueueEntry) {
        let attempt = match self.store.begin_attempt(entry.id, Utc::now()).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(entry_id = %entry.id, error = %e, "Failed to record attempt");
                return;
            }
        };

        let message = outbound_message(entry);
        match bus.publish(&message).await {
            Ok(()) => {
                if let Err(e) = self.store.mark_published(entry.id, Utc::now()).await {
                    // The bus accepted the message but the status write
                    // failed: the row stays in processing for operator
                    // remediation, and consumers may see a duplicate.
                    tracing::error!(entry_id = %entry.id, error = %e, "Publish succeeded but status write failed");
                    return;
                }
                metrics::counter!("pipeline.dispatch.published", "topic" => entry.topic.clone())
                    .increment(1);
                tracing::debug!(
                    entry_id = %entry.id,
                    topic = %entry.topic,
                    event_type = %entry.event_type,
                    attempt,
                    "Entry published"
                );
            }
            Err(e) => self.record_failure(entry, attempt, &e.to_string()).await,
        }
    }

    /// Fold a failed publish into the entry's retry state.
    async fn record_failure(&self, entry: &QueueEntry, attempt: i32, error: &str) {
        if attempt >= self.config.max_attempts {
            if let Err(e) = self.store.mark_failed(entry.id, attempt, error).await {
                tracing::error!(entry_id = %entry.id, error = %e, "Failed to mark entry failed");
                return;
            }
            metrics::counter!("pipeline.dispatch.exhausted").increment(1);
            tracing::error!(
                entry_id = %entry.id,
                event_type = %entry.event_type,
                attempt,
                error,
                "Entry failed terminally; operator intervention required"
            );
        } else {
            let next_attempt = Utc::now() + backoff_delay(attempt);
            if let Err(e) = self
                .store
                .reschedule(entry.id, attempt, error, next_attempt)
                .await
            {
                tracing::error!(entry_id = %entry.id, error = %e, "Failed to reschedule entry");
                return;
            }
            metrics::counter!("pipeline.dispatch.retried").increment(1);
            tracing::warn!(
                entry_id = %entry.id,
                event_type = %entry.event_type,
                attempt,
                next_attempt = %next_attempt,
                error,
                "Publish failed; rescheduled"
            );
        }
    }
}

/// Build the bus message for one queue entry.
///
/// The message id is the entry id (stable across retries); the session id is
/// the tenant/entity pair when present; producer headers become application
/// properties, with the event envelope fields layered on top.
fn outbound_message(entry: &QueueEntry) -> OutboundMessage {
    let mut properties = HashMap::new();
    if let Some(headers) = entry.headers.as_object() {
        for (key, value) in headers {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            properties.insert(key.clone(), rendered);
        }
    }
    properties.insert("event_type".to_string(), entry.event_type.clone());
    properties.insert("aggregate_type".to_string(), entry.aggregate_type.clone());
    properties.insert("aggregate_id".to_string(), entry.aggregate_id.clone());
    properties.insert("tenant_id".to_string(), entry.tenant_id.clone());
    properties.insert("schema_version".to_string(), entry.schema_version.to_string());
    if let Some(correlation_id) = &entry.correlation_id {
        properties.insert("correlation_id".to_string(), correlation_id.clone());
    }

    OutboundMessage {
        topic: entry.topic.clone(),
        message_id: entry.id,
        session_id: entry.session_id(),
        properties,
        body: entry.payload.to_string().into_bytes(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use stayline_core::queue::QueueEntryStatus;
    use uuid::Uuid;

    fn entry() -> QueueEntry {
        QueueEntry {
            id: Uuid::new_v4(),
            consumer: ConsumerRole::Dispatch,
            aggregate_type: "booking".to_string(),
            aggregate_id: "42".to_string(),
            event_type: "booking.confirmed".to_string(),
            topic: "booking-events".to_string(),
            payload: serde_json::json!({"booking_id": "42"}),
            headers: serde_json::json!({"x-origin": "pms", "x-retries": 2}),
            tenant_id: "acme".to_string(),
            entity_id: Some("prop-7".to_string()),
            schema_version: 3,
            correlation_id: Some("corr-1".to_string()),
            status: QueueEntryStatus::Processing,
            attempt_count: 1,
            next_attempt_utc: None,
            last_error: None,
            created_at_utc: Utc::now(),
            published_at_utc: None,
            updated_at_utc: Utc::now(),
        }
    }

    #[test]
    fn message_id_is_entry_id() {
        let e = entry();
        assert_eq!(outbound_message(&e).message_id, e.id);
    }

    #[test]
    fn session_id_combines_tenant_and_entity() {
        let message = outbound_message(&entry());
        assert_eq!(message.session_id.as_deref(), Some("acme:prop-7"));
    }

    #[test]
    fn properties_merge_headers_and_envelope() {
        let message = outbound_message(&entry());
        assert_eq!(message.properties["x-origin"], "pms");
        assert_eq!(message.properties["x-retries"], "2");
        assert_eq!(message.properties["event_type"], "booking.confirmed");
        assert_eq!(message.properties["schema_version"], "3");
        assert_eq!(message.properties["correlation_id"], "corr-1");
    }

    #[test]
    fn body_is_payload_json() {
        let message = outbound_message(&entry());
        let body: serde_json::Value = serde_json::from_slice(&message.body).unwrap();
        assert_eq!(body["booking_id"], "42");
    }
}
