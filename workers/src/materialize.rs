//! Claim-and-materialize worker: queue entries → scheduled follow-up actions.
//!
//! The materializer drains its own queue (the producer fans out one row per
//! consumer role) and converts recognized booking events into scheduled
//! actions, at most one per `(booking_id, event_type)` pair. Event types it
//! does not recognize are passed through (marked `Published` untouched)
//! because the row only existed for the dispatch path's benefit.
//!
//! # Transaction discipline
//!
//! The claim runs in its own short transaction (claim + status flip +
//! commit) so locks release immediately. Each row is then processed in a
//! separate transaction: re-check the row is still `Processing`, look up the
//! action before inserting, flip the row `Published`, all or nothing, which
//! is what makes a double run of the same entry yield exactly one action.
//!
//! Processing errors (storage failures, undeserializable payloads) put the
//! row back on the queue with exponential backoff until its attempts run
//! out; the loop itself never dies on a row.

use crate::config::MaterializeConfig;
use chrono::{DateTime, Utc};
use stayline_core::actions::{ActionStore, MaterializeOutcome};
use stayline_core::backoff::backoff_delay;
use stayline_core::booking::{BookingEvent, event_types};
use stayline_core::queue::{ConsumerRole, QueueEntry, QueueEntryStatus, QueueStore};
use stayline_core::store::Result;
use std::sync::Arc;
use tokio::sync::watch;

/// Due time of the follow-up action for a recognized event type, or `None`
/// for events the materializer passes through.
///
/// Confirmation and cancellation follow-ups are due immediately: the action
/// sender owns any further pacing.
fn follow_up_due_at(event_type: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match event_type {
        event_types::BOOKING_CONFIRMED | event_types::BOOKING_CANCELLED => Some(now),
        _ => None,
    }
}

/// Background worker that materializes recognized events into scheduled
/// actions.
///
/// Returned together with its shutdown sender by [`MaterializeWorker::new`];
/// send `true` to stop the loop after the in-flight row completes.
pub struct MaterializeWorker {
    queue: Arc<dyn QueueStore>,
    actions: Arc<dyn ActionStore>,
    config: MaterializeConfig,
    shutdown: watch::Receiver<bool>,
}

impl MaterializeWorker {
    /// Create a new materialize worker.
    #[must_use]
    pub fn new(
        queue: Arc<dyn QueueStore>,
        actions: Arc<dyn ActionStore>,
        config: MaterializeConfig,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Self {
            queue,
            actions,
            config,
            shutdown: shutdown_rx,
        };
        (worker, shutdown_tx)
    }

    /// Run the poll loop until a shutdown signal is received.
    ///
    /// Claim failures and row-level errors are logged and absorbed; the loop
    /// continues after its normal delay so the worker self-heals once a
    /// transient outage passes.
    pub async fn run(&mut self) {
        tracing::info!(
            batch_size = self.config.batch_size,
            poll_interval_s = self.config.poll_interval.as_secs(),
            max_attempts = self.config.max_attempts,
            "Materialize worker started"
        );

        while !*self.shutdown.borrow() {
            match self.run_once().await {
                Ok(processed) if processed > 0 => {
                    tracing::debug!(processed, "Materialize cycle complete");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Materialize cycle failed; retrying after delay");
                }
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.poll_interval) => {}
                _ = self.shutdown.changed() => {}
            }
        }

        tracing::info!("Materialize worker stopped");
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
        let batch = self
            .queue
            .claim_due(
                ConsumerRole::Materialize,
                self.config.batch_size,
                Utc::now(),
            )
            .await?;
        let claimed = batch.len();

        for entry in batch {
            // Cancellation is honored between rows, never mid-row.
            if *self.shutdown.borrow() {
                break;
            }
            if let Err(reason) = self.try_process(&entry).await {
                self.record_failure(&entry, &reason).await;
            }
        }

        Ok(claimed)
    }

    /// Process one claimed entry. Returns `Err` with a human-readable reason
    /// for anything that should count as a failed attempt.
    async fn try_process(&self, entry: &QueueEntry) -> std::result::Result<(), String> {
        // Re-fetch: a concurrent instance may have finished this row between
        // our claim and now.
        let current = self
            .queue
            .fetch(entry.id)
            .await
            .map_err(|e| e.to_string())?;
        let Some(current) = current else {
            tracing::warn!(entry_id = %entry.id, "Claimed entry vanished; skipping");
            return Ok(());
        };
        if current.status != QueueEntryStatus::Processing {
            tracing::debug!(
                entry_id = %entry.id,
                status = current.status.as_str(),
                "Entry already finalized elsewhere; skipping"
            );
            return Ok(());
        }

        let now = Utc::now();
        let Some(due_at) = follow_up_due_at(&entry.event_type, now) else {
            // Only relevant to the dispatch path; nothing to materialize.
            self.queue
                .mark_published(entry.id, now)
                .await
                .map_err(|e| e.to_string())?;
            metrics::counter!("pipeline.materialize.passed_through").increment(1);
            tracing::debug!(
                entry_id = %entry.id,
                event_type = %entry.event_type,
                "Unrecognized event type; passed through"
            );
            return Ok(());
        };

        let event = BookingEvent::from_json(&entry.payload)
            .map_err(|e| format!("Undeserializable payload: {e}"))?;

        let outcome = self
            .actions
            .materialize(entry.id, &event.booking_id, &entry.event_type, due_at, now)
            .await
            .map_err(|e| e.to_string())?;

        match outcome {
            MaterializeOutcome::Applied { action_created: true } => {
                metrics::counter!(
                    "pipeline.materialize.actions_created",
                    "event_type" => entry.event_type.clone()
                )
                .increment(1);
                tracing::info!(
                    entry_id = %entry.id,
                    booking_id = %event.booking_id,
                    event_type = %entry.event_type,
                    due_at = %due_at,
                    "Scheduled action created"
                );
            }
            MaterializeOutcome::Applied { action_created: false } => {
                tracing::debug!(
                    entry_id = %entry.id,
                    booking_id = %event.booking_id,
                    event_type = %entry.event_type,
                    "Scheduled action already exists; entry finalized"
                );
            }
            MaterializeOutcome::AlreadyFinalized => {
                tracing::debug!(entry_id = %entry.id, "Entry finalized by concurrent worker");
            }
        }

        Ok(())
    }

    /// Fold a processing failure into the entry's retry state.
    async fn record_failure(&self, entry: &QueueEntry, error: &str) {
        let attempt = entry.attempt_count + 1;
        if attempt >= self.config.max_attempts {
            if let Err(e) = self.queue.mark_failed(entry.id, attempt, error).await {
                tracing::error!(entry_id = %entry.id, error = %e, "Failed to mark entry failed");
                return;
            }
            metrics::counter!("pipeline.materialize.exhausted").increment(1);
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
                .queue
                .reschedule(entry.id, attempt, error, next_attempt)
                .await
            {
                tracing::error!(entry_id = %entry.id, error = %e, "Failed to reschedule entry");
                return;
            }
            metrics::counter!("pipeline.materialize.retried").increment(1);
            tracing::warn!(
                entry_id = %entry.id,
                event_type = %entry.event_type,
                attempt,
                next_attempt = %next_attempt,
                error,
                "Materialization failed; rescheduled"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_events_are_due_immediately() {
        let now = Utc::now();
        assert_eq!(follow_up_due_at("booking.confirmed", now), Some(now));
        assert_eq!(follow_up_due_at("booking.cancelled", now), Some(now));
    }

    #[test]
    fn unrecognized_events_have_no_follow_up() {
        let now = Utc::now();
        assert_eq!(follow_up_due_at("guest.signup", now), None);
        assert_eq!(follow_up_due_at("payment.captured", now), None);
    }
}
