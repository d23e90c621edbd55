//! Scheduled follow-up actions materialized from queue entries.
//!
//! A [`ScheduledAction`] is an internal follow-up job derived from a domain
//! event: a guest notification to send, a reminder to fire. The materialize
//! worker creates at most one action per `(booking_id, event_type)` pair;
//! a separate, externally scheduled sender job (outside this crate) later
//! drains due actions and flips them to `Completed`/`Failed`.

use crate::store::{Result, StoreError};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// Status of a scheduled action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledActionStatus {
    /// Created, waiting for its due time.
    Pending,
    /// Handed to the sender job.
    Published,
    /// Sender job finished it.
    Completed,
    /// Sender job gave up on it.
    Failed,
    /// Cancelled before it ran (e.g. booking cancelled).
    Cancelled,
}

impl ScheduledActionStatus {
    /// Convert status to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Published => "published",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse a status from its database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "published" => Ok(Self::Published),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(StoreError::Database(format!("Invalid action status: {s}"))),
        }
    }
}

/// A pending internal follow-up for one booking and event type.
///
/// Invariant: at most one action exists per `(booking_id, event_type)`;
/// the materializer enforces this by lookup-before-insert inside its own
/// transaction.
#[derive(Debug, Clone)]
pub struct ScheduledAction {
    /// Unique action id.
    pub id: Uuid,
    /// The booking this follow-up belongs to.
    pub booking_id: String,
    /// The event type that produced it.
    pub event_type: String,
    /// When the follow-up becomes due.
    pub due_at_utc: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: ScheduledActionStatus,
    /// When the sender job picked it up.
    pub published_at_utc: Option<DateTime<Utc>>,
    /// When the sender job finished it.
    pub completed_at_utc: Option<DateTime<Utc>>,
    /// Sender-job attempt count.
    pub attempt_count: i32,
    /// Error from the sender job's last failed attempt.
    pub last_error: Option<String>,
}

/// Outcome of one materialization transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// The queue entry was flipped to `Published`.
    Applied {
        /// Whether a new action row was inserted, or one already existed for
        /// this `(booking_id, event_type)` pair.
        action_created: bool,
    },
    /// The queue entry was no longer `Processing`: a concurrent worker
    /// already finalized it. Nothing was written.
    AlreadyFinalized,
}

/// Storage seam for scheduled actions, as seen by the materialize worker.
///
/// # Dyn Compatibility
///
/// Methods return explicit `Pin<Box<dyn Future>>` instead of `async fn` so
/// the worker can hold an `Arc<dyn ActionStore>` chosen at process start.
pub trait ActionStore: Send + Sync {
    /// Materialize one claimed queue entry in a single transaction:
    ///
    /// 1. re-check the entry is still `Processing` (abort with
    ///    [`MaterializeOutcome::AlreadyFinalized`] otherwise);
    /// 2. look up an action for `(booking_id, event_type)` and insert one due
    ///    at `due_at_utc` only if absent;
    /// 3. flip the queue entry to `Published`.
    ///
    /// Running the lookup and insert under the same transaction as the entry
    /// re-check is what makes double materialization safe: a second run finds
    /// either the existing action or an already-finalized entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the transaction fails; the caller
    /// treats that as an attempt failure and applies backoff.
    fn materialize(
        &self,
        entry_id: Uuid,
        booking_id: &str,
        event_type: &str,
        due_at_utc: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<MaterializeOutcome>> + Send + '_>>;

    /// Look up the action for one `(booking_id, event_type)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn find(
        &self,
        booking_id: &str,
        event_type: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ScheduledAction>>> + Send + '_>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in &[
            ScheduledActionStatus::Pending,
            ScheduledActionStatus::Published,
            ScheduledActionStatus::Completed,
            ScheduledActionStatus::Failed,
            ScheduledActionStatus::Cancelled,
        ] {
            let parsed = ScheduledActionStatus::parse(status.as_str()).expect("valid status");
            assert_eq!(*status, parsed);
        }
    }

    #[test]
    fn status_invalid() {
        assert!(ScheduledActionStatus::parse("paused").is_err());
    }
}
