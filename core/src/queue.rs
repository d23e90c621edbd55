//! The durable event queue: the transactional outbox of the pipeline.
//!
//! # Overview
//!
//! A [`QueueEntry`] is a durable record of a domain fact ("booking
//! confirmed"), inserted by a producing service *inside the same database
//! transaction* as the business write that produced it. Background workers
//! later claim entries and deliver them: the dispatch worker publishes to the
//! external bus, the materialize worker turns recognized events into
//! scheduled follow-up actions.
//!
//! # Per-consumer queues
//!
//! Each entry belongs to exactly one [`ConsumerRole`]. Producers fan out one
//! row per role at insert time, so the dispatch and materialize workers drain
//! independent queues and can never contend for the same row. Instances
//! *within* a role partition the backlog through the lock-and-skip claim in
//! [`QueueStore::claim_due`].
//!
//! # Status lifecycle
//!
//! ```text
//! Pending ──claim──▶ Processing ──success──▶ Published   (terminal)
//!    ▲                   │
//!    └────reschedule─────┤ attempt < max, backoff applied
//!                        └──exhausted──▶ Failed          (terminal, operator)
//! ```
//!
//! Entries are never deleted; published and failed rows remain as the audit
//! trail of the pipeline.

use crate::store::{Result, StoreError};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// The worker role a queue entry is addressed to.
///
/// Producers write one row per role (fan-out), giving every consumer its own
/// logical queue inside the shared table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumerRole {
    /// The claim-and-dispatch worker: publishes entries to the external bus.
    Dispatch,
    /// The claim-and-materialize worker: converts recognized entries into
    /// scheduled follow-up actions.
    Materialize,
}

impl ConsumerRole {
    /// All roles a producer fans out to.
    pub const ALL: [Self; 2] = [Self::Dispatch, Self::Materialize];

    /// Convert role to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Materialize => "materialize",
        }
    }

    /// Parse a role from its database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the string doesn't match a known role.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "dispatch" => Ok(Self::Dispatch),
            "materialize" => Ok(Self::Materialize),
            _ => Err(StoreError::Database(format!("Invalid consumer role: {s}"))),
        }
    }
}

/// Status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEntryStatus {
    /// Waiting to be claimed (or rescheduled for a later attempt).
    Pending,
    /// Claimed by a worker; a delivery attempt is in flight.
    Processing,
    /// Delivered. Terminal.
    Published,
    /// Attempts exhausted. Terminal; requires operator remediation.
    Failed,
}

impl QueueEntryStatus {
    /// Convert status to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Published => "published",
            Self::Failed => "failed",
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
            "processing" => Ok(Self::Processing),
            "published" => Ok(Self::Published),
            "failed" => Ok(Self::Failed),
            _ => Err(StoreError::Database(format!("Invalid queue status: {s}"))),
        }
    }
}

/// A durable outbox row.
///
/// # Invariants
///
/// - `status == Published` implies `published_at_utc` is set and
///   `next_attempt_utc` is `None`
/// - `status == Failed` implies `next_attempt_utc` is `None`; the row is
///   permanently excluded from polling
/// - `attempt_count` never decreases for a given `id`
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// Globally unique entry id. Doubles as the bus message id, so duplicate
    /// deliveries across retries are detectable downstream.
    pub id: Uuid,
    /// The consumer role this row is addressed to.
    pub consumer: ConsumerRole,
    /// Aggregate kind the event belongs to (e.g. `"booking"`).
    pub aggregate_type: String,
    /// Identifier of the aggregate instance (e.g. the booking id).
    pub aggregate_id: String,
    /// Event type name (e.g. `"booking.confirmed"`).
    pub event_type: String,
    /// Destination topic on the external bus.
    pub topic: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Transport headers attached by the producer.
    pub headers: serde_json::Value,
    /// Owning tenant.
    pub tenant_id: String,
    /// Session/partition key material; combined with the tenant to derive the
    /// bus session id.
    pub entity_id: Option<String>,
    /// Payload schema version.
    pub schema_version: i32,
    /// Correlation id for tracing a fact across systems.
    pub correlation_id: Option<String>,
    /// Current lifecycle status.
    pub status: QueueEntryStatus,
    /// Number of delivery attempts recorded so far.
    pub attempt_count: i32,
    /// Earliest time the next attempt may run. `None` means due now.
    pub next_attempt_utc: Option<DateTime<Utc>>,
    /// Error message from the most recent failed attempt.
    pub last_error: Option<String>,
    /// When the producer inserted the row.
    pub created_at_utc: DateTime<Utc>,
    /// When the row reached `Published`.
    pub published_at_utc: Option<DateTime<Utc>>,
    /// Last mutation time.
    pub updated_at_utc: DateTime<Utc>,
}

impl QueueEntry {
    /// Bus session id for partitioned/ordered delivery: `"{tenant}:{entity}"`.
    ///
    /// `None` when the producer supplied no entity id; the bus then makes no
    /// ordering guarantee for this aggregate's messages.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.entity_id
            .as_ref()
            .map(|entity| format!("{}:{}", self.tenant_id, entity))
    }

    /// Whether this entry is due for processing at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueEntryStatus::Pending
            && self.next_attempt_utc.is_none_or(|at| at <= now)
    }
}

/// Producer-side data for a new queue entry.
///
/// One `NewQueueEntry` fans out into one row per [`ConsumerRole`]; each row
/// gets its own id at insert time.
#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    /// Aggregate kind the event belongs to.
    pub aggregate_type: String,
    /// Identifier of the aggregate instance.
    pub aggregate_id: String,
    /// Event type name.
    pub event_type: String,
    /// Destination topic on the external bus.
    pub topic: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Transport headers.
    pub headers: serde_json::Value,
    /// Owning tenant.
    pub tenant_id: String,
    /// Session/partition key material.
    pub entity_id: Option<String>,
    /// Payload schema version.
    pub schema_version: i32,
    /// Correlation id for cross-system tracing.
    pub correlation_id: Option<String>,
}

/// Storage seam for the event queue, as seen by the workers.
///
/// # Claim discipline
///
/// [`claim_due`](Self::claim_due) must atomically select due pending rows for
/// one consumer role, flip them to `Processing`, and commit, using
/// `SELECT ... FOR UPDATE SKIP LOCKED` semantics (or an equivalent atomic
/// conditional update) so concurrent claimants partition the backlog instead
/// of double-processing rows. The claim transaction is kept short; per-row
/// work happens afterwards in its own transactions.
///
/// # Dyn Compatibility
///
/// Methods return explicit `Pin<Box<dyn Future>>` instead of `async fn` so
/// the workers can hold an `Arc<dyn QueueStore>` chosen at process start.
pub trait QueueStore: Send + Sync {
    /// Claim up to `batch_size` due pending rows for `consumer`.
    ///
    /// Returns the claimed rows already flipped to `Processing`, ordered by
    /// `next_attempt_utc` (falling back to `created_at_utc`) ascending. Rows
    /// locked by a concurrent claimant are skipped, never waited on.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the claim fails.
    fn claim_due(
        &self,
        consumer: ConsumerRole,
        batch_size: usize,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<QueueEntry>>> + Send + '_>>;

    /// Fetch a single entry by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn fetch(&self, id: Uuid) -> Pin<Box<dyn Future<Output = Result<Option<QueueEntry>>> + Send + '_>>;

    /// Record the start of a delivery attempt: increment `attempt_count` and
    /// persist it before the attempt runs, so a crash mid-attempt still
    /// counts. Returns the new attempt count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the entry doesn't exist, or
    /// [`StoreError::Database`] if the update fails.
    fn begin_attempt(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<i32>> + Send + '_>>;

    /// Finalize an entry as delivered: `Published`, `published_at_utc = now`,
    /// `next_attempt_utc` cleared.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    fn mark_published(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Record a failed attempt and return the entry to `Pending`, due again
    /// at `next_attempt_utc`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    fn reschedule(
        &self,
        id: Uuid,
        attempt_count: i32,
        error: &str,
        next_attempt_utc: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Record terminal exhaustion: `Failed`, `next_attempt_utc` cleared. The
    /// row is excluded from all subsequent claims.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    fn mark_failed(
        &self,
        id: Uuid,
        attempt_count: i32,
        error: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Count pending rows for one consumer role. Operational visibility only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn pending_count(
        &self,
        consumer: ConsumerRole,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in &[
            QueueEntryStatus::Pending,
            QueueEntryStatus::Processing,
            QueueEntryStatus::Published,
            QueueEntryStatus::Failed,
        ] {
            let parsed = QueueEntryStatus::parse(status.as_str()).expect("valid status");
            assert_eq!(*status, parsed);
        }
    }

    #[test]
    fn status_invalid() {
        assert!(QueueEntryStatus::parse("shipped").is_err());
    }

    #[test]
    fn role_roundtrip() {
        for role in ConsumerRole::ALL {
            assert_eq!(ConsumerRole::parse(role.as_str()).unwrap(), role);
        }
        assert!(ConsumerRole::parse("janitor").is_err());
    }

    fn entry(entity_id: Option<&str>) -> QueueEntry {
        QueueEntry {
            id: Uuid::new_v4(),
            consumer: ConsumerRole::Dispatch,
            aggregate_type: "booking".to_string(),
            aggregate_id: "42".to_string(),
            event_type: "booking.confirmed".to_string(),
            topic: "booking-events".to_string(),
            payload: serde_json::json!({}),
            headers: serde_json::json!({}),
            tenant_id: "acme".to_string(),
            entity_id: entity_id.map(String::from),
            schema_version: 1,
            correlation_id: None,
            status: QueueEntryStatus::Pending,
            attempt_count: 0,
            next_attempt_utc: None,
            last_error: None,
            created_at_utc: Utc::now(),
            published_at_utc: None,
            updated_at_utc: Utc::now(),
        }
    }

    #[test]
    fn session_id_derivation() {
        assert_eq!(
            entry(Some("prop-7")).session_id().as_deref(),
            Some("acme:prop-7")
        );
        assert_eq!(entry(None).session_id(), None);
    }

    #[test]
    fn due_when_no_next_attempt() {
        assert!(entry(None).is_due(Utc::now()));
    }

    #[test]
    fn not_due_before_next_attempt() {
        let mut e = entry(None);
        e.next_attempt_utc = Some(Utc::now() + chrono::Duration::seconds(30));
        assert!(!e.is_due(Utc::now()));
    }

    #[test]
    fn terminal_entries_are_never_due() {
        let mut e = entry(None);
        e.status = QueueEntryStatus::Failed;
        assert!(!e.is_due(Utc::now()));
    }
}
