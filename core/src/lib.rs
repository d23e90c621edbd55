//! # Stayline Core
//!
//! Domain types and trait seams for the Stayline delivery pipeline.
//!
//! Stayline is the reliable-delivery core of a property/booking backend:
//! domain facts are recorded as durable queue entries inside the business
//! transaction that produced them, and background workers later turn those
//! entries into external bus messages, internal follow-up actions, and guest
//! notifications.
//!
//! ## Core Concepts
//!
//! - **Queue entry**: the outbox row, a durable record of a domain event
//!   written atomically with the producing transaction ([`queue`])
//! - **Claim**: atomically marking a batch of rows as owned by one worker so
//!   concurrent instances partition the backlog ([`queue::QueueStore`])
//! - **Materialize**: converting a recognized event into a schedulable
//!   follow-up action, exactly once per booking and event type ([`actions`])
//! - **Idempotency ledger**: the notification log that guarantees at most one
//!   recorded send attempt per event, booking, and channel ([`notifications`])
//! - **Bus publisher**: the narrow seam to the external message bus ([`bus`])
//!
//! ## Delivery Semantics
//!
//! The pipeline is at-least-once end to end. The bus may receive a message
//! whose local status write later fails, and workers may re-claim rows after
//! a crash, so every downstream consumer is expected to be
//! idempotent, exactly as this crate's own ledger-gated sender is.

// Re-export commonly used types
pub use actions::{ActionStore, MaterializeOutcome, ScheduledAction, ScheduledActionStatus};
pub use backoff::backoff_delay;
pub use booking::BookingEvent;
pub use bus::{BusError, BusPublisher, OutboundMessage};
pub use notifications::{
    Channel, NewNotificationLogEntry, NotificationLog, NotificationLogEntry, NotificationStatus,
    idempotency_key,
};
pub use queue::{ConsumerRole, NewQueueEntry, QueueEntry, QueueEntryStatus, QueueStore};
pub use store::{Result, StoreError};

pub mod actions;
pub mod backoff;
pub mod booking;
pub mod bus;
pub mod notifications;
pub mod queue;
pub mod store;
