//! The notification log: idempotency ledger and audit trail for guest sends.
//!
//! Every channel send attempt writes exactly one [`NotificationLogEntry`],
//! keyed by `(tenant_id, idempotency_key)`. The *existence* of an entry,
//! whether it recorded `Sent` or `Failed`, suppresses any further attempt
//! for that event, booking, and channel. Failed sends are deliberately never
//! auto-retried; remediation is an operator decision, not a loop.

use crate::store::{Result, StoreError};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// A guest notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Transactional e-mail.
    Email,
    /// SMS text message.
    Sms,
    /// WhatsApp message.
    WhatsApp,
}

impl Channel {
    /// The fixed fan-out order the sender walks for every event.
    pub const ORDERED: [Self; 3] = [Self::Email, Self::Sms, Self::WhatsApp];

    /// Channel name as stored and as used in idempotency keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "Email",
            Self::Sms => "SMS",
            Self::WhatsApp => "WhatsApp",
        }
    }

    /// Parse a channel from its stored representation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the string doesn't match a known channel.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Email" => Ok(Self::Email),
            "SMS" => Ok(Self::Sms),
            "WhatsApp" => Ok(Self::WhatsApp),
            _ => Err(StoreError::Database(format!("Invalid channel: {s}"))),
        }
    }
}

/// Outcome recorded for a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    /// The provider accepted the message (or there was nothing to send).
    Sent,
    /// The provider rejected the message. Not retried.
    Failed,
    /// Reserved for asynchronous providers that confirm later.
    Pending,
}

impl NotificationStatus {
    /// Convert status to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Pending => "pending",
        }
    }

    /// Parse a status from its database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "pending" => Ok(Self::Pending),
            _ => Err(StoreError::Database(format!(
                "Invalid notification status: {s}"
            ))),
        }
    }
}

/// Deterministic key identifying "this exact guest-visible effect":
/// `"{event_type}:{aggregate_id}:{channel}"`.
#[must_use]
pub fn idempotency_key(event_type: &str, aggregate_id: &str, channel: Channel) -> String {
    format!("{event_type}:{aggregate_id}:{}", channel.as_str())
}

/// One recorded send attempt. Immutable once written.
#[derive(Debug, Clone)]
pub struct NotificationLogEntry {
    /// Unique entry id.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: String,
    /// Booking the notification concerns.
    pub booking_id: String,
    /// Guest the notification was addressed to.
    pub guest_id: String,
    /// Channel the attempt went out on.
    pub channel: Channel,
    /// Event type that triggered the notification.
    pub event_type: String,
    /// Destination address, if the guest had one for this channel.
    pub to_address: Option<String>,
    /// Correlation id for cross-system tracing.
    pub correlation_id: Option<String>,
    /// Suppression key; see [`idempotency_key`].
    pub idempotency_key: String,
    /// Provider that handled the send, if one was called.
    pub provider: Option<String>,
    /// Provider-side message id, if the provider returned one.
    pub provider_message_id: Option<String>,
    /// Recorded outcome.
    pub status: NotificationStatus,
    /// Attempts recorded (always 1 under the no-retry policy).
    pub attempt_count: i32,
    /// When the provider accepted the message.
    pub sent_at_utc: Option<DateTime<Utc>>,
    /// When the entry was written.
    pub created_at_utc: DateTime<Utc>,
}

/// Data for a new ledger entry.
#[derive(Debug, Clone)]
pub struct NewNotificationLogEntry {
    /// Owning tenant.
    pub tenant_id: String,
    /// Booking the notification concerns.
    pub booking_id: String,
    /// Guest the notification was addressed to.
    pub guest_id: String,
    /// Channel the attempt went out on.
    pub channel: Channel,
    /// Event type that triggered the notification.
    pub event_type: String,
    /// Destination address, if any.
    pub to_address: Option<String>,
    /// Correlation id for cross-system tracing.
    pub correlation_id: Option<String>,
    /// Suppression key; see [`idempotency_key`].
    pub idempotency_key: String,
    /// Provider that handled the send, if one was called.
    pub provider: Option<String>,
    /// Provider-side message id, if any.
    pub provider_message_id: Option<String>,
    /// Recorded outcome.
    pub status: NotificationStatus,
    /// When the provider accepted the message.
    pub sent_at_utc: Option<DateTime<Utc>>,
}

/// Storage seam for the notification ledger.
///
/// # Dyn Compatibility
///
/// Methods return explicit `Pin<Box<dyn Future>>` instead of `async fn` so
/// the sender can hold an `Arc<dyn NotificationLog>` chosen at process start.
pub trait NotificationLog: Send + Sync {
    /// Look up the entry for `(tenant_id, idempotency_key)`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn find(
        &self,
        tenant_id: &str,
        idempotency_key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<NotificationLogEntry>>> + Send + '_>>;

    /// Append one entry. Entries are never updated afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    fn append(
        &self,
        entry: NewNotificationLogEntry,
    ) -> Pin<Box<dyn Future<Output = Result<NotificationLogEntry>> + Send + '_>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn channel_roundtrip() {
        for channel in Channel::ORDERED {
            assert_eq!(Channel::parse(channel.as_str()).unwrap(), channel);
        }
        assert!(Channel::parse("Pigeon").is_err());
    }

    #[test]
    fn status_roundtrip() {
        for status in &[
            NotificationStatus::Sent,
            NotificationStatus::Failed,
            NotificationStatus::Pending,
        ] {
            assert_eq!(
                NotificationStatus::parse(status.as_str()).unwrap(),
                *status
            );
        }
    }

    #[test]
    fn key_format() {
        assert_eq!(
            idempotency_key("booking.confirmed", "42", Channel::Email),
            "booking.confirmed:42:Email"
        );
        assert_eq!(
            idempotency_key("booking.confirmed", "42", Channel::Sms),
            "booking.confirmed:42:SMS"
        );
        assert_eq!(
            idempotency_key("booking.cancelled", "b-9", Channel::WhatsApp),
            "booking.cancelled:b-9:WhatsApp"
        );
    }

    #[test]
    fn fan_out_order_is_fixed() {
        assert_eq!(
            Channel::ORDERED,
            [Channel::Email, Channel::Sms, Channel::WhatsApp]
        );
    }
}
