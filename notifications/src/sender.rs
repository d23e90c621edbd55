//! The idempotent notification sender.
//!
//! # Protocol per channel (fixed order: Email, SMS, WhatsApp)
//!
//! 1. Compute the idempotency key `"{event_type}:{booking_id}:{channel}"`.
//! 2. If the notification log already holds an entry for
//!    `(tenant, key)`, skip. A prior `Failed` entry suppresses exactly like
//!    a `Sent` one: failed sends are never auto-retried, by policy.
//! 3. Otherwise perform the channel send. A guest with no contact value for
//!    the channel is a trivial success with no provider call.
//! 4. Persist exactly one log entry recording the outcome, whatever it was.
//!
//! The result is that calling the sender any number of times with the same
//! payload produces at most one guest-visible send per channel.

use crate::channels::{EmailChannel, GuestMessage, SmsChannel, WhatsAppChannel};
use chrono::Utc;
use stayline_core::booking::{BookingEvent, event_types};
use stayline_core::notifications::{
    Channel, NewNotificationLogEntry, NotificationLog, NotificationStatus, idempotency_key,
};
use stayline_core::store::Result;
use std::sync::Arc;

/// What happened on one channel during a sender invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// The provider accepted the message; a `Sent` entry was recorded.
    Sent,
    /// The provider rejected the message; a `Failed` entry was recorded and
    /// will not be retried.
    Failed,
    /// A ledger entry already existed; nothing was sent or recorded.
    Suppressed,
    /// The guest has no contact value for this channel; recorded as `Sent`
    /// with no provider call.
    NoContact,
}

/// Per-channel outcomes of one sender invocation.
#[derive(Debug, Clone)]
pub struct NotificationReport {
    /// Outcomes in channel fan-out order.
    pub outcomes: Vec<(Channel, ChannelOutcome)>,
}

impl NotificationReport {
    /// Outcome recorded for one channel, if it was visited.
    #[must_use]
    pub fn outcome_for(&self, channel: Channel) -> Option<ChannelOutcome> {
        self.outcomes
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, outcome)| *outcome)
    }

    /// Number of channels on which a provider accepted a message.
    #[must_use]
    pub fn sent(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == ChannelOutcome::Sent)
            .count()
    }
}

/// Fans a booking event out over the guest channels, gated by the
/// notification log.
///
/// Generic over the channel capabilities so adapters are chosen at process
/// start: production wiring passes the SMTP and HTTP adapters, tests pass
/// mocks.
pub struct NotificationSender<E, S, W> {
    log: Arc<dyn NotificationLog>,
    email: E,
    sms: S,
    whatsapp: W,
}

impl<E, S, W> NotificationSender<E, S, W>
where
    E: EmailChannel,
    S: SmsChannel,
    W: WhatsAppChannel,
{
    /// Create a new sender over the given ledger and channel adapters.
    pub fn new(log: Arc<dyn NotificationLog>, email: E, sms: S, whatsapp: W) -> Self {
        Self {
            log,
            email,
            sms,
            whatsapp,
        }
    }

    /// Send the notifications for one booking event across all channels.
    ///
    /// Safe to call repeatedly with the same payload: the ledger suppresses
    /// every channel that already has an entry.
    ///
    /// # Errors
    ///
    /// Returns a store error if the ledger cannot be read or written.
    /// Channel failures do *not* surface here; they are recorded as
    /// `Failed` entries and reported in the [`NotificationReport`].
    pub async fn send_booking_notifications(
        &self,
        event_type: &str,
        event: &BookingEvent,
        correlation_id: Option<&str>,
    ) -> Result<NotificationReport> {
        let mut outcomes = Vec::with_capacity(Channel::ORDERED.len());

        for channel in Channel::ORDERED {
            let outcome = self
                .send_on_channel(channel, event_type, event, correlation_id)
                .await?;
            outcomes.push((channel, outcome));
        }

        Ok(NotificationReport { outcomes })
    }

    async fn send_on_channel(
        &self,
        channel: Channel,
        event_type: &str,
        event: &BookingEvent,
        correlation_id: Option<&str>,
    ) -> Result<ChannelOutcome> {
        let key = idempotency_key(event_type, &event.booking_id, channel);

        if self.log.find(&event.tenant_id, &key).await?.is_some() {
            metrics::counter!("pipeline.notifications.suppressed", "channel" => channel.as_str())
                .increment(1);
            tracing::debug!(
                booking_id = %event.booking_id,
                channel = channel.as_str(),
                idempotency_key = %key,
                "Notification already attempted; suppressed"
            );
            return Ok(ChannelOutcome::Suppressed);
        }

        let contact = match channel {
            Channel::Email => event.guest_email.as_deref(),
            Channel::Sms | Channel::WhatsApp => event.guest_phone.as_deref(),
        };

        let new_entry = |to: Option<&str>| NewNotificationLogEntry {
            tenant_id: event.tenant_id.clone(),
            booking_id: event.booking_id.clone(),
            guest_id: event.guest_id.clone(),
            channel,
            event_type: event_type.to_string(),
            to_address: to.map(String::from),
            correlation_id: correlation_id.map(String::from),
            idempotency_key: key.clone(),
            provider: None,
            provider_message_id: None,
            status: NotificationStatus::Sent,
            sent_at_utc: None,
        };

        let Some(to) = contact else {
            // Nothing to deliver: record the trivial success so the channel
            // is not revisited if the guest adds contact details later.
            self.log.append(new_entry(None)).await?;
            tracing::debug!(
                booking_id = %event.booking_id,
                channel = channel.as_str(),
                "No contact value; recorded trivial success"
            );
            return Ok(ChannelOutcome::NoContact);
        };

        let result = match channel {
            Channel::Email => {
                let message = render_email(event_type, event);
                self.email.send(to, &message).await
            }
            Channel::Sms => self.sms.send(to, &render_text(event_type, event)).await,
            Channel::WhatsApp => {
                self.whatsapp
                    .send(to, &render_text(event_type, event))
                    .await
            }
        };

        match result {
            Ok(receipt) => {
                let mut entry = new_entry(Some(to));
                entry.provider = Some(receipt.provider);
                entry.provider_message_id = receipt.provider_message_id;
                entry.sent_at_utc = Some(Utc::now());
                self.log.append(entry).await?;

                metrics::counter!("pipeline.notifications.sent", "channel" => channel.as_str())
                    .increment(1);
                tracing::info!(
                    booking_id = %event.booking_id,
                    channel = channel.as_str(),
                    to = %to,
                    "Notification sent"
                );
                Ok(ChannelOutcome::Sent)
            }
            Err(e) => {
                let mut entry = new_entry(Some(to));
                entry.status = NotificationStatus::Failed;
                self.log.append(entry).await?;

                metrics::counter!("pipeline.notifications.failed", "channel" => channel.as_str())
                    .increment(1);
                tracing::warn!(
                    booking_id = %event.booking_id,
                    channel = channel.as_str(),
                    to = %to,
                    error = %e,
                    "Notification failed; recorded and not retried"
                );
                Ok(ChannelOutcome::Failed)
            }
        }
    }
}

/// Render the e-mail for one event type.
fn render_email(event_type: &str, event: &BookingEvent) -> GuestMessage {
    match event_type {
        event_types::BOOKING_CANCELLED => GuestMessage {
            subject: format!("Booking cancelled: {}", event.property_name),
            body: format!(
                "Hi {}, your booking at {} ({} to {}) has been cancelled. \
                 If this wasn't you, please contact us.",
                event.guest_name, event.property_name, event.check_in, event.check_out
            ),
        },
        _ => GuestMessage {
            subject: format!("Booking confirmed: {}", event.property_name),
            body: format!(
                "Hi {}, your stay at {} from {} to {} is confirmed. \
                 We look forward to hosting you!",
                event.guest_name, event.property_name, event.check_in, event.check_out
            ),
        },
    }
}

/// Render the short text used for SMS and WhatsApp.
fn render_text(event_type: &str, event: &BookingEvent) -> String {
    match event_type {
        event_types::BOOKING_CANCELLED => format!(
            "{}: your booking at {} ({} to {}) has been cancelled.",
            event.guest_name, event.property_name, event.check_in, event.check_out
        ),
        _ => format!(
            "{}: your stay at {} from {} to {} is confirmed.",
            event.guest_name, event.property_name, event.check_in, event.check_out
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::mocks::{MockEmailChannel, MockSmsChannel, MockWhatsAppChannel};
    use chrono::NaiveDate;
    use stayline_testing::InMemoryPipeline;

    fn event() -> BookingEvent {
        BookingEvent {
            booking_id: "42".to_string(),
            tenant_id: "acme".to_string(),
            guest_id: "g-100".to_string(),
            guest_name: "Ada Lovelace".to_string(),
            guest_email: Some("ada@example.com".to_string()),
            guest_phone: Some("+15551234567".to_string()),
            property_name: "Seaview Cottage".to_string(),
            check_in: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2026, 9, 5).unwrap(),
        }
    }

    struct Harness {
        pipeline: InMemoryPipeline,
        email: MockEmailChannel,
        sms: MockSmsChannel,
        whatsapp: MockWhatsAppChannel,
        sender: NotificationSender<MockEmailChannel, MockSmsChannel, MockWhatsAppChannel>,
    }

    fn harness_with_email(email: MockEmailChannel) -> Harness {
        let pipeline = InMemoryPipeline::new();
        let sms = MockSmsChannel::new();
        let whatsapp = MockWhatsAppChannel::new();
        let sender = NotificationSender::new(
            Arc::new(pipeline.clone()),
            email.clone(),
            sms.clone(),
            whatsapp.clone(),
        );
        Harness {
            pipeline,
            email,
            sms,
            whatsapp,
            sender,
        }
    }

    fn harness() -> Harness {
        harness_with_email(MockEmailChannel::new())
    }

    // Scenario D / P3: a second identical invocation adds no entries and
    // triggers no provider calls.
    #[tokio::test]
    async fn double_invocation_yields_one_entry_per_channel() {
        let h = harness();
        let event = event();

        let first = h
            .sender
            .send_booking_notifications("booking.confirmed", &event, Some("corr-1"))
            .await
            .unwrap();
        assert_eq!(first.sent(), 3);

        let second = h
            .sender
            .send_booking_notifications("booking.confirmed", &event, Some("corr-1"))
            .await
            .unwrap();
        for (_, outcome) in &second.outcomes {
            assert_eq!(*outcome, ChannelOutcome::Suppressed);
        }

        let entries = h.pipeline.log_entries();
        assert_eq!(entries.len(), 3);
        assert!(
            entries
                .iter()
                .any(|e| e.idempotency_key == "booking.confirmed:42:Email")
        );
        assert_eq!(h.email.calls().len(), 1);
        assert_eq!(h.sms.calls().len(), 1);
        assert_eq!(h.whatsapp.calls().len(), 1);
    }

    #[tokio::test]
    async fn outcomes_follow_fixed_channel_order() {
        let h = harness();
        let report = h
            .sender
            .send_booking_notifications("booking.confirmed", &event(), None)
            .await
            .unwrap();

        let channels: Vec<Channel> = report.outcomes.iter().map(|(c, _)| *c).collect();
        assert_eq!(channels, Channel::ORDERED);
    }

    // A failed send is recorded once and never retried, even though it failed.
    #[tokio::test]
    async fn failed_send_is_recorded_and_not_retried() {
        let h = harness_with_email(MockEmailChannel::failing());
        let event = event();

        let first = h
            .sender
            .send_booking_notifications("booking.confirmed", &event, None)
            .await
            .unwrap();
        assert_eq!(first.outcome_for(Channel::Email), Some(ChannelOutcome::Failed));

        let second = h
            .sender
            .send_booking_notifications("booking.confirmed", &event, None)
            .await
            .unwrap();
        assert_eq!(
            second.outcome_for(Channel::Email),
            Some(ChannelOutcome::Suppressed)
        );

        // One Email attempt ever, one Failed entry ever.
        assert_eq!(h.email.calls().len(), 1);
        let email_entries: Vec<_> = h
            .pipeline
            .log_entries()
            .into_iter()
            .filter(|e| e.channel == Channel::Email)
            .collect();
        assert_eq!(email_entries.len(), 1);
        assert_eq!(email_entries[0].status, NotificationStatus::Failed);
    }

    // No contact value: trivial success, no provider call, entry still written.
    #[tokio::test]
    async fn missing_contact_is_a_trivial_success() {
        let h = harness();
        let mut event = event();
        event.guest_phone = None;

        let report = h
            .sender
            .send_booking_notifications("booking.confirmed", &event, None)
            .await
            .unwrap();
        assert_eq!(report.outcome_for(Channel::Email), Some(ChannelOutcome::Sent));
        assert_eq!(
            report.outcome_for(Channel::Sms),
            Some(ChannelOutcome::NoContact)
        );
        assert_eq!(
            report.outcome_for(Channel::WhatsApp),
            Some(ChannelOutcome::NoContact)
        );

        assert!(h.sms.calls().is_empty());
        assert!(h.whatsapp.calls().is_empty());

        let sms_entry = h
            .pipeline
            .log_entries()
            .into_iter()
            .find(|e| e.channel == Channel::Sms)
            .unwrap();
        assert_eq!(sms_entry.status, NotificationStatus::Sent);
        assert_eq!(sms_entry.to_address, None);
        assert_eq!(sms_entry.provider, None);
        assert_eq!(sms_entry.sent_at_utc, None);
    }

    #[tokio::test]
    async fn entries_carry_provider_receipts_and_metadata() {
        let h = harness();
        h.sender
            .send_booking_notifications("booking.confirmed", &event(), Some("corr-9"))
            .await
            .unwrap();

        let email_entry = h
            .pipeline
            .log_entries()
            .into_iter()
            .find(|e| e.channel == Channel::Email)
            .unwrap();
        assert_eq!(email_entry.tenant_id, "acme");
        assert_eq!(email_entry.booking_id, "42");
        assert_eq!(email_entry.guest_id, "g-100");
        assert_eq!(email_entry.to_address.as_deref(), Some("ada@example.com"));
        assert_eq!(email_entry.correlation_id.as_deref(), Some("corr-9"));
        assert_eq!(email_entry.provider.as_deref(), Some("mock-email"));
        assert!(email_entry.provider_message_id.is_some());
        assert!(email_entry.sent_at_utc.is_some());
    }

    #[test]
    fn cancellation_renders_its_own_copy() {
        let email = render_email("booking.cancelled", &event());
        assert!(email.subject.contains("cancelled"));
        let text = render_text("booking.cancelled", &event());
        assert!(text.contains("cancelled"));

        let confirmed = render_email("booking.confirmed", &event());
        assert!(confirmed.subject.contains("confirmed"));
    }
}
