//! # Stayline Notifications
//!
//! Idempotent multi-channel guest notifications.
//!
//! Given a booking event, [`NotificationSender`] fans out over the fixed
//! channel order Email → SMS → WhatsApp, consulting the persisted
//! notification log before every send: the existence of a ledger entry for
//! `(tenant, idempotency key)`, successful or not, suppresses the attempt.
//! Invoking the sender twice with the same payload therefore produces no
//! duplicate guest-visible sends, which is what makes it a safe consumer of
//! the pipeline's at-least-once delivery.
//!
//! Channel transports are small capability traits ([`channels`]) with one
//! production adapter and one mock each, selected at process start:
//!
//! - [`providers::SmtpEmailChannel`] / [`providers::ConsoleEmailChannel`]
//! - [`providers::HttpSmsChannel`] / [`providers::ConsoleSmsChannel`]
//! - [`providers::HttpWhatsAppChannel`] / [`providers::ConsoleWhatsAppChannel`]
//! - [`mocks`] (feature `test-utils`, on by default)

pub use channels::{
    ChannelError, ChannelReceipt, EmailChannel, GuestMessage, SmsChannel, WhatsAppChannel,
};
pub use sender::{ChannelOutcome, NotificationReport, NotificationSender};

pub mod channels;
#[cfg(feature = "test-utils")]
pub mod mocks;
pub mod providers;
pub mod sender;
