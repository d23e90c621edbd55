//! Channel capability traits.
//!
//! One small trait per guest channel, abstracting over the concrete delivery
//! service (SMTP relay, SMS gateway, WhatsApp Business API). The sender is
//! generic over these traits so the adapters are chosen at process start and
//! monomorphized in; no runtime type inspection.

use std::future::Future;
use thiserror::Error;

/// Errors a channel adapter can report.
///
/// Channel errors never propagate out of the sender: they are folded into
/// the notification log as a `Failed` entry and, by policy, never retried.
#[derive(Error, Debug, Clone)]
pub enum ChannelError {
    /// The delivery provider rejected the message or was unreachable.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The destination address was malformed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// What a channel adapter reports back on success.
#[derive(Debug, Clone)]
pub struct ChannelReceipt {
    /// Name of the provider that accepted the message.
    pub provider: String,
    /// Provider-side message id, when the provider returns one.
    pub provider_message_id: Option<String>,
}

/// Result alias for channel sends.
pub type ChannelResult = Result<ChannelReceipt, ChannelError>;

/// A rendered message for channels that carry a subject line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestMessage {
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// E-mail delivery capability.
pub trait EmailChannel: Send + Sync {
    /// Send one e-mail.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if the address is invalid or the provider
    /// rejects the message.
    fn send(&self, to: &str, message: &GuestMessage)
    -> impl Future<Output = ChannelResult> + Send;
}

/// SMS delivery capability.
pub trait SmsChannel: Send + Sync {
    /// Send one text message.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if the number is invalid or the provider
    /// rejects the message.
    fn send(&self, to: &str, text: &str) -> impl Future<Output = ChannelResult> + Send;
}

/// WhatsApp delivery capability.
pub trait WhatsAppChannel: Send + Sync {
    /// Send one WhatsApp message.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if the number is invalid or the provider
    /// rejects the message.
    fn send(&self, to: &str, text: &str) -> impl Future<Output = ChannelResult> + Send;
}
