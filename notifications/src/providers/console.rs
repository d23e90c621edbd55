//! Console channel adapters for development.
//!
//! These log the message instead of delivering it, so the full pipeline can
//! run locally without provider credentials.

use crate::channels::{
    ChannelReceipt, ChannelResult, EmailChannel, GuestMessage, SmsChannel, WhatsAppChannel,
};

fn receipt() -> ChannelResult {
    Ok(ChannelReceipt {
        provider: "console".to_string(),
        provider_message_id: None,
    })
}

/// E-mail channel that logs instead of sending.
#[derive(Clone, Debug, Default)]
pub struct ConsoleEmailChannel;

impl ConsoleEmailChannel {
    /// Create a new console e-mail channel.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EmailChannel for ConsoleEmailChannel {
    async fn send(&self, to: &str, message: &GuestMessage) -> ChannelResult {
        tracing::info!(
            to = %to,
            subject = %message.subject,
            body = %message.body,
            "E-mail (console mode)"
        );
        receipt()
    }
}

/// SMS channel that logs instead of sending.
#[derive(Clone, Debug, Default)]
pub struct ConsoleSmsChannel;

impl ConsoleSmsChannel {
    /// Create a new console SMS channel.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SmsChannel for ConsoleSmsChannel {
    async fn send(&self, to: &str, text: &str) -> ChannelResult {
        tracing::info!(to = %to, text = %text, "SMS (console mode)");
        receipt()
    }
}

/// WhatsApp channel that logs instead of sending.
#[derive(Clone, Debug, Default)]
pub struct ConsoleWhatsAppChannel;

impl ConsoleWhatsAppChannel {
    /// Create a new console WhatsApp channel.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl WhatsAppChannel for ConsoleWhatsAppChannel {
    async fn send(&self, to: &str, text: &str) -> ChannelResult {
        tracing::info!(to = %to, text = %text, "WhatsApp message (console mode)");
        receipt()
    }
}
