//! SMTP e-mail channel adapter using Lettre.

use crate::channels::{ChannelError, ChannelReceipt, ChannelResult, EmailChannel, GuestMessage};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

/// E-mail channel that sends real mail via an SMTP relay.
///
/// # Configuration
///
/// - `smtp_server`: relay address (e.g. "smtp.postmarkapp.com")
/// - `smtp_port`: usually 587 for STARTTLS
/// - `smtp_username` / `smtp_password`: relay credentials
/// - `from_email` / `from_name`: sender identity on outgoing mail
#[derive(Clone)]
pub struct SmtpEmailChannel {
    transport: SmtpTransport,
    from: String,
}

impl SmtpEmailChannel {
    /// Create a new SMTP channel.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Provider`] if the relay address is invalid.
    pub fn new(
        smtp_server: &str,
        smtp_port: u16,
        smtp_username: String,
        smtp_password: String,
        from_email: &str,
        from_name: &str,
    ) -> Result<Self, ChannelError> {
        let transport = SmtpTransport::starttls_relay(smtp_server)
            .map_err(|e| ChannelError::Provider(format!("Invalid SMTP relay: {e}")))?
            .port(smtp_port)
            .credentials(Credentials::new(smtp_username, smtp_password))
            .build();

        Ok(Self {
            transport,
            from: format!("{from_name} <{from_email}>"),
        })
    }
}

impl EmailChannel for SmtpEmailChannel {
    async fn send(&self, to: &str, message: &GuestMessage) -> ChannelResult {
        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| ChannelError::InvalidAddress(format!("from: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| ChannelError::InvalidAddress(format!("{to}: {e}")))?)
            .subject(&message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| ChannelError::Provider(format!("Failed to build message: {e}")))?;

        // Lettre's SMTP transport is blocking; keep it off the async executor.
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| ChannelError::Provider(format!("Send task failed: {e}")))?
            .map_err(|e| ChannelError::Provider(e.to_string()))?;

        tracing::debug!(to = %to, subject = %message.subject, "E-mail accepted by SMTP relay");

        // SMTP relays don't return a stable message id at submission time.
        Ok(ChannelReceipt {
            provider: "smtp".to_string(),
            provider_message_id: None,
        })
    }
}
