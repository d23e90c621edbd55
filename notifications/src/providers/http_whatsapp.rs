//! WhatsApp Business API adapter.

use crate::channels::{ChannelError, ChannelReceipt, ChannelResult, WhatsAppChannel};
use serde::Deserialize;

/// WhatsApp channel that posts text messages to the Business API.
#[derive(Clone)]
pub struct HttpWhatsAppChannel {
    client: reqwest::Client,
    api_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    messages: Vec<ApiMessageId>,
}

#[derive(Debug, Deserialize)]
struct ApiMessageId {
    id: String,
}

impl HttpWhatsAppChannel {
    /// Create a new Business API adapter.
    ///
    /// `api_url` is the phone-number-scoped messages endpoint.
    #[must_use]
    pub fn new(api_url: String, access_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            access_token,
        }
    }
}

impl WhatsAppChannel for HttpWhatsAppChannel {
    async fn send(&self, to: &str, text: &str) -> ChannelResult {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "text",
                "text": { "body": text },
            }))
            .send()
            .await
            .map_err(|e| ChannelError::Provider(e.to_string()))?
            .error_for_status()
            .map_err(|e| ChannelError::Provider(e.to_string()))?;

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::Provider(format!("Malformed API response: {e}")))?;

        let message_id = body.messages.into_iter().next().map(|m| m.id);
        tracing::debug!(to = %to, message_id = ?message_id, "WhatsApp message accepted");

        Ok(ChannelReceipt {
            provider: "whatsapp-business".to_string(),
            provider_message_id: message_id,
        })
    }
}
