//! SMS gateway adapter speaking a JSON HTTP API.

use crate::channels::{ChannelError, ChannelReceipt, ChannelResult, SmsChannel};
use serde::Deserialize;

/// SMS channel that posts messages to a gateway's JSON API with bearer
/// authentication.
#[derive(Clone)]
pub struct HttpSmsChannel {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_number: String,
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    message_id: Option<String>,
}

impl HttpSmsChannel {
    /// Create a new gateway adapter.
    #[must_use]
    pub fn new(api_url: String, api_key: String, from_number: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            from_number,
        }
    }
}

impl SmsChannel for HttpSmsChannel {
    async fn send(&self, to: &str, text: &str) -> ChannelResult {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.from_number,
                "to": to,
                "body": text,
            }))
            .send()
            .await
            .map_err(|e| ChannelError::Provider(e.to_string()))?
            .error_for_status()
            .map_err(|e| ChannelError::Provider(e.to_string()))?;

        let body: GatewayResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::Provider(format!("Malformed gateway response: {e}")))?;

        tracing::debug!(to = %to, message_id = ?body.message_id, "SMS accepted by gateway");

        Ok(ChannelReceipt {
            provider: "sms-gateway".to_string(),
            provider_message_id: body.message_id,
        })
    }
}
