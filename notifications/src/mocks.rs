//! Mock channel adapters for testing.
//!
//! Each mock records the calls it receives and can be scripted to fail, so
//! tests can assert both that a send happened and, just as important here,
//! that the idempotency ledger prevented one.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning is a test bug, not a documented panic

use crate::channels::{
    ChannelError, ChannelReceipt, ChannelResult, EmailChannel, GuestMessage, SmsChannel,
    WhatsAppChannel,
};
use std::sync::{Arc, RwLock};

/// One recorded mock send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSend {
    /// Destination address or number.
    pub to: String,
    /// Message body handed to the channel.
    pub body: String,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<RecordedSend>,
    should_succeed: bool,
}

macro_rules! mock_channel {
    ($name:ident, $provider:literal) => {
        /// Mock channel adapter: records calls, succeeds or fails on demand.
        #[derive(Clone, Debug)]
        pub struct $name {
            state: Arc<RwLock<MockState>>,
        }

        impl $name {
            /// Create a mock that accepts every send.
            #[must_use]
            pub fn new() -> Self {
                Self {
                    state: Arc::new(RwLock::new(MockState {
                        calls: Vec::new(),
                        should_succeed: true,
                    })),
                }
            }

            /// Create a mock that rejects every send.
            #[must_use]
            pub fn failing() -> Self {
                let mock = Self::new();
                mock.state.write().unwrap().should_succeed = false;
                mock
            }

            /// Calls received so far, in order.
            #[must_use]
            pub fn calls(&self) -> Vec<RecordedSend> {
                self.state.read().unwrap().calls.clone()
            }

            fn record(&self, to: &str, body: &str) -> ChannelResult {
                let mut state = self.state.write().unwrap();
                state.calls.push(RecordedSend {
                    to: to.to_string(),
                    body: body.to_string(),
                });
                if state.should_succeed {
                    Ok(ChannelReceipt {
                        provider: $provider.to_string(),
                        provider_message_id: Some(format!("{}-{}", $provider, state.calls.len())),
                    })
                } else {
                    Err(ChannelError::Provider("mock failure".to_string()))
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

mock_channel!(MockEmailChannel, "mock-email");
mock_channel!(MockSmsChannel, "mock-sms");
mock_channel!(MockWhatsAppChannel, "mock-whatsapp");

impl EmailChannel for MockEmailChannel {
    async fn send(&self, to: &str, message: &GuestMessage) -> ChannelResult {
        self.record(to, &message.body)
    }
}

impl SmsChannel for MockSmsChannel {
    async fn send(&self, to: &str, text: &str) -> ChannelResult {
        self.record(to, text)
    }
}

impl WhatsAppChannel for MockWhatsAppChannel {
    async fn send(&self, to: &str, text: &str) -> ChannelResult {
        self.record(to, text)
    }
}
