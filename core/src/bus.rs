//! Bus publisher abstraction for delivering queue entries to an external bus.
//!
//! The dispatch worker speaks to the bus through [`BusPublisher`] only. A
//! production adapter (Kafka-compatible, see `stayline-redpanda`) and an
//! in-memory recording adapter (`stayline-testing`) both implement it; the
//! embedding process picks one at startup.
//!
//! # Delivery Semantics
//!
//! At-least-once. A publish can succeed on the bus while the local status
//! write fails, in which case the entry is retried and the bus sees the same
//! `message_id` again; downstream consumers deduplicate on it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when publishing to the bus.
#[derive(Error, Debug, Clone)]
pub enum BusError {
    /// Failed to connect to or configure the bus.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The bus rejected or timed out a publish.
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed.
        topic: String,
        /// The reason for failure.
        reason: String,
    },
}

/// One message bound for the external bus.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Destination topic.
    pub topic: String,
    /// Message id: the queue entry id, stable across retries so consumers
    /// can deduplicate.
    pub message_id: Uuid,
    /// Partition/ordering key (`"{tenant}:{entity}"`), if the producer
    /// supplied entity material. Absent means no ordering guarantee.
    pub session_id: Option<String>,
    /// Application properties carried as transport headers.
    pub properties: HashMap<String, String>,
    /// Serialized event payload.
    pub body: Vec<u8>,
}

/// Trait for bus publisher implementations.
///
/// # Dyn Compatibility
///
/// Returns explicit `Pin<Box<dyn Future>>` instead of `async fn` so the
/// dispatch worker can hold an `Arc<dyn BusPublisher>` selected at process
/// start.
pub trait BusPublisher: Send + Sync {
    /// Publish one message.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::PublishFailed`] if the bus rejects or times out
    /// the message; the caller applies its retry/backoff policy.
    fn publish(
        &self,
        message: &OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_error_display_names_topic() {
        let err = BusError::PublishFailed {
            topic: "booking-events".to_string(),
            reason: "broker unreachable".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("booking-events"));
        assert!(rendered.contains("broker unreachable"));
    }
}
