//! Redpanda bus publisher for the Stayline delivery pipeline.
//!
//! Implements the [`BusPublisher`] trait from `stayline-core` over rdkafka,
//! so the dispatch worker can hand queue entries to any Kafka-compatible
//! broker (Redpanda, Apache Kafka, managed offerings).
//!
//! # Message mapping
//!
//! - **Key**: the message's session id (`"{tenant}:{entity}"`) when present,
//!   else the message id. Sessions with the same key land on the same
//!   partition, which is what gives per-aggregate ordering on brokers that
//!   honor it.
//! - **Headers**: the application properties, plus a `message-id` header
//!   carrying the queue entry id so consumers can deduplicate across the
//!   pipeline's at-least-once retries.
//! - **Payload**: the serialized event body, verbatim.
//!
//! Publish-only: the pipeline's consumers are external systems with their
//! own subscriptions.
//!
//! # Example
//!
//! ```no_run
//! use stayline_redpanda::RedpandaBusPublisher;
//!
//! # fn example() -> Result<(), stayline_core::bus::BusError> {
//! let bus = RedpandaBusPublisher::builder()
//!     .brokers("localhost:9092")
//!     .producer_acks("all")
//!     .compression("lz4")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use stayline_core::bus::{BusError, BusPublisher, OutboundMessage};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Kafka-compatible [`BusPublisher`] implementation.
pub struct RedpandaBusPublisher {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
}

impl RedpandaBusPublisher {
    /// Create a publisher with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ConnectionFailed`] if the producer cannot be
    /// created from the given broker list.
    pub fn new(brokers: &str) -> Result<Self, BusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a builder for configuring the publisher.
    #[must_use]
    pub fn builder() -> RedpandaBusPublisherBuilder {
        RedpandaBusPublisherBuilder::default()
    }

    /// The configured broker list.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

/// Builder for [`RedpandaBusPublisher`].
#[derive(Default)]
pub struct RedpandaBusPublisherBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
}

impl RedpandaBusPublisherBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: `"0"`, `"1"`, or `"all"`.
    ///
    /// Default: `"1"`
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: `"none"`, `"gzip"`, `"snappy"`, `"lz4"`,
    /// `"zstd"`.
    ///
    /// Default: `"none"`
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the per-message send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the publisher.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ConnectionFailed`] if brokers are not set or the
    /// producer cannot be created.
    pub fn build(self) -> Result<RedpandaBusPublisher, BusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| BusError::ConnectionFailed("Brokers not configured".to_string()))?;

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", self.producer_acks.as_deref().unwrap_or("1"))
            .set(
                "compression.type",
                self.compression.as_deref().unwrap_or("none"),
            );

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            BusError::ConnectionFailed(format!("Failed to create producer: {e}"))
        })?;

        tracing::info!(
            brokers = %brokers,
            acks = self.producer_acks.as_deref().unwrap_or("1"),
            compression = self.compression.as_deref().unwrap_or("none"),
            "Bus publisher created"
        );

        Ok(RedpandaBusPublisher {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
        })
    }
}

/// Partition key for a message: session id when present, message id otherwise.
fn partition_key(message: &OutboundMessage) -> String {
    message
        .session_id
        .clone()
        .unwrap_or_else(|| message.message_id.to_string())
}

impl BusPublisher for RedpandaBusPublisher {
    fn publish(
        &self,
        message: &OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + '_>> {
        let message = message.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let key = partition_key(&message);
            let message_id = message.message_id.to_string();

            let mut headers = OwnedHeaders::new().insert(Header {
                key: "message-id",
                value: Some(message_id.as_str()),
            });
            for (name, value) in &message.properties {
                headers = headers.insert(Header {
                    key: name,
                    value: Some(value.as_str()),
                });
            }

            let record = FutureRecord::to(&message.topic)
                .key(&key)
                .payload(&message.body)
                .headers(headers);

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %message.topic,
                        partition,
                        offset,
                        message_id = %message_id,
                        "Message published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %message.topic,
                        message_id = %message_id,
                        error = %kafka_error,
                        "Failed to publish message"
                    );
                    Err(BusError::PublishFailed {
                        topic: message.topic,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn message(session_id: Option<&str>) -> OutboundMessage {
        OutboundMessage {
            topic: "booking-events".to_string(),
            message_id: Uuid::new_v4(),
            session_id: session_id.map(String::from),
            properties: HashMap::new(),
            body: b"{}".to_vec(),
        }
    }

    #[test]
    fn builder_requires_brokers() {
        let result = RedpandaBusPublisher::builder().build();
        assert!(matches!(result, Err(BusError::ConnectionFailed(_))));
    }

    #[test]
    fn session_id_is_the_partition_key() {
        let m = message(Some("acme:prop-7"));
        assert_eq!(partition_key(&m), "acme:prop-7");
    }

    #[test]
    fn message_id_is_the_fallback_key() {
        let m = message(None);
        assert_eq!(partition_key(&m), m.message_id.to_string());
    }
}
