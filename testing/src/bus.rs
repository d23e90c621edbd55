//! In-memory bus publisher with scripted failures.

use stayline_core::bus::{BusError, BusPublisher, OutboundMessage};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Bus publisher that records every message instead of sending it.
///
/// Failures can be scripted with [`fail_next`](Self::fail_next) to exercise
/// the dispatch worker's retry, backoff, and terminal-exhaustion paths.
///
/// # Example
///
/// ```
/// use stayline_testing::InMemoryBusPublisher;
///
/// let bus = InMemoryBusPublisher::new();
/// bus.fail_next(2); // first two publishes return PublishFailed
/// assert_eq!(bus.published().len(), 0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryBusPublisher {
    published: Arc<RwLock<Vec<OutboundMessage>>>,
    failures_remaining: Arc<AtomicUsize>,
}

impl InMemoryBusPublisher {
    /// Create a new recording publisher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` publishes fail with [`BusError::PublishFailed`].
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Snapshot of every successfully published message, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<OutboundMessage> {
        self.published.read().unwrap().clone()
    }

    /// Number of successfully published messages.
    #[must_use]
    pub fn published_count(&self) -> usize {
        self.published.read().unwrap().len()
    }
}

impl BusPublisher for InMemoryBusPublisher {
    fn publish(
        &self,
        message: &OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + '_>> {
        let message = message.clone();
        Box::pin(async move {
            let failing = self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(BusError::PublishFailed {
                    topic: message.topic,
                    reason: "scripted failure".to_string(),
                });
            }
            self.published.write().unwrap().push(message);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn message() -> OutboundMessage {
        OutboundMessage {
            topic: "booking-events".to_string(),
            message_id: Uuid::new_v4(),
            session_id: Some("acme:prop-7".to_string()),
            properties: HashMap::new(),
            body: b"{}".to_vec(),
        }
    }

    #[tokio::test]
    async fn records_published_messages() {
        let bus = InMemoryBusPublisher::new();
        bus.publish(&message()).await.unwrap();
        bus.publish(&message()).await.unwrap();
        assert_eq!(bus.published_count(), 2);
    }

    #[tokio::test]
    async fn scripted_failures_then_success() {
        let bus = InMemoryBusPublisher::new();
        bus.fail_next(2);

        assert!(bus.publish(&message()).await.is_err());
        assert!(bus.publish(&message()).await.is_err());
        assert!(bus.publish(&message()).await.is_ok());
        assert_eq!(bus.published_count(), 1);
    }
}
