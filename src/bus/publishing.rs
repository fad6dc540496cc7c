// chainwatch - Outbound Publishing Queue
// Bounded FIFO between classification and the bus, with load-shed eviction

use super::{Broker, BusError};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// A message waiting to be published
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub exchange: String,
    pub routing_key: String,
    pub payload: serde_json::Value,
}

/// Bounded outbound queue. When full, the oldest `drop_count` entries are
/// evicted before the newest is appended, so under sustained overload the
/// queue sheds stale alerts and keeps FIFO order for the rest.
#[derive(Debug)]
pub struct PublishingQueue {
    max_size: usize,
    drop_count: usize,
    queue: VecDeque<OutboundMessage>,
    evicted: u64,
}

impl PublishingQueue {
    pub fn new(max_size: usize) -> Self {
        Self::with_drop_count(max_size, 1)
    }

    /// A queue that evicts `drop_count` oldest entries on overflow.
    /// `drop_count` is clamped to at least 1.
    pub fn with_drop_count(max_size: usize, drop_count: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            drop_count: drop_count.max(1),
            queue: VecDeque::new(),
            evicted: 0,
        }
    }

    /// Append a message, evicting the oldest entries if the queue is full
    pub fn enqueue(&mut self, message: OutboundMessage) {
        if self.queue.len() >= self.max_size {
            for _ in 0..self.drop_count {
                if let Some(dropped) = self.queue.pop_front() {
                    self.evicted += 1;
                    warn!(
                        routing_key = %dropped.routing_key,
                        "publishing queue full, dropping oldest entry"
                    );
                }
            }
        }
        self.queue.push_back(message);
    }

    /// Publish queued messages in FIFO order with confirms. Stops at the
    /// first failure, keeping the failed message and everything behind it
    /// queued for the next round. Returns how many messages went out.
    pub async fn flush(&mut self, broker: &Broker) -> Result<usize, BusError> {
        let mut sent = 0;
        while let Some(message) = self.queue.front() {
            let confirm = broker
                .publish(&message.exchange, &message.routing_key, message.payload.clone())
                .await?;
            if !confirm.routed {
                return Err(BusError::MessageNotDelivered(format!(
                    "no queue bound for routing key {}",
                    message.routing_key
                )));
            }
            debug!(routing_key = %message.routing_key, "published queued message");
            self.queue.pop_front();
            sent += 1;
        }
        Ok(sent)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total entries dropped by eviction since creation
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Routing keys currently queued, oldest first
    pub fn routing_keys(&self) -> Vec<&str> {
        self.queue.iter().map(|m| m.routing_key.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ExchangeKind;

    fn message(n: u32) -> OutboundMessage {
        OutboundMessage {
            exchange: "alert".to_string(),
            routing_key: format!("alert.system.{}", n),
            payload: serde_json::json!({ "n": n }),
        }
    }

    #[test]
    fn test_eviction_keeps_fifo_order() {
        let mut queue = PublishingQueue::new(3);
        for n in 0..3 {
            queue.enqueue(message(n));
        }
        // Queue full: the oldest entry goes, order of the rest is preserved
        queue.enqueue(message(3));
        assert_eq!(queue.len(), 3);
        assert_eq!(
            queue.routing_keys(),
            vec!["alert.system.1", "alert.system.2", "alert.system.3"]
        );
        assert_eq!(queue.evicted(), 1);
    }

    #[test]
    fn test_configurable_drop_count() {
        let mut queue = PublishingQueue::with_drop_count(3, 2);
        for n in 0..3 {
            queue.enqueue(message(n));
        }
        queue.enqueue(message(3));
        assert_eq!(
            queue.routing_keys(),
            vec!["alert.system.2", "alert.system.3"]
        );
        assert_eq!(queue.evicted(), 2);
    }

    #[tokio::test]
    async fn test_flush_publishes_in_order() {
        let broker = Broker::new();
        broker.declare_exchange("alert", ExchangeKind::Topic).await;
        broker.declare_queue("sink").await;
        broker.bind_queue("sink", "alert", "alert.#").await.unwrap();

        let mut queue = PublishingQueue::new(10);
        for n in 0..3 {
            queue.enqueue(message(n));
        }
        let sent = queue.flush(&broker).await.unwrap();
        assert_eq!(sent, 3);
        assert!(queue.is_empty());

        let mut receiver = broker.consume("sink").await.unwrap();
        for n in 0..3 {
            let delivery = receiver.recv().await.unwrap();
            assert_eq!(delivery.payload["n"], n);
        }
    }

    #[tokio::test]
    async fn test_flush_keeps_messages_on_unrouted_publish() {
        let broker = Broker::new();
        broker.declare_exchange("alert", ExchangeKind::Topic).await;
        // No queue bound: nothing can be routed

        let mut queue = PublishingQueue::new(10);
        queue.enqueue(message(0));
        queue.enqueue(message(1));
        let result = queue.flush(&broker).await;
        assert!(result.is_err());
        assert_eq!(queue.len(), 2);
    }
}
