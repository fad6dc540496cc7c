// chainwatch - Message Bus
// In-process broker presenting the topic/direct exchange shape the pipeline
// is built against: wildcard bindings, publish confirms, acked deliveries

pub mod publishing;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

pub use publishing::{OutboundMessage, PublishingQueue};

/// Exchange routing behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeKind {
    /// Exact routing-key match
    Direct,
    /// AMQP-style wildcard match: `*` one word, `#` zero or more words
    Topic,
}

/// A message handed to a consumer. The delivery stays unsettled until the
/// consumer acks it; unsettled deliveries are handed out again when a
/// consumer re-attaches to the queue.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: Uuid,
    pub routing_key: String,
    pub payload: serde_json::Value,
    pub redelivered: bool,
}

/// Publisher confirm for one publish call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirm {
    /// Whether at least one bound queue received the message
    pub routed: bool,
}

/// Bus-level failures
#[derive(Debug, Clone, PartialEq)]
pub enum BusError {
    ExchangeNotFound(String),
    QueueNotFound(String),
    /// A message could not be placed on any queue
    MessageNotDelivered(String),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::ExchangeNotFound(name) => write!(f, "Exchange not found: {}", name),
            BusError::QueueNotFound(name) => write!(f, "Queue not found: {}", name),
            BusError::MessageNotDelivered(reason) => {
                write!(f, "Message could not be delivered: {}", reason)
            }
        }
    }
}

impl std::error::Error for BusError {}

/// Logical bus names and routing keys shared across the pipeline
pub mod topology {
    pub const RAW_DATA_EXCHANGE: &str = "raw_data";
    pub const TRANSFORMED_DATA_EXCHANGE: &str = "transformed_data";
    pub const ALERT_EXCHANGE: &str = "alert";
    pub const CONFIG_EXCHANGE: &str = "config";
    pub const HEALTH_CHECK_EXCHANGE: &str = "health_check";

    pub const SYSTEM_TRANSFORMED_DATA_PATTERN: &str = "transformed_data.system.*";
    pub const GITHUB_TRANSFORMED_DATA_ROUTING_KEY: &str = "transformed_data.github";
    pub const CL_NODE_TRANSFORMED_DATA_ROUTING_KEY: &str = "transformed_data.node.chainlink";

    pub const SYSTEM_ALERT_ROUTING_KEY: &str = "alert.system";
    pub const GITHUB_ALERT_ROUTING_KEY: &str = "alert.github";
    pub const CL_NODE_ALERT_ROUTING_KEY: &str = "alert.node.chainlink";

    pub const ALERTS_CONFIGS_PATTERN: &str = "chains.*.*.alerts_config";
    pub const ALERTS_CONFIGS_GENERAL_ROUTING_KEY: &str = "general.alerts_config";

    pub const PING_ROUTING_KEY: &str = "ping";
    pub const HEARTBEAT_WORKER_ROUTING_KEY: &str = "heartbeat.worker";
    pub const HEARTBEAT_MANAGER_ROUTING_KEY: &str = "heartbeat.manager";

    pub const SYSTEM_ALERTER_INPUT_QUEUE: &str = "system_alerter_input_queue";
    pub const GITHUB_ALERTER_INPUT_QUEUE: &str = "github_alerter_input_queue";
    pub const CL_NODE_ALERTER_INPUT_QUEUE: &str = "cl_node_alerter_input_queue";
    pub const ALERTER_CONFIGS_QUEUE: &str = "alerter_configs_queue";
    pub const ALERTER_PING_QUEUE: &str = "alerter_ping_queue";
}

/// True iff `routing_key` matches the binding `pattern` under topic
/// semantics: `*` matches exactly one dot-separated word, `#` matches any
/// number of words including none.
pub fn routing_key_matches(pattern: &str, routing_key: &str) -> bool {
    fn matches(pattern: &[&str], key: &[&str]) -> bool {
        match (pattern.first(), key.first()) {
            (None, None) => true,
            (Some(&"#"), _) => {
                // '#' swallows zero or more words
                matches(&pattern[1..], key) || (!key.is_empty() && matches(pattern, &key[1..]))
            }
            (Some(&"*"), Some(_)) => matches(&pattern[1..], &key[1..]),
            (Some(&word), Some(&head)) if word == head => matches(&pattern[1..], &key[1..]),
            _ => false,
        }
    }
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches(&pattern, &key)
}

#[derive(Debug)]
struct Exchange {
    kind: ExchangeKind,
    /// (binding pattern, queue name)
    bindings: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct Queue {
    /// Attached consumer, if any
    consumer: Option<mpsc::UnboundedSender<Delivery>>,

    /// Deliveries waiting for a consumer
    backlog: VecDeque<Delivery>,

    /// Deliveries handed to a consumer but not yet acked
    unacked: HashMap<Uuid, Delivery>,
}

#[derive(Debug, Default)]
struct BrokerInner {
    exchanges: HashMap<String, Exchange>,
    queues: HashMap<String, Queue>,
}

/// Topic-routed publish/subscribe broker with delivery acknowledgements.
///
/// Everything lives in this process; the external-bus contract (durable
/// exchanges, bounded heartbeats, reconnects) stops at this seam.
#[derive(Debug, Default)]
pub struct Broker {
    inner: RwLock<BrokerInner>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the five exchanges every component expects to exist
    pub async fn declare_standard_topology(&self) {
        self.declare_exchange(topology::RAW_DATA_EXCHANGE, ExchangeKind::Topic)
            .await;
        self.declare_exchange(topology::TRANSFORMED_DATA_EXCHANGE, ExchangeKind::Topic)
            .await;
        self.declare_exchange(topology::ALERT_EXCHANGE, ExchangeKind::Topic)
            .await;
        self.declare_exchange(topology::CONFIG_EXCHANGE, ExchangeKind::Topic)
            .await;
        self.declare_exchange(topology::HEALTH_CHECK_EXCHANGE, ExchangeKind::Direct)
            .await;
    }

    /// Declare an exchange. Idempotent.
    pub async fn declare_exchange(&self, name: &str, kind: ExchangeKind) {
        let mut inner = self.inner.write().await;
        inner.exchanges.entry(name.to_string()).or_insert(Exchange {
            kind,
            bindings: Vec::new(),
        });
    }

    /// Declare a queue. Idempotent.
    pub async fn declare_queue(&self, name: &str) {
        let mut inner = self.inner.write().await;
        inner.queues.entry(name.to_string()).or_default();
    }

    /// Bind a queue to an exchange under a routing-key pattern
    pub async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<(), BusError> {
        let mut inner = self.inner.write().await;
        if !inner.queues.contains_key(queue) {
            return Err(BusError::QueueNotFound(queue.to_string()));
        }
        let exchange = inner
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BusError::ExchangeNotFound(exchange.to_string()))?;
        let binding = (pattern.to_string(), queue.to_string());
        if !exchange.bindings.contains(&binding) {
            exchange.bindings.push(binding);
        }
        Ok(())
    }

    /// Publish a payload and report whether it was routed anywhere.
    ///
    /// The confirm covers placement on a queue, not consumption: a matched
    /// queue with no consumer keeps the delivery in its backlog.
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: serde_json::Value,
    ) -> Result<Confirm, BusError> {
        let mut inner = self.inner.write().await;
        let (kind, targets): (ExchangeKind, Vec<String>) = {
            let exchange = inner
                .exchanges
                .get(exchange)
                .ok_or_else(|| BusError::ExchangeNotFound(exchange.to_string()))?;
            let targets = exchange
                .bindings
                .iter()
                .filter(|(pattern, _)| match exchange.kind {
                    ExchangeKind::Direct => pattern == routing_key,
                    ExchangeKind::Topic => routing_key_matches(pattern, routing_key),
                })
                .map(|(_, queue)| queue.clone())
                .collect();
            (exchange.kind, targets)
        };
        debug!(routing_key, ?kind, targets = targets.len(), "publishing");

        let mut routed = false;
        for queue_name in targets {
            if let Some(queue) = inner.queues.get_mut(&queue_name) {
                let delivery = Delivery {
                    delivery_tag: Uuid::new_v4(),
                    routing_key: routing_key.to_string(),
                    payload: payload.clone(),
                    redelivered: false,
                };
                queue.deliver(delivery);
                routed = true;
            }
        }
        Ok(Confirm { routed })
    }

    /// Attach a consumer to a queue. Unacked deliveries from a previous
    /// consumer are redelivered first, then the backlog drains, then live
    /// publishes flow straight through.
    pub async fn consume(&self, queue: &str) -> Result<mpsc::UnboundedReceiver<Delivery>, BusError> {
        let mut inner = self.inner.write().await;
        let queue_state = inner
            .queues
            .get_mut(queue)
            .ok_or_else(|| BusError::QueueNotFound(queue.to_string()))?;

        let (sender, receiver) = mpsc::unbounded_channel();

        let mut unacked: Vec<Delivery> = queue_state.unacked.drain().map(|(_, d)| d).collect();
        unacked.sort_by(|a, b| a.delivery_tag.cmp(&b.delivery_tag));
        for mut delivery in unacked {
            delivery.redelivered = true;
            queue_state.backlog.push_front(delivery);
        }

        queue_state.consumer = Some(sender);
        while let Some(delivery) = queue_state.backlog.pop_front() {
            queue_state.hand_out(delivery);
        }
        Ok(receiver)
    }

    /// Settle a delivery so it will not be redelivered
    pub async fn ack(&self, queue: &str, delivery_tag: Uuid) -> Result<(), BusError> {
        let mut inner = self.inner.write().await;
        let queue_state = inner
            .queues
            .get_mut(queue)
            .ok_or_else(|| BusError::QueueNotFound(queue.to_string()))?;
        if queue_state.unacked.remove(&delivery_tag).is_none() {
            warn!(queue, %delivery_tag, "ack for unknown delivery tag");
        }
        Ok(())
    }
}

impl Queue {
    fn deliver(&mut self, delivery: Delivery) {
        if self.consumer.is_some() {
            self.hand_out(delivery);
        } else {
            self.backlog.push_back(delivery);
        }
    }

    fn hand_out(&mut self, delivery: Delivery) {
        let tag = delivery.delivery_tag;
        self.unacked.insert(tag, delivery.clone());
        if let Some(consumer) = &self.consumer {
            if consumer.send(delivery).is_err() {
                // Consumer went away: keep it pending for the next attach
                self.consumer = None;
                if let Some(mut delivery) = self.unacked.remove(&tag) {
                    delivery.redelivered = true;
                    self.backlog.push_back(delivery);
                }
            }
        }
    }
}
