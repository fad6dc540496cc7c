// chainwatch - Alerter Runner
// Shared consume-classify-publish loop driving one subsystem classifier

use super::Alert;
use crate::bus::{topology, Broker, BusError, Delivery, OutboundMessage, PublishingQueue};
use crate::config::PublishingConfig;
use crate::error::AlerterError;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// One subsystem's classification logic, driven by [`AlerterRunner`].
///
/// Implementations own their domain's alerting factory and turn one
/// transformed-data payload into alerts. They never touch the bus: the
/// runner handles queue setup, publishing, confirms and acks.
pub trait AlertClassifier: Send {
    /// Component name used in logs and heartbeats
    fn name(&self) -> &str;

    /// Queue this subsystem consumes from
    fn input_queue(&self) -> &'static str;

    /// (exchange, routing-key pattern) bindings for the input queue
    fn input_bindings(&self) -> Vec<(&'static str, &'static str)>;

    /// Routing key produced alerts are published under
    fn alert_routing_key(&self) -> &'static str;

    /// Classify one payload into alerts. A malformed payload is an error;
    /// the runner logs it, acks the delivery and drops it.
    fn classify(&mut self, payload: &serde_json::Value) -> Result<Vec<Alert>, AlerterError>;

    /// Discard all in-memory alerting state for a chain
    fn remove_chain_state(&mut self, parent_id: &str);
}

/// Drives one [`AlertClassifier`] against the bus.
///
/// Per delivery: classify, place the produced alerts on the bounded
/// publishing queue, flush the queue with confirms, then ack the input
/// delivery. The ack happens even when classification fails (malformed
/// input must not poison the queue) and when the flush fails (the alerts
/// are safely queued for the next round).
pub struct AlerterRunner<C: AlertClassifier> {
    classifier: C,
    broker: Arc<Broker>,
    publishing_queue: PublishingQueue,
}

impl<C: AlertClassifier> AlerterRunner<C> {
    pub fn new(classifier: C, broker: Arc<Broker>, publishing: &PublishingConfig) -> Self {
        Self {
            classifier,
            broker,
            publishing_queue: PublishingQueue::with_drop_count(
                publishing.max_size,
                publishing.drop_count,
            ),
        }
    }

    pub fn classifier_mut(&mut self) -> &mut C {
        &mut self.classifier
    }

    /// Declare the input queue and its bindings
    pub async fn initialize(&self) -> Result<(), BusError> {
        let queue = self.classifier.input_queue();
        self.broker.declare_queue(queue).await;
        for (exchange, pattern) in self.classifier.input_bindings() {
            self.broker.bind_queue(queue, exchange, pattern).await?;
        }
        Ok(())
    }

    /// Consume until the shutdown signal fires
    pub async fn run(&mut self, mut shutdown: oneshot::Receiver<()>) -> Result<(), BusError> {
        self.initialize().await?;
        let mut deliveries = self.broker.consume(self.classifier.input_queue()).await?;
        info!(component = self.classifier.name(), "alerter started");

        loop {
            tokio::select! {
                delivery = deliveries.recv() => {
                    match delivery {
                        Some(delivery) => self.process_delivery(delivery).await?,
                        None => {
                            warn!(component = self.classifier.name(), "input queue closed");
                            return Ok(());
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!(component = self.classifier.name(), "alerter stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Handle one input delivery end to end
    pub async fn process_delivery(&mut self, delivery: Delivery) -> Result<(), BusError> {
        debug!(
            component = self.classifier.name(),
            routing_key = %delivery.routing_key,
            "processing delivery"
        );

        match self.classifier.classify(&delivery.payload) {
            Ok(alerts) => {
                for alert in alerts {
                    debug!(
                        component = self.classifier.name(),
                        alert = %alert.alert_code.name,
                        severity = %alert.severity,
                        "classified alert"
                    );
                    self.publishing_queue.enqueue(OutboundMessage {
                        exchange: topology::ALERT_EXCHANGE.to_string(),
                        routing_key: self.classifier.alert_routing_key().to_string(),
                        payload: alert.to_wire(),
                    });
                }
            }
            Err(err) => {
                // Malformed or unexpected input: drop it, keep state
                error!(
                    component = self.classifier.name(),
                    code = err.code(),
                    "error when processing delivery: {}",
                    err
                );
            }
        }

        if let Err(err) = self.publishing_queue.flush(&self.broker).await {
            // Alerts stay on the internal queue for the next round
            warn!(
                component = self.classifier.name(),
                queued = self.publishing_queue.len(),
                "could not publish alerts: {}",
                err
            );
        }

        // Either published or parked on the publishing queue: safe to ack
        self.broker
            .ack(self.classifier.input_queue(), delivery.delivery_tag)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerter::{AlertCode, Severity};
    use crate::bus::ExchangeKind;
    use std::collections::HashMap;
    use uuid::Uuid;

    struct FixedClassifier {
        alerts_per_call: usize,
        fail: bool,
    }

    impl AlertClassifier for FixedClassifier {
        fn name(&self) -> &str {
            "fixed alerter"
        }

        fn input_queue(&self) -> &'static str {
            "fixed_input_queue"
        }

        fn input_bindings(&self) -> Vec<(&'static str, &'static str)> {
            vec![(topology::TRANSFORMED_DATA_EXCHANGE, "transformed_data.fixed")]
        }

        fn alert_routing_key(&self) -> &'static str {
            "alert.fixed"
        }

        fn classify(&mut self, _payload: &serde_json::Value) -> Result<Vec<Alert>, AlerterError> {
            if self.fail {
                return Err(AlerterError::ReceivedUnexpectedData {
                    receiver: self.name().to_string(),
                });
            }
            Ok((0..self.alerts_per_call)
                .map(|n| Alert {
                    alert_code: AlertCode::new("Test", "test_alert_1"),
                    severity: Severity::Info,
                    message: format!("alert {}", n),
                    timestamp: n as f64,
                    parent_id: "chain_1".to_string(),
                    origin_id: "origin_1".to_string(),
                    metric_code: "test_metric".to_string(),
                    alert_data: HashMap::new(),
                })
                .collect())
        }

        fn remove_chain_state(&mut self, _parent_id: &str) {}
    }

    async fn broker_with_topology() -> Arc<Broker> {
        let broker = Arc::new(Broker::new());
        broker.declare_standard_topology().await;
        broker.declare_queue("alert_sink").await;
        broker
            .bind_queue("alert_sink", topology::ALERT_EXCHANGE, "alert.#")
            .await
            .unwrap();
        broker
    }

    fn delivery() -> Delivery {
        Delivery {
            delivery_tag: Uuid::new_v4(),
            routing_key: "transformed_data.fixed".to_string(),
            payload: serde_json::json!({}),
            redelivered: false,
        }
    }

    #[tokio::test]
    async fn test_alerts_are_published_and_delivery_acked() {
        let broker = broker_with_topology().await;
        let classifier = FixedClassifier {
            alerts_per_call: 2,
            fail: false,
        };
        let mut runner = AlerterRunner::new(classifier, Arc::clone(&broker), &Default::default());
        runner.initialize().await.unwrap();
        runner.process_delivery(delivery()).await.unwrap();

        let mut sink = broker.consume("alert_sink").await.unwrap();
        let first = sink.recv().await.unwrap();
        assert_eq!(first.routing_key, "alert.fixed");
        assert_eq!(first.payload["severity"], "INFO");
        assert!(sink.recv().await.is_some());

        // Re-attaching to the input queue yields nothing: the delivery was acked
        let mut input = broker.consume("fixed_input_queue").await.unwrap();
        assert!(input.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_classification_error_still_acks() {
        let broker = broker_with_topology().await;
        let classifier = FixedClassifier {
            alerts_per_call: 0,
            fail: true,
        };
        let mut runner = AlerterRunner::new(classifier, Arc::clone(&broker), &Default::default());
        runner.initialize().await.unwrap();
        runner.process_delivery(delivery()).await.unwrap();

        let mut input = broker.consume("fixed_input_queue").await.unwrap();
        assert!(input.try_recv().is_err());

        let mut sink = broker.consume("alert_sink").await.unwrap();
        assert!(sink.try_recv().is_err());
    }
}
