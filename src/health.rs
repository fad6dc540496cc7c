// chainwatch - Health Check Plumbing
// Ping handling and heartbeats on the health_check direct exchange

use crate::bus::{topology, Broker, BusError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Worker liveness heartbeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub component_name: String,
    pub is_alive: bool,
    pub timestamp: f64,
}

/// Manager heartbeat summarising its children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerHeartbeat {
    pub component_name: String,
    pub running_processes: Vec<String>,
    pub restarts: u32,
    pub timestamp: f64,
}

/// Answers `ping` messages with `heartbeat.worker` for one component
pub struct HeartbeatResponder {
    component_name: String,
    broker: Arc<Broker>,
}

impl HeartbeatResponder {
    pub fn new(component_name: &str, broker: Arc<Broker>) -> Self {
        Self {
            component_name: component_name.to_string(),
            broker,
        }
    }

    fn ping_queue(&self) -> String {
        format!(
            "{}_{}",
            self.component_name.to_lowercase().replace(' ', "_"),
            topology::ALERTER_PING_QUEUE
        )
    }

    async fn initialize(&self) -> Result<String, BusError> {
        let queue = self.ping_queue();
        self.broker.declare_queue(&queue).await;
        self.broker
            .bind_queue(
                &queue,
                topology::HEALTH_CHECK_EXCHANGE,
                topology::PING_ROUTING_KEY,
            )
            .await?;
        Ok(queue)
    }

    /// Publish one worker heartbeat
    pub async fn publish_heartbeat(&self) -> Result<(), BusError> {
        let heartbeat = Heartbeat {
            component_name: self.component_name.clone(),
            is_alive: true,
            timestamp: crate::current_timestamp(),
        };
        let payload = serde_json::to_value(&heartbeat)
            .map_err(|err| BusError::MessageNotDelivered(err.to_string()))?;
        self.broker
            .publish(
                topology::HEALTH_CHECK_EXCHANGE,
                topology::HEARTBEAT_WORKER_ROUTING_KEY,
                payload,
            )
            .await?;
        Ok(())
    }

    /// Respond to pings until the shutdown signal fires
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) -> Result<(), BusError> {
        let queue = self.initialize().await?;
        let mut pings = self.broker.consume(&queue).await?;
        info!(component = %self.component_name, "heartbeat responder started");

        loop {
            tokio::select! {
                delivery = pings.recv() => {
                    match delivery {
                        Some(delivery) => {
                            if let Err(err) = self.publish_heartbeat().await {
                                warn!(
                                    component = %self.component_name,
                                    "failed to publish heartbeat: {}",
                                    err
                                );
                            }
                            self.broker.ack(&queue, delivery.delivery_tag).await?;
                        }
                        None => return Ok(()),
                    }
                }
                _ = &mut shutdown => {
                    info!(component = %self.component_name, "heartbeat responder stopping");
                    return Ok(());
                }
            }
        }
    }
}
