// chainwatch - Alerter Manager
// Owns the role's alerter child task and recycles it on config changes

use crate::bus::{topology, Broker, BusError};
use crate::config::ChainConfig;
use crate::health;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A running alerter child: its shutdown trigger and join handle
pub struct ChildHandle {
    pub shutdown: oneshot::Sender<()>,
    pub handle: JoinHandle<()>,
}

/// Builds and spawns the role's alerter child for the given chain
/// snapshot. Returns None when no chain carries config for the role.
pub type ChildSpawner = Box<dyn Fn(Vec<ChainConfig>) -> Option<ChildHandle> + Send + Sync>;

/// Supervises one alerter child per role.
///
/// Threshold changes arrive as chain config messages on the `config`
/// exchange. The supported way to apply them is a full recycle: stop the
/// child (graceful shutdown plus join), which drops its in-memory alerting
/// state, then start a fresh child seeded from the updated snapshot. Live
/// mutation of an individual alerting record is deliberately unsupported.
pub struct AlerterManager {
    manager_name: String,
    broker: Arc<Broker>,
    spawner: ChildSpawner,
    chains: HashMap<String, ChainConfig>,
    child: Option<ChildHandle>,
    restarts: u32,
    heartbeat_interval: Duration,
}

impl AlerterManager {
    pub fn new(manager_name: &str, broker: Arc<Broker>, spawner: ChildSpawner) -> Self {
        Self {
            manager_name: manager_name.to_string(),
            broker,
            spawner,
            chains: HashMap::new(),
            child: None,
            restarts: 0,
            heartbeat_interval: Duration::from_secs(30),
        }
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    fn configs_queue(&self) -> String {
        format!(
            "{}_{}",
            self.manager_name.to_lowercase().replace(' ', "_"),
            topology::ALERTER_CONFIGS_QUEUE
        )
    }

    async fn initialize(&self) -> Result<(), BusError> {
        let queue = self.configs_queue();
        self.broker.declare_queue(&queue).await;
        self.broker
            .bind_queue(&queue, topology::CONFIG_EXCHANGE, topology::ALERTS_CONFIGS_PATTERN)
            .await?;
        self.broker
            .bind_queue(
                &queue,
                topology::CONFIG_EXCHANGE,
                topology::ALERTS_CONFIGS_GENERAL_ROUTING_KEY,
            )
            .await?;
        Ok(())
    }

    /// Stop the current child (if any), then start a fresh one from the
    /// latest chain snapshot. Joining the old task drops its alerting
    /// factory, which is what discards the per-monitorable state.
    async fn restart_child(&mut self) {
        if let Some(child) = self.child.take() {
            info!(manager = %self.manager_name, "stopping alerter child");
            let _ = child.shutdown.send(());
            if let Err(err) = child.handle.await {
                error!(manager = %self.manager_name, "alerter child panicked: {}", err);
            }
            self.restarts += 1;
        }

        let chains: Vec<ChainConfig> = self.chains.values().cloned().collect();
        match (self.spawner)(chains) {
            Some(child) => {
                info!(manager = %self.manager_name, "alerter child started");
                self.child = Some(child);
            }
            None => {
                warn!(
                    manager = %self.manager_name,
                    "no chain config for this role, child not started"
                );
            }
        }
    }

    async fn handle_config_message(&mut self, payload: serde_json::Value) {
        match serde_json::from_value::<ChainConfig>(payload) {
            Ok(chain) => {
                info!(
                    manager = %self.manager_name,
                    parent_id = %chain.parent_id,
                    "received chain config, recycling child"
                );
                self.chains.insert(chain.parent_id.clone(), chain);
                self.restart_child().await;
            }
            Err(err) => {
                // Malformed configs are dropped; the running child keeps
                // its current snapshot
                error!(manager = %self.manager_name, "invalid chain config: {}", err);
            }
        }
    }

    async fn publish_heartbeat(&self) {
        let heartbeat = health::ManagerHeartbeat {
            component_name: self.manager_name.clone(),
            running_processes: self
                .child
                .is_some()
                .then(|| vec![format!("{} child", self.manager_name)])
                .unwrap_or_default(),
            restarts: self.restarts,
            timestamp: crate::current_timestamp(),
        };
        match serde_json::to_value(&heartbeat) {
            Ok(payload) => {
                if let Err(err) = self
                    .broker
                    .publish(
                        topology::HEALTH_CHECK_EXCHANGE,
                        topology::HEARTBEAT_MANAGER_ROUTING_KEY,
                        payload,
                    )
                    .await
                {
                    warn!(manager = %self.manager_name, "failed to publish heartbeat: {}", err);
                }
            }
            Err(err) => error!(manager = %self.manager_name, "heartbeat serialization: {}", err),
        }
    }

    /// Seed the chain snapshot, start the child, then supervise until the
    /// shutdown signal fires.
    pub async fn run(
        &mut self,
        initial_chains: Vec<ChainConfig>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Result<(), BusError> {
        self.initialize().await?;
        for chain in initial_chains {
            self.chains.insert(chain.parent_id.clone(), chain);
        }
        self.restart_child().await;

        let queue = self.configs_queue();
        let mut configs = self.broker.consume(&queue).await?;
        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        info!(manager = %self.manager_name, "manager started");

        loop {
            tokio::select! {
                delivery = configs.recv() => {
                    match delivery {
                        Some(delivery) => {
                            self.handle_config_message(delivery.payload.clone()).await;
                            self.broker.ack(&queue, delivery.delivery_tag).await?;
                        }
                        None => {
                            warn!(manager = %self.manager_name, "configs queue closed");
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    self.publish_heartbeat().await;
                }
                _ = &mut shutdown => {
                    info!(manager = %self.manager_name, "manager stopping");
                    break;
                }
            }
        }

        if let Some(child) = self.child.take() {
            let _ = child.shutdown.send(());
            let _ = child.handle.await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainAlertsConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn chain(parent_id: &str) -> ChainConfig {
        ChainConfig {
            base_chain: "chainlink".to_string(),
            chain_name: "ethereum".to_string(),
            parent_id: parent_id.to_string(),
            monitorables: vec![],
            alerts: ChainAlertsConfig::default(),
        }
    }

    fn counting_spawner(spawn_count: Arc<AtomicU32>) -> ChildSpawner {
        Box::new(move |_chains| {
            spawn_count.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            let handle = tokio::spawn(async move {
                let _ = rx.await;
            });
            Some(ChildHandle {
                shutdown: tx,
                handle,
            })
        })
    }

    #[tokio::test]
    async fn test_config_message_recycles_child() {
        let broker = Arc::new(Broker::new());
        broker.declare_standard_topology().await;

        let spawn_count = Arc::new(AtomicU32::new(0));
        let mut manager = AlerterManager::new(
            "Test Alerters Manager",
            Arc::clone(&broker),
            counting_spawner(Arc::clone(&spawn_count)),
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let manager_handle = tokio::spawn(async move {
            manager.run(vec![chain("chain_1")], shutdown_rx).await.unwrap();
            manager
        });

        // Give the manager a moment to start its first child
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(spawn_count.load(Ordering::SeqCst), 1);

        broker
            .publish(
                topology::CONFIG_EXCHANGE,
                "chains.chainlink.ethereum.alerts_config",
                serde_json::to_value(chain("chain_1")).unwrap(),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(spawn_count.load(Ordering::SeqCst), 2);

        shutdown_tx.send(()).unwrap();
        let manager = manager_handle.await.unwrap();
        assert_eq!(manager.restarts(), 1);
    }

    #[tokio::test]
    async fn test_malformed_config_message_keeps_child() {
        let broker = Arc::new(Broker::new());
        broker.declare_standard_topology().await;

        let spawn_count = Arc::new(AtomicU32::new(0));
        let mut manager = AlerterManager::new(
            "Test Alerters Manager",
            Arc::clone(&broker),
            counting_spawner(Arc::clone(&spawn_count)),
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let manager_handle = tokio::spawn(async move {
            manager.run(vec![chain("chain_1")], shutdown_rx).await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        broker
            .publish(
                topology::CONFIG_EXCHANGE,
                "chains.chainlink.ethereum.alerts_config",
                serde_json::json!({"not": "a chain config"}),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(spawn_count.load(Ordering::SeqCst), 1);

        shutdown_tx.send(()).unwrap();
        manager_handle.await.unwrap();
    }
}
