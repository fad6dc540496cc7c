// chainwatch - Configuration Watcher
// Re-publishes chain alert configs on the config topic when the file changes

use super::{Config, ConfigLoader};
use crate::bus::{topology, Broker};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Watches a configuration file and publishes every chain's alerts config
/// on the `config` exchange whenever the file is rewritten. The alerter
/// manager consumes those messages and recycles its children.
pub struct ConfigWatcher {
    config_path: PathBuf,
    broker: Arc<Broker>,
    /// Held so the file watch stays registered for the watcher's lifetime
    #[allow(dead_code)]
    watcher: Option<notify::RecommendedWatcher>,
}

impl ConfigWatcher {
    pub fn new(config_path: PathBuf, broker: Arc<Broker>) -> Self {
        Self {
            config_path,
            broker,
            watcher: None,
        }
    }

    /// Publish the current snapshot's chain configs once, then keep
    /// publishing on every file change until the task is dropped.
    pub async fn start(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let loader = ConfigLoader::with_search_paths(vec![self.config_path.clone()]);
        let config = loader.load()?;
        Self::publish_chain_configs(&self.broker, &config).await;

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(tx)?;
        watcher.watch(&self.config_path, RecursiveMode::NonRecursive)?;
        self.watcher = Some(watcher);
        info!("Watching configuration file {}", self.config_path.display());

        let broker = Arc::clone(&self.broker);
        let config_path = self.config_path.clone();
        tokio::task::spawn_blocking(move || {
            let runtime = tokio::runtime::Handle::current();
            loop {
                match rx.recv_timeout(Duration::from_secs(1)) {
                    Ok(Ok(event)) => {
                        if !matches!(
                            event.kind,
                            EventKind::Modify(_) | EventKind::Create(_)
                        ) {
                            continue;
                        }
                        let loader =
                            ConfigLoader::with_search_paths(vec![config_path.clone()]);
                        match loader.load() {
                            Ok(config) => {
                                info!(
                                    "Configuration reloaded from {}",
                                    config_path.display()
                                );
                                let broker = Arc::clone(&broker);
                                runtime.block_on(async move {
                                    Self::publish_chain_configs(&broker, &config).await;
                                });
                            }
                            Err(err) => {
                                warn!("Failed to reload config: {}", err);
                            }
                        }
                    }
                    Ok(Err(err)) => {
                        error!("Config watch error: {}", err);
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Ok(())
    }

    /// Publish one config message per chain under its routing key
    pub async fn publish_chain_configs(broker: &Broker, config: &Config) {
        for chain in &config.chains {
            let routing_key = chain.config_routing_key();
            match serde_json::to_value(chain) {
                Ok(payload) => {
                    if let Err(err) = broker
                        .publish(topology::CONFIG_EXCHANGE, &routing_key, payload)
                        .await
                    {
                        warn!(%routing_key, "failed to publish chain config: {}", err);
                    }
                }
                Err(err) => {
                    error!(%routing_key, "failed to serialize chain config: {}", err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ExchangeKind;
    use crate::config::{ChainAlertsConfig, ChainConfig, GithubAlertsConfig};

    fn config_with_chain() -> Config {
        Config {
            chains: vec![ChainConfig {
                base_chain: "chainlink".to_string(),
                chain_name: "ethereum".to_string(),
                parent_id: "chain_1".to_string(),
                monitorables: vec![],
                alerts: ChainAlertsConfig {
                    github: Some(GithubAlertsConfig {
                        parent_id: "chain_1".to_string(),
                        new_release_enabled: true,
                    }),
                    ..ChainAlertsConfig::default()
                },
            }],
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_publish_chain_configs_uses_chain_routing_key() {
        let broker = Broker::new();
        broker
            .declare_exchange(topology::CONFIG_EXCHANGE, ExchangeKind::Topic)
            .await;
        broker.declare_queue("configs_queue").await;
        broker
            .bind_queue(
                "configs_queue",
                topology::CONFIG_EXCHANGE,
                topology::ALERTS_CONFIGS_PATTERN,
            )
            .await
            .unwrap();

        ConfigWatcher::publish_chain_configs(&broker, &config_with_chain()).await;

        let mut receiver = broker.consume("configs_queue").await.unwrap();
        let delivery = receiver.recv().await.unwrap();
        assert_eq!(
            delivery.routing_key,
            "chains.chainlink.ethereum.alerts_config"
        );
        assert_eq!(delivery.payload["parent_id"], "chain_1");
    }
}
