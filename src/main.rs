use anyhow::Context;
use chainwatch::alerter::chainlink::ChainlinkNodeAlerter;
use chainwatch::alerter::github::GithubAlerter;
use chainwatch::alerter::runner::AlerterRunner;
use chainwatch::alerter::system::SystemAlerter;
use chainwatch::bus::Broker;
use chainwatch::config::{
    ChainConfig, ChainlinkNodeAlertsConfig, ConfigLoader, ConfigWatcher, GithubAlertsConfig,
    PublishingConfig, SystemAlertsConfig,
};
use chainwatch::health::HeartbeatResponder;
use chainwatch::manager::{AlerterManager, ChildHandle, ChildSpawner};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const ROLES: &[&str] = &["system-alerter", "github-alerter", "chainlink-node-alerter"];

fn print_usage() {
    println!("chainwatch v{}", VERSION);
    println!("Usage: chainwatch <ROLE> [OPTIONS]");
    println!();
    println!("Roles:");
    println!("  system-alerter          Alert on host metrics");
    println!("  github-alerter          Alert on repository releases");
    println!("  chainlink-node-alerter  Alert on chainlink node metrics");
    println!();
    println!("Options:");
    println!("  -h, --help     Show this help message");
    println!("  -v, --version  Show version information");
    println!();
    println!("Environment:");
    println!("  UNIQUE_ALERTER_IDENTIFIER  Namespace for this installation");
    println!("  LOGGING_LEVEL              error | warn | info | debug | trace");
    println!("  CHAINWATCH_CONFIG          Config file to load and watch");
}

fn system_spawner(broker: Arc<Broker>, publishing: PublishingConfig) -> ChildSpawner {
    Box::new(move |chains: Vec<ChainConfig>| {
        let configs: HashMap<String, SystemAlertsConfig> = chains
            .iter()
            .filter_map(|chain| {
                chain
                    .alerts
                    .system
                    .clone()
                    .map(|alerts| (chain.parent_id.clone(), alerts))
            })
            .collect();
        if configs.is_empty() {
            return None;
        }
        let mut runner = AlerterRunner::new(
            SystemAlerter::new(configs),
            Arc::clone(&broker),
            &publishing,
        );
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            if let Err(err) = runner.run(shutdown_rx).await {
                error!("system alerter failed: {}", err);
            }
        });
        Some(ChildHandle { shutdown, handle })
    })
}

fn github_spawner(broker: Arc<Broker>, publishing: PublishingConfig) -> ChildSpawner {
    Box::new(move |chains: Vec<ChainConfig>| {
        let configs: HashMap<String, GithubAlertsConfig> = chains
            .iter()
            .filter_map(|chain| {
                chain
                    .alerts
                    .github
                    .clone()
                    .map(|alerts| (chain.parent_id.clone(), alerts))
            })
            .collect();
        if configs.is_empty() {
            return None;
        }
        let mut runner = AlerterRunner::new(
            GithubAlerter::new(configs),
            Arc::clone(&broker),
            &publishing,
        );
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            if let Err(err) = runner.run(shutdown_rx).await {
                error!("github alerter failed: {}", err);
            }
        });
        Some(ChildHandle { shutdown, handle })
    })
}

fn chainlink_spawner(broker: Arc<Broker>, publishing: PublishingConfig) -> ChildSpawner {
    Box::new(move |chains: Vec<ChainConfig>| {
        let configs: HashMap<String, ChainlinkNodeAlertsConfig> = chains
            .iter()
            .filter_map(|chain| {
                chain
                    .alerts
                    .chainlink_node
                    .clone()
                    .map(|alerts| (chain.parent_id.clone(), alerts))
            })
            .collect();
        if configs.is_empty() {
            return None;
        }
        let mut runner = AlerterRunner::new(
            ChainlinkNodeAlerter::new(configs),
            Arc::clone(&broker),
            &publishing,
        );
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            if let Err(err) = runner.run(shutdown_rx).await {
                error!("chainlink node alerter failed: {}", err);
            }
        });
        Some(ChildHandle { shutdown, handle })
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() > 1 && (args[1] == "--version" || args[1] == "-v") {
        println!("chainwatch {}", VERSION);
        return Ok(());
    }
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return Ok(());
    }

    let role = args[1].as_str();
    if !ROLES.contains(&role) {
        print_usage();
        anyhow::bail!("unknown role: {}", role);
    }

    let config = ConfigLoader::new()
        .load()
        .context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.logging.level.clone()))
        .init();

    let unique_identifier = config
        .unique_identifier
        .clone()
        .unwrap_or_else(|| format!("chainwatch_{}", Uuid::new_v4()));
    info!(
        "Starting chainwatch v{} as {} ({})",
        VERSION, role, unique_identifier
    );

    let broker = Arc::new(Broker::new());
    broker.declare_standard_topology().await;

    // Optional file watcher feeding the config topic
    let mut config_watcher = None;
    if let Ok(path) = env::var("CHAINWATCH_CONFIG") {
        let mut watcher = ConfigWatcher::new(PathBuf::from(path), Arc::clone(&broker));
        if let Err(err) = watcher.start().await {
            error!("config watcher failed to start: {}", err);
        } else {
            config_watcher = Some(watcher);
        }
    }

    let publishing = config.publishing.clone();
    let (component_name, spawner): (&str, ChildSpawner) = match role {
        "system-alerter" => (
            "System Alerter",
            system_spawner(Arc::clone(&broker), publishing),
        ),
        "github-alerter" => (
            "GitHub Alerter",
            github_spawner(Arc::clone(&broker), publishing),
        ),
        _ => (
            "Chainlink Node Alerter",
            chainlink_spawner(Arc::clone(&broker), publishing),
        ),
    };

    let responder = HeartbeatResponder::new(component_name, Arc::clone(&broker));
    let (heartbeat_shutdown, heartbeat_shutdown_rx) = oneshot::channel();
    let heartbeat_handle = tokio::spawn(async move {
        if let Err(err) = responder.run(heartbeat_shutdown_rx).await {
            error!("heartbeat responder failed: {}", err);
        }
    });

    let manager_name = format!("{}s Manager", component_name);
    let mut manager = AlerterManager::new(&manager_name, Arc::clone(&broker), spawner);
    let (manager_shutdown, manager_shutdown_rx) = oneshot::channel();
    let chains = config.chains.clone();
    let manager_handle =
        tokio::spawn(async move { manager.run(chains, manager_shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    let _ = manager_shutdown.send(());
    let _ = heartbeat_shutdown.send(());
    manager_handle
        .await
        .context("manager task panicked")?
        .context("manager stopped with a bus error")?;
    heartbeat_handle.await.context("heartbeat task panicked")?;
    drop(config_watcher);

    info!("chainwatch stopped cleanly");
    Ok(())
}
