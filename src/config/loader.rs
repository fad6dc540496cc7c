// chainwatch - Configuration Loading
// Builds the chain/channel snapshot from YAML, environment, and validation

use super::Config;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Why a configuration snapshot could not be produced.
///
/// The variants mirror the three stages of loading: reading the file,
/// overriding from the environment, and validating the assembled snapshot.
/// Per-chain problems name the chain so multi-chain installations can tell
/// which section is broken.
#[derive(Debug)]
pub enum ConfigError {
    /// A config file exists but could not be read
    Unreadable { path: PathBuf, reason: String },

    /// A config file could not be parsed as YAML
    Malformed { path: PathBuf, reason: String },

    /// An environment override held a value of the wrong type
    BadOverride { variable: String, value: String },

    /// A per-metric threshold pair has the wrong orientation
    BadThresholds { metric: String, reason: String },

    /// A chain section is internally inconsistent
    BadChain { chain: String, reason: String },

    /// A global setting is out of range
    Invalid { setting: String, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Unreadable { path, reason } => {
                write!(f, "cannot read config file {}: {}", path.display(), reason)
            }
            ConfigError::Malformed { path, reason } => {
                write!(f, "config file {} is not valid YAML: {}", path.display(), reason)
            }
            ConfigError::BadOverride { variable, value } => {
                write!(f, "environment override {}={} cannot be parsed", variable, value)
            }
            ConfigError::BadThresholds { metric, reason } => {
                write!(f, "thresholds for metric {}: {}", metric, reason)
            }
            ConfigError::BadChain { chain, reason } => {
                write!(f, "chain {}: {}", chain, reason)
            }
            ConfigError::Invalid { setting, reason } => {
                write!(f, "setting {}: {}", setting, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Assembles the configuration snapshot an alerter process starts from.
///
/// The first existing file among the search paths wins; with no file at
/// all the built-in defaults apply, which still lets a process come up and
/// wait for chain configs on the config topic. Environment variables are
/// read at load time and beat the file, and the assembled snapshot is
/// validated as a whole before it is handed out.
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Loader with the default search paths
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        if let Some(home) = dirs::home_dir() {
            search_paths.push(home.join(".config/chainwatch/config.yaml"));
            search_paths.push(home.join(".chainwatch.yaml"));
        }

        search_paths.push(PathBuf::from("./chainwatch.yaml"));
        search_paths.push(PathBuf::from("./config.yaml"));
        search_paths.push(PathBuf::from("/etc/chainwatch/config.yaml"));

        Self { search_paths }
    }

    /// Loader restricted to the given paths
    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Produce a validated snapshot from file, environment, and defaults
    pub fn load(&self) -> Result<Config, ConfigError> {
        let mut config = match self.search_paths.iter().find(|path| path.exists()) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::parse_file(path)?
            }
            None => {
                warn!("No configuration file found, starting from defaults");
                Config::default()
            }
        };

        Self::apply_env_overrides(&mut config)?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|err| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        serde_yaml::from_str(&content).map_err(|err| ConfigError::Malformed {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    /// Environment beats the file for the handful of deploy-time knobs
    fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("UNIQUE_ALERTER_IDENTIFIER") {
            config.unique_identifier = Some(value);
        }
        if let Ok(value) = std::env::var("LOGGING_LEVEL") {
            config.logging.level = value;
        }
        if let Ok(value) = std::env::var("ALERTER_LOG_FILE_TEMPLATE") {
            config.logging.log_file_template = Some(value);
        }
        config.publishing.max_size =
            Self::env_or("CHAINWATCH_PUBLISHING_MAX_SIZE", config.publishing.max_size)?;
        config.publishing.drop_count =
            Self::env_or("CHAINWATCH_PUBLISHING_DROP_COUNT", config.publishing.drop_count)?;
        Ok(())
    }

    fn env_or<T: FromStr>(variable: &str, fallback: T) -> Result<T, ConfigError> {
        match std::env::var(variable) {
            Ok(value) => value.parse().map_err(|_| ConfigError::BadOverride {
                variable: variable.to_string(),
                value,
            }),
            Err(_) => Ok(fallback),
        }
    }

    /// Validate a configuration snapshot
    pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::Invalid {
                setting: "logging.level".to_string(),
                reason: format!(
                    "{} is not one of {}",
                    config.logging.level,
                    valid_log_levels.join("/")
                ),
            });
        }

        if config.publishing.max_size == 0 {
            return Err(ConfigError::Invalid {
                setting: "publishing.max_size".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if config.publishing.drop_count == 0 {
            return Err(ConfigError::Invalid {
                setting: "publishing.drop_count".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        for chain in &config.chains {
            if chain.parent_id.is_empty() {
                return Err(ConfigError::BadChain {
                    chain: chain.chain_name.clone(),
                    reason: "parent_id is empty".to_string(),
                });
            }

            if let Some(system) = &chain.alerts.system {
                Self::check_parent_id(&chain.chain_name, &chain.parent_id, &system.parent_id)?;
                system.system_is_down.validate_upward()?;
                system.cpu_usage.validate_upward()?;
                system.ram_usage.validate_upward()?;
                system.storage_usage.validate_upward()?;
            }
            if let Some(github) = &chain.alerts.github {
                Self::check_parent_id(&chain.chain_name, &chain.parent_id, &github.parent_id)?;
            }
            if let Some(node) = &chain.alerts.chainlink_node {
                Self::check_parent_id(&chain.chain_name, &chain.parent_id, &node.parent_id)?;
                node.node_is_down.validate_upward()?;
                node.no_change_in_height.validate_upward()?;
                node.max_unconfirmed_blocks.validate_upward()?;
                node.errored_job_runs.validate_upward()?;
                // Low balance is the problem, so the orientation flips
                node.balance_amount.validate_reverse()?;
            }
        }

        Ok(())
    }

    fn check_parent_id(
        chain_name: &str,
        chain_parent_id: &str,
        alerts_parent_id: &str,
    ) -> Result<(), ConfigError> {
        if chain_parent_id != alerts_parent_id {
            return Err(ConfigError::BadChain {
                chain: chain_name.to_string(),
                reason: format!(
                    "alerts config parent_id {} does not match chain parent_id {}",
                    alerts_parent_id, chain_parent_id
                ),
            });
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ChainAlertsConfig, ChainConfig, ChainlinkNodeAlertsConfig, GithubAlertsConfig,
        ThresholdConfig,
    };
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn chain_with_alerts(alerts: ChainAlertsConfig) -> ChainConfig {
        ChainConfig {
            base_chain: "chainlink".to_string(),
            chain_name: "ethereum".to_string(),
            parent_id: "chain_1".to_string(),
            monitorables: vec![],
            alerts,
        }
    }

    #[test]
    #[serial]
    fn test_chain_snapshot_loaded_from_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "unique_identifier: panic_mainnet\n\
             chains:\n\
             - base_chain: chainlink\n\
             \x20 chain_name: ethereum\n\
             \x20 parent_id: chain_1\n\
             \x20 alerts:\n\
             \x20   chainlink_node:\n\
             \x20     parent_id: chain_1\n\
             \x20     node_is_down: {{ name: node_is_down, warning_threshold: 60, critical_threshold: 300 }}\n\
             \x20     no_change_in_height: {{ name: no_change_in_height, warning_threshold: 120, critical_threshold: 300 }}\n\
             \x20     max_unconfirmed_blocks: {{ name: max_unconfirmed_blocks, warning_threshold: 3, critical_threshold: 5 }}\n\
             \x20     errored_job_runs: {{ name: errored_job_runs, warning_threshold: 3, critical_threshold: 5 }}\n\
             \x20     balance_amount: {{ name: balance_amount, warning_threshold: 10, critical_threshold: 5 }}\n"
        )
        .unwrap();

        let loader = ConfigLoader::with_search_paths(vec![file.path().to_path_buf()]);
        let config = loader.load().unwrap();

        assert_eq!(config.unique_identifier, Some("panic_mainnet".to_string()));
        assert_eq!(config.chains.len(), 1);
        let node = config.chains[0].alerts.chainlink_node.as_ref().unwrap();
        assert_eq!(node.node_is_down.warning_threshold, 60.0);
        // Unspecified switches fall back to enabled
        assert!(node.node_is_down.critical_repeat_enabled);
        assert_eq!(
            config.chains[0].config_routing_key(),
            "chains.chainlink.ethereum.alerts_config"
        );
    }

    #[test]
    #[serial]
    fn test_drop_count_env_override() {
        std::env::set_var("CHAINWATCH_PUBLISHING_DROP_COUNT", "2");
        let config = ConfigLoader::with_search_paths(vec![]).load().unwrap();
        std::env::remove_var("CHAINWATCH_PUBLISHING_DROP_COUNT");

        assert_eq!(config.publishing.drop_count, 2);
        // Untouched knobs keep their defaults
        assert_eq!(config.publishing.max_size, 1000);
    }

    #[test]
    #[serial]
    fn test_unparsable_env_override_is_rejected() {
        std::env::set_var("CHAINWATCH_PUBLISHING_DROP_COUNT", "lots");
        let result = ConfigLoader::with_search_paths(vec![]).load();
        std::env::remove_var("CHAINWATCH_PUBLISHING_DROP_COUNT");

        match result {
            Err(ConfigError::BadOverride { variable, value }) => {
                assert_eq!(variable, "CHAINWATCH_PUBLISHING_DROP_COUNT");
                assert_eq!(value, "lots");
            }
            other => panic!("expected BadOverride, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    #[serial]
    fn test_parent_id_mismatch_names_the_chain() {
        let mut config = Config::default();
        config.chains.push(chain_with_alerts(ChainAlertsConfig {
            github: Some(GithubAlertsConfig {
                parent_id: "chain_2".to_string(),
                new_release_enabled: true,
            }),
            ..ChainAlertsConfig::default()
        }));

        match ConfigLoader::validate_config(&config) {
            Err(ConfigError::BadChain { chain, reason }) => {
                assert_eq!(chain, "ethereum");
                assert!(reason.contains("chain_2"));
            }
            other => panic!("expected BadChain, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_balance_orientation_is_validated_reverse() {
        let mut config = Config::default();
        config.chains.push(chain_with_alerts(ChainAlertsConfig {
            chainlink_node: Some(ChainlinkNodeAlertsConfig {
                parent_id: "chain_1".to_string(),
                node_is_down: ThresholdConfig::default(),
                no_change_in_height: ThresholdConfig::default(),
                max_unconfirmed_blocks: ThresholdConfig::default(),
                errored_job_runs: ThresholdConfig::default(),
                // Reverse metric with upward orientation: warning below critical
                balance_amount: ThresholdConfig {
                    name: "balance_amount".to_string(),
                    warning_threshold: 5.0,
                    critical_threshold: 10.0,
                    ..ThresholdConfig::default()
                },
            }),
            ..ChainAlertsConfig::default()
        }));

        match ConfigLoader::validate_config(&config) {
            Err(ConfigError::BadThresholds { metric, .. }) => {
                assert_eq!(metric, "balance_amount");
            }
            other => panic!("expected BadThresholds, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_malformed_yaml_names_the_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "chains: [not: [valid").unwrap();

        let loader = ConfigLoader::with_search_paths(vec![file.path().to_path_buf()]);
        match loader.load() {
            Err(ConfigError::Malformed { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("expected Malformed, got {:?}", other.map(|_| ())),
        }
    }
}
