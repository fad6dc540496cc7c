// chainwatch - Configuration Types
// Chain, monitorable, channel and per-metric threshold configuration

pub mod loader;
pub mod watcher;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use loader::{ConfigError, ConfigLoader};
pub use watcher::ConfigWatcher;

fn default_enabled() -> bool {
    true
}

fn default_publishing_max_size() -> usize {
    1000
}

fn default_publishing_drop_count() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Per-metric alerting thresholds.
///
/// `warning_threshold` / `critical_threshold` hold a numeric value or a
/// duration in seconds depending on the protocol the metric is classified
/// with. Time-window metrics additionally carry `warning_time_window` /
/// `critical_time_window`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Metric this config belongs to
    pub name: String,

    /// Master switch for the metric
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_enabled")]
    pub warning_enabled: bool,

    #[serde(default = "default_enabled")]
    pub critical_enabled: bool,

    /// Whether CRITICAL alerts re-raise on a timer
    #[serde(default = "default_enabled")]
    pub critical_repeat_enabled: bool,

    #[serde(default)]
    pub warning_threshold: f64,

    #[serde(default)]
    pub critical_threshold: f64,

    /// Seconds the warning condition must hold (time-window protocols)
    #[serde(default)]
    pub warning_time_window: f64,

    /// Seconds the critical condition must hold (time-window protocols)
    #[serde(default)]
    pub critical_time_window: f64,

    /// Seconds between CRITICAL re-raises
    #[serde(default)]
    pub critical_repeat: f64,
}

impl ThresholdConfig {
    /// True iff neither severity can produce alerts
    pub fn is_muted(&self) -> bool {
        !self.enabled || (!self.warning_enabled && !self.critical_enabled)
    }

    pub fn warning_threshold_duration(&self) -> Duration {
        Duration::from_secs_f64(self.warning_threshold.max(0.0))
    }

    pub fn critical_threshold_duration(&self) -> Duration {
        Duration::from_secs_f64(self.critical_threshold.max(0.0))
    }

    pub fn warning_window_duration(&self) -> Duration {
        Duration::from_secs_f64(self.warning_time_window.max(0.0))
    }

    pub fn critical_window_duration(&self) -> Duration {
        Duration::from_secs_f64(self.critical_time_window.max(0.0))
    }

    pub fn critical_repeat_duration(&self) -> Duration {
        Duration::from_secs_f64(self.critical_repeat.max(0.0))
    }

    /// Validate an upward-oriented metric: current above a threshold is bad,
    /// so the warning threshold must not exceed the critical one.
    pub fn validate_upward(&self) -> Result<(), ConfigError> {
        if self.warning_threshold > self.critical_threshold {
            return Err(ConfigError::BadThresholds {
                metric: self.name.clone(),
                reason: format!(
                    "warning_threshold {} exceeds critical_threshold {}",
                    self.warning_threshold, self.critical_threshold
                ),
            });
        }
        Ok(())
    }

    /// Validate a reverse-oriented metric (e.g. balance): current below a
    /// threshold is bad, so the warning threshold must not be below the
    /// critical one.
    pub fn validate_reverse(&self) -> Result<(), ConfigError> {
        if self.warning_threshold < self.critical_threshold {
            return Err(ConfigError::BadThresholds {
                metric: self.name.clone(),
                reason: format!(
                    "warning_threshold {} is below critical_threshold {}",
                    self.warning_threshold, self.critical_threshold
                ),
            });
        }
        Ok(())
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            warning_enabled: true,
            critical_enabled: true,
            critical_repeat_enabled: true,
            warning_threshold: 0.0,
            critical_threshold: 0.0,
            warning_time_window: 0.0,
            critical_time_window: 0.0,
            critical_repeat: 0.0,
        }
    }
}

/// Alert thresholds for a system monitorable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemAlertsConfig {
    pub parent_id: String,
    pub system_is_down: ThresholdConfig,
    pub cpu_usage: ThresholdConfig,
    pub ram_usage: ThresholdConfig,
    pub storage_usage: ThresholdConfig,
}

/// Alert settings for a github repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubAlertsConfig {
    pub parent_id: String,

    /// Whether new-release alerts are produced
    #[serde(default = "default_enabled")]
    pub new_release_enabled: bool,
}

/// Alert thresholds for a chainlink node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainlinkNodeAlertsConfig {
    pub parent_id: String,
    pub node_is_down: ThresholdConfig,
    pub no_change_in_height: ThresholdConfig,
    pub max_unconfirmed_blocks: ThresholdConfig,
    pub errored_job_runs: ThresholdConfig,
    pub balance_amount: ThresholdConfig,
}

/// Kind of entity a monitorable is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorableKind {
    System,
    GithubRepo,
    ChainlinkNode,
}

/// A node, repo, or system with its own metrics stream and alerting record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorableConfig {
    pub id: String,
    pub name: String,
    pub kind: MonitorableKind,
}

/// Per-subsystem alert configs of one chain. Only the sections relevant to
/// the chain need to be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainAlertsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemAlertsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubAlertsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chainlink_node: Option<ChainlinkNodeAlertsConfig>,
}

/// Configuration snapshot for one chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Base chain, first segment of the config routing key
    pub base_chain: String,

    /// Sub chain, second segment of the config routing key
    pub chain_name: String,

    /// Chain-scoped identifier grouping monitorables
    pub parent_id: String,

    #[serde(default)]
    pub monitorables: Vec<MonitorableConfig>,

    #[serde(default)]
    pub alerts: ChainAlertsConfig,
}

impl ChainConfig {
    /// Routing key this chain's alert config is published under
    pub fn config_routing_key(&self) -> String {
        format!("chains.{}.{}.alerts_config", self.base_chain, self.chain_name)
    }
}

/// Alert routing channel. Opaque to the alerting core; carried in the
/// snapshot for the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channel_name: String,

    /// slack | telegram | email | log | console
    pub channel_type: String,

    #[serde(default)]
    pub severities: Vec<String>,
}

/// Outbound publishing queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingConfig {
    /// Maximum entries held before eviction kicks in
    #[serde(default = "default_publishing_max_size")]
    pub max_size: usize,

    /// How many oldest entries are dropped when the queue is full
    #[serde(default = "default_publishing_drop_count")]
    pub drop_count: usize,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            max_size: default_publishing_max_size(),
            drop_count: default_publishing_drop_count(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional file template, {} replaced with the component name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file_template: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_file_template: None,
        }
    }
}

/// Root configuration snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Namespace for this installation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_identifier: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub publishing: PublishingConfig,

    #[serde(default)]
    pub chains: Vec<ChainConfig>,

    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upward(warning: f64, critical: f64) -> ThresholdConfig {
        ThresholdConfig {
            name: "cpu_usage".to_string(),
            warning_threshold: warning,
            critical_threshold: critical,
            ..ThresholdConfig::default()
        }
    }

    #[test]
    fn test_is_muted() {
        let mut config = upward(10.0, 20.0);
        assert!(!config.is_muted());
        config.warning_enabled = false;
        config.critical_enabled = false;
        assert!(config.is_muted());
        let mut config = upward(10.0, 20.0);
        config.enabled = false;
        assert!(config.is_muted());
    }

    #[test]
    fn test_upward_threshold_orientation() {
        assert!(upward(10.0, 20.0).validate_upward().is_ok());
        assert!(upward(20.0, 20.0).validate_upward().is_ok());
        assert!(upward(21.0, 20.0).validate_upward().is_err());
    }

    #[test]
    fn test_reverse_threshold_orientation() {
        assert!(upward(10.0, 5.0).validate_reverse().is_ok());
        assert!(upward(5.0, 5.0).validate_reverse().is_ok());
        assert!(upward(4.0, 5.0).validate_reverse().is_err());
    }

    #[test]
    fn test_threshold_config_defaults_from_yaml() {
        let yaml = "name: node_is_down\nwarning_threshold: 3\ncritical_threshold: 7\n";
        let config: ThresholdConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.enabled);
        assert!(config.warning_enabled);
        assert!(config.critical_enabled);
        assert!(config.critical_repeat_enabled);
        assert_eq!(config.warning_threshold, 3.0);
        assert_eq!(config.critical_repeat, 0.0);
    }

    #[test]
    fn test_chain_config_routing_key() {
        let chain = ChainConfig {
            base_chain: "chainlink".to_string(),
            chain_name: "ethereum".to_string(),
            parent_id: "chain_1".to_string(),
            monitorables: vec![],
            alerts: ChainAlertsConfig::default(),
        };
        assert_eq!(
            chain.config_routing_key(),
            "chains.chainlink.ethereum.alerts_config"
        );
    }
}
