// chainwatch - Alerting State
// Per-monitorable alerting record seeded from the chain's threshold config

use crate::config::{ChainlinkNodeAlertsConfig, SystemAlertsConfig};
use crate::timing::{OccurrencesInPeriodTracker, TimedTaskLimiter, TimedTaskTracker};
use std::collections::HashMap;

use super::{chainlink_metrics, system_metrics};

/// The alerting record for one monitorable.
///
/// Sent-flags, window timers, repeat limiters and occurrence trackers are
/// keyed by metric code. A flag or timer that was never seeded simply reads
/// as "not sent" / "not started", so classifiers never have to distinguish
/// a fresh record from one whose metric was not configured.
#[derive(Debug, Clone, Default)]
pub struct AlertingState {
    warning_sent: HashMap<String, bool>,
    critical_sent: HashMap<String, bool>,
    error_sent: HashMap<String, bool>,
    any_severity_sent: HashMap<String, bool>,

    pub warning_window_timer: HashMap<String, TimedTaskTracker>,
    pub critical_window_timer: HashMap<String, TimedTaskTracker>,
    pub critical_repeat_timer: HashMap<String, TimedTaskLimiter>,
    pub warning_occurrences_in_period_tracker: HashMap<String, OccurrencesInPeriodTracker>,
    pub critical_occurrences_in_period_tracker: HashMap<String, OccurrencesInPeriodTracker>,

    /// Last block height observed for the monitorable, where applicable
    pub current_height: Option<u64>,

    /// Whether the monitorable is a validator, where applicable
    pub is_validator: Option<bool>,
}

impl AlertingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warning_sent(&self, metric_code: &str) -> bool {
        self.warning_sent.get(metric_code).copied().unwrap_or(false)
    }

    pub fn set_warning_sent(&mut self, metric_code: &str, sent: bool) {
        self.warning_sent.insert(metric_code.to_string(), sent);
    }

    pub fn critical_sent(&self, metric_code: &str) -> bool {
        self.critical_sent.get(metric_code).copied().unwrap_or(false)
    }

    pub fn set_critical_sent(&mut self, metric_code: &str, sent: bool) {
        self.critical_sent.insert(metric_code.to_string(), sent);
    }

    pub fn error_sent(&self, metric_code: &str) -> bool {
        self.error_sent.get(metric_code).copied().unwrap_or(false)
    }

    pub fn set_error_sent(&mut self, metric_code: &str, sent: bool) {
        self.error_sent.insert(metric_code.to_string(), sent);
    }

    pub fn any_severity_sent(&self, metric_code: &str) -> bool {
        self.any_severity_sent
            .get(metric_code)
            .copied()
            .unwrap_or(false)
    }

    pub fn set_any_severity_sent(&mut self, metric_code: &str, sent: bool) {
        self.any_severity_sent.insert(metric_code.to_string(), sent);
    }

    fn seed_window_timers(&mut self, metric_code: &str, warning: TimedTaskTracker, critical: TimedTaskTracker) {
        self.warning_window_timer
            .insert(metric_code.to_string(), warning);
        self.critical_window_timer
            .insert(metric_code.to_string(), critical);
    }

    fn seed_repeat_limiter(&mut self, metric_code: &str, config: &crate::config::ThresholdConfig) {
        let limiter = if config.critical_repeat_enabled {
            TimedTaskLimiter::new(config.critical_repeat_duration())
        } else {
            TimedTaskLimiter::disabled()
        };
        self.critical_repeat_timer
            .insert(metric_code.to_string(), limiter);
    }

    /// Alerting record for a chainlink node, seeded from the chain config
    pub fn for_chainlink_node(config: &ChainlinkNodeAlertsConfig) -> Self {
        let mut state = Self::new();

        for metric in [
            chainlink_metrics::NODE_IS_DOWN,
            chainlink_metrics::NO_CHANGE_IN_HEIGHT,
            chainlink_metrics::MAX_UNCONFIRMED_BLOCKS,
            chainlink_metrics::ERRORED_JOB_RUNS,
            chainlink_metrics::BALANCE,
            chainlink_metrics::PROMETHEUS_SOURCE_IS_DOWN,
        ] {
            state.set_warning_sent(metric, false);
        }
        for metric in [
            chainlink_metrics::NODE_IS_DOWN,
            chainlink_metrics::NO_CHANGE_IN_HEIGHT,
            chainlink_metrics::MAX_UNCONFIRMED_BLOCKS,
            chainlink_metrics::ERRORED_JOB_RUNS,
            chainlink_metrics::BALANCE,
        ] {
            state.set_critical_sent(metric, false);
        }
        for metric in [
            chainlink_metrics::INVALID_URL,
            chainlink_metrics::METRIC_NOT_FOUND,
        ] {
            state.set_error_sent(metric, false);
        }

        // node_is_down and no_change_in_height carry their windows in the
        // threshold fields (durations in seconds)
        state.seed_window_timers(
            chainlink_metrics::NODE_IS_DOWN,
            TimedTaskTracker::new(config.node_is_down.warning_threshold_duration()),
            TimedTaskTracker::new(config.node_is_down.critical_threshold_duration()),
        );
        state.seed_window_timers(
            chainlink_metrics::NO_CHANGE_IN_HEIGHT,
            TimedTaskTracker::new(config.no_change_in_height.warning_threshold_duration()),
            TimedTaskTracker::new(config.no_change_in_height.critical_threshold_duration()),
        );
        state.seed_window_timers(
            chainlink_metrics::MAX_UNCONFIRMED_BLOCKS,
            TimedTaskTracker::new(config.max_unconfirmed_blocks.warning_window_duration()),
            TimedTaskTracker::new(config.max_unconfirmed_blocks.critical_window_duration()),
        );

        state.seed_repeat_limiter(chainlink_metrics::NODE_IS_DOWN, &config.node_is_down);
        state.seed_repeat_limiter(
            chainlink_metrics::NO_CHANGE_IN_HEIGHT,
            &config.no_change_in_height,
        );
        state.seed_repeat_limiter(
            chainlink_metrics::MAX_UNCONFIRMED_BLOCKS,
            &config.max_unconfirmed_blocks,
        );
        state.seed_repeat_limiter(chainlink_metrics::ERRORED_JOB_RUNS, &config.errored_job_runs);
        state.seed_repeat_limiter(chainlink_metrics::BALANCE, &config.balance_amount);

        state.warning_occurrences_in_period_tracker.insert(
            chainlink_metrics::ERRORED_JOB_RUNS.to_string(),
            OccurrencesInPeriodTracker::new(config.errored_job_runs.warning_window_duration()),
        );
        state.critical_occurrences_in_period_tracker.insert(
            chainlink_metrics::ERRORED_JOB_RUNS.to_string(),
            OccurrencesInPeriodTracker::new(config.errored_job_runs.critical_window_duration()),
        );

        state
    }

    /// Alerting record for a system monitorable
    pub fn for_system(config: &SystemAlertsConfig) -> Self {
        let mut state = Self::new();

        for metric in [
            system_metrics::SYSTEM_IS_DOWN,
            system_metrics::CPU_USAGE,
            system_metrics::RAM_USAGE,
            system_metrics::STORAGE_USAGE,
        ] {
            state.set_warning_sent(metric, false);
            state.set_critical_sent(metric, false);
        }
        for metric in [
            system_metrics::INVALID_URL,
            system_metrics::METRIC_NOT_FOUND,
        ] {
            state.set_error_sent(metric, false);
        }

        state.seed_window_timers(
            system_metrics::SYSTEM_IS_DOWN,
            TimedTaskTracker::new(config.system_is_down.warning_threshold_duration()),
            TimedTaskTracker::new(config.system_is_down.critical_threshold_duration()),
        );

        state.seed_repeat_limiter(system_metrics::SYSTEM_IS_DOWN, &config.system_is_down);
        state.seed_repeat_limiter(system_metrics::CPU_USAGE, &config.cpu_usage);
        state.seed_repeat_limiter(system_metrics::RAM_USAGE, &config.ram_usage);
        state.seed_repeat_limiter(system_metrics::STORAGE_USAGE, &config.storage_usage);

        state
    }

    /// Alerting record for a github repository. Release alerts are one-shot
    /// INFO and page-access problems use the error protocol, so only the
    /// error flag needs seeding.
    pub fn for_github_repo() -> Self {
        let mut state = Self::new();
        state.set_error_sent(super::github_metrics::CANNOT_ACCESS_PAGE, false);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThresholdConfig;

    fn chainlink_config() -> ChainlinkNodeAlertsConfig {
        ChainlinkNodeAlertsConfig {
            parent_id: "chain_1".to_string(),
            node_is_down: ThresholdConfig {
                name: "node_is_down".to_string(),
                warning_threshold: 3.0,
                critical_threshold: 7.0,
                critical_repeat: 5.0,
                ..ThresholdConfig::default()
            },
            no_change_in_height: ThresholdConfig {
                name: "no_change_in_height".to_string(),
                warning_threshold: 3.0,
                critical_threshold: 7.0,
                critical_repeat: 5.0,
                ..ThresholdConfig::default()
            },
            max_unconfirmed_blocks: ThresholdConfig {
                name: "max_unconfirmed_blocks".to_string(),
                warning_threshold: 3.0,
                critical_threshold: 5.0,
                warning_time_window: 3.0,
                critical_time_window: 7.0,
                critical_repeat: 5.0,
                ..ThresholdConfig::default()
            },
            errored_job_runs: ThresholdConfig {
                name: "errored_job_runs".to_string(),
                warning_threshold: 3.0,
                critical_threshold: 5.0,
                warning_time_window: 3.0,
                critical_time_window: 7.0,
                critical_repeat: 5.0,
                ..ThresholdConfig::default()
            },
            balance_amount: ThresholdConfig {
                name: "balance_amount".to_string(),
                warning_threshold: 10.0,
                critical_threshold: 5.0,
                critical_repeat: 5.0,
                ..ThresholdConfig::default()
            },
        }
    }

    #[test]
    fn test_unseeded_flags_read_as_not_sent() {
        let state = AlertingState::new();
        assert!(!state.warning_sent("anything"));
        assert!(!state.critical_sent("anything"));
        assert!(!state.error_sent("anything"));
        assert!(!state.any_severity_sent("anything"));
    }

    #[test]
    fn test_chainlink_state_seeds_all_containers() {
        let state = AlertingState::for_chainlink_node(&chainlink_config());
        assert!(state
            .warning_window_timer
            .contains_key(chainlink_metrics::NODE_IS_DOWN));
        assert!(state
            .critical_window_timer
            .contains_key(chainlink_metrics::NO_CHANGE_IN_HEIGHT));
        assert!(state
            .critical_repeat_timer
            .contains_key(chainlink_metrics::BALANCE));
        assert!(state
            .warning_occurrences_in_period_tracker
            .contains_key(chainlink_metrics::ERRORED_JOB_RUNS));
        assert!(state
            .critical_occurrences_in_period_tracker
            .contains_key(chainlink_metrics::ERRORED_JOB_RUNS));
        assert!(!state.warning_sent(chainlink_metrics::NODE_IS_DOWN));
        assert!(!state.error_sent(chainlink_metrics::INVALID_URL));
        assert!(state.current_height.is_none());
    }

    #[test]
    fn test_disabled_repeat_seeds_disabled_limiter() {
        let mut config = chainlink_config();
        config.node_is_down.critical_repeat_enabled = false;
        let state = AlertingState::for_chainlink_node(&config);
        let limiter = &state.critical_repeat_timer[chainlink_metrics::NODE_IS_DOWN];
        assert!(!limiter.can_do_task(1_000_000.0));
    }

    #[test]
    fn test_window_timer_durations_come_from_config() {
        let state = AlertingState::for_chainlink_node(&chainlink_config());
        let warning = &state.warning_window_timer[chainlink_metrics::MAX_UNCONFIRMED_BLOCKS];
        let critical = &state.critical_window_timer[chainlink_metrics::MAX_UNCONFIRMED_BLOCKS];
        assert_eq!(warning.duration().as_secs_f64(), 3.0);
        assert_eq!(critical.duration().as_secs_f64(), 7.0);
    }
}
