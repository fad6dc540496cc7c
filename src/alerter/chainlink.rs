// chainwatch - Chainlink Node Alerter
// Classifies transformed chainlink node metrics into alerts

use super::factory::AlertingFactory;
use super::runner::AlertClassifier;
use super::state::AlertingState;
use super::{alerts, chainlink_metrics, Alert, Severity};
use crate::bus::topology;
use crate::config::ChainlinkNodeAlertsConfig;
use crate::error::{codes, AlerterError};
use crate::{MetricPair, TransformedDataMessage, TransformedError, TransformedResult};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Metric pairs a chainlink node transformer attaches to a result envelope
#[derive(Debug, Clone, Deserialize)]
struct ChainlinkNodeData {
    went_down_at: MetricPair<Option<f64>>,
    current_height: MetricPair<u64>,
    max_unconfirmed_blocks: MetricPair<f64>,
    errored_job_runs_total: MetricPair<f64>,
    balance: MetricPair<f64>,
    last_source_used: MetricPair<Option<String>>,
    prometheus_source_up: MetricPair<bool>,
}

/// Downtime extras on a node-is-down error envelope
#[derive(Debug, Clone, Deserialize)]
struct DowntimeData {
    went_down_at: MetricPair<Option<f64>>,
}

/// The chainlink node subsystem: one alerting record per node, all metric
/// families classified on every result envelope. Configured per chain; a
/// message for an unconfigured chain is skipped.
pub struct ChainlinkNodeAlerter {
    alerter_name: String,
    configs: HashMap<String, ChainlinkNodeAlertsConfig>,
    factory: AlertingFactory,
}

impl ChainlinkNodeAlerter {
    pub fn new(configs: HashMap<String, ChainlinkNodeAlertsConfig>) -> Self {
        Self {
            alerter_name: "Chainlink Node Alerter".to_string(),
            configs,
            factory: AlertingFactory::new(),
        }
    }

    /// Alerter serving a single chain
    pub fn for_chain(config: ChainlinkNodeAlertsConfig) -> Self {
        let mut configs = HashMap::new();
        configs.insert(config.parent_id.clone(), config);
        Self::new(configs)
    }

    pub fn factory(&self) -> &AlertingFactory {
        &self.factory
    }

    fn chain_config(&self, parent_id: &str) -> Option<ChainlinkNodeAlertsConfig> {
        let config = self.configs.get(parent_id).cloned();
        if config.is_none() {
            debug!(parent_id, "no chainlink alerts config for chain, skipping");
        }
        config
    }

    fn process_result(
        &mut self,
        result: &TransformedResult,
        out: &mut Vec<Alert>,
    ) -> Result<(), AlerterError> {
        let meta = &result.meta_data;
        let config = match self.chain_config(&meta.parent_id) {
            Some(config) => config,
            None => return Ok(()),
        };
        self.factory.create_alerting_state(
            &meta.parent_id,
            &meta.origin_id,
            AlertingState::for_chainlink_node(&config),
        );
        let data: ChainlinkNodeData = serde_json::from_value(result.data.clone())?;
        let timestamp = meta.last_monitored;
        let name = meta.origin_name.as_str();
        let parent_id = meta.parent_id.as_str();
        let origin_id = meta.origin_id.as_str();

        // A successful round resolves any outstanding source errors
        self.factory.classify_error_alert(
            codes::INVALID_URL,
            |message, severity, ts| {
                alerts::chainlink::invalid_url(message, severity, ts, parent_id, origin_id)
            },
            |message, severity, ts| {
                alerts::chainlink::valid_url(message, severity, ts, parent_id, origin_id)
            },
            out,
            parent_id,
            origin_id,
            chainlink_metrics::INVALID_URL,
            "",
            &format!("Prometheus url of {} is now valid.", name),
            timestamp,
            None,
        );
        self.factory.classify_error_alert(
            codes::METRIC_NOT_FOUND,
            |message, severity, ts| {
                alerts::chainlink::metric_not_found(message, severity, ts, parent_id, origin_id)
            },
            |message, severity, ts| {
                alerts::chainlink::metric_found(message, severity, ts, parent_id, origin_id)
            },
            out,
            parent_id,
            origin_id,
            chainlink_metrics::METRIC_NOT_FOUND,
            "",
            &format!("All metrics of {} found again.", name),
            timestamp,
            None,
        );

        let went_down = data.went_down_at.current;
        self.factory.classify_downtime_alert(
            went_down,
            &config.node_is_down,
            |severity, ts| {
                alerts::chainlink::node_went_down_at(
                    name,
                    severity,
                    ts,
                    parent_id,
                    origin_id,
                    went_down.unwrap_or(ts),
                )
            },
            |duration, severity, ts| {
                alerts::chainlink::node_still_down(name, duration, severity, ts, parent_id, origin_id)
            },
            |severity, ts| {
                alerts::chainlink::node_back_up_again(name, severity, ts, parent_id, origin_id)
            },
            out,
            parent_id,
            origin_id,
            chainlink_metrics::NODE_IS_DOWN,
            timestamp,
        );

        self.factory.classify_no_change_in_alert(
            data.current_height.current,
            data.current_height.previous,
            &config.no_change_in_height,
            |duration, severity, ts, height| {
                alerts::chainlink::no_change_in_height(
                    name, duration, severity, ts, parent_id, origin_id, height,
                )
            },
            |severity, ts, height| {
                alerts::chainlink::block_height_updated(
                    name, severity, ts, parent_id, origin_id, height,
                )
            },
            out,
            parent_id,
            origin_id,
            chainlink_metrics::NO_CHANGE_IN_HEIGHT,
            timestamp,
        );

        self.factory.classify_thresholded_time_window_alert(
            data.max_unconfirmed_blocks.current,
            &config.max_unconfirmed_blocks,
            |value, severity, ts, duration, threshold_severity| {
                alerts::chainlink::max_unconfirmed_blocks_increased_above_threshold(
                    name,
                    value,
                    severity,
                    ts,
                    duration,
                    threshold_severity,
                    parent_id,
                    origin_id,
                )
            },
            |value, severity, ts, threshold_severity| {
                alerts::chainlink::max_unconfirmed_blocks_decreased_below_threshold(
                    name,
                    value,
                    severity,
                    ts,
                    threshold_severity,
                    parent_id,
                    origin_id,
                )
            },
            out,
            parent_id,
            origin_id,
            chainlink_metrics::MAX_UNCONFIRMED_BLOCKS,
            timestamp,
        );

        self.factory.classify_thresholded_in_time_period_alert(
            data.errored_job_runs_total.current,
            data.errored_job_runs_total.previous,
            &config.errored_job_runs,
            |occurrences, severity, ts, period, threshold_severity| {
                alerts::chainlink::errored_job_runs_increased_above_threshold(
                    name,
                    occurrences,
                    severity,
                    ts,
                    period,
                    threshold_severity,
                    parent_id,
                    origin_id,
                )
            },
            |occurrences, severity, ts, period, threshold_severity| {
                alerts::chainlink::errored_job_runs_decreased_below_threshold(
                    name,
                    occurrences,
                    severity,
                    ts,
                    period,
                    threshold_severity,
                    parent_id,
                    origin_id,
                )
            },
            out,
            parent_id,
            origin_id,
            chainlink_metrics::ERRORED_JOB_RUNS,
            timestamp,
        );

        self.factory.classify_thresholded_alert_reverse(
            data.balance.current,
            &config.balance_amount,
            |value, severity, ts, threshold_severity| {
                alerts::chainlink::balance_decreased_below_threshold(
                    name,
                    value,
                    severity,
                    ts,
                    threshold_severity,
                    parent_id,
                    origin_id,
                )
            },
            |value, severity, ts, threshold_severity| {
                alerts::chainlink::balance_increased_above_threshold(
                    name,
                    value,
                    severity,
                    ts,
                    threshold_severity,
                    parent_id,
                    origin_id,
                )
            },
            out,
            parent_id,
            origin_id,
            chainlink_metrics::BALANCE,
            timestamp,
        );

        if let (Some(current_source), Some(previous_source)) = (
            data.last_source_used.current.as_deref(),
            data.last_source_used.previous.as_deref(),
        ) {
            self.factory.classify_conditional_alert(
                || current_source != previous_source,
                || {
                    alerts::chainlink::change_in_source_node(
                        name,
                        current_source,
                        Severity::Warning,
                        timestamp,
                        parent_id,
                        origin_id,
                    )
                },
                None::<fn() -> Alert>,
                out,
            );
        }

        let prometheus_up = data.prometheus_source_up.current;
        self.factory.classify_source_downtime_alert(
            parent_id,
            origin_id,
            chainlink_metrics::PROMETHEUS_SOURCE_IS_DOWN,
            || !prometheus_up,
            || {
                alerts::chainlink::prometheus_source_is_down(
                    name,
                    Severity::Warning,
                    timestamp,
                    parent_id,
                    origin_id,
                )
            },
            Some(|| {
                alerts::chainlink::prometheus_source_back_up_again(
                    name,
                    Severity::Info,
                    timestamp,
                    parent_id,
                    origin_id,
                )
            }),
            out,
        );

        if let Some(state) = self.factory.alerting_state_mut(parent_id, origin_id) {
            state.current_height = Some(data.current_height.current);
        }
        Ok(())
    }

    fn process_error(
        &mut self,
        error: &TransformedError,
        out: &mut Vec<Alert>,
    ) -> Result<(), AlerterError> {
        let meta = &error.meta_data;
        let config = match self.chain_config(&meta.parent_id) {
            Some(config) => config,
            None => return Ok(()),
        };
        self.factory.create_alerting_state(
            &meta.parent_id,
            &meta.origin_id,
            AlertingState::for_chainlink_node(&config),
        );
        let timestamp = meta.last_monitored;
        let name = meta.origin_name.as_str();
        let parent_id = meta.parent_id.as_str();
        let origin_id = meta.origin_id.as_str();

        self.factory.classify_error_alert(
            codes::INVALID_URL,
            |message, severity, ts| {
                alerts::chainlink::invalid_url(message, severity, ts, parent_id, origin_id)
            },
            |message, severity, ts| {
                alerts::chainlink::valid_url(message, severity, ts, parent_id, origin_id)
            },
            out,
            parent_id,
            origin_id,
            chainlink_metrics::INVALID_URL,
            &error.message,
            &format!("Prometheus url of {} is now valid.", name),
            timestamp,
            Some(error.code),
        );
        self.factory.classify_error_alert(
            codes::METRIC_NOT_FOUND,
            |message, severity, ts| {
                alerts::chainlink::metric_not_found(message, severity, ts, parent_id, origin_id)
            },
            |message, severity, ts| {
                alerts::chainlink::metric_found(message, severity, ts, parent_id, origin_id)
            },
            out,
            parent_id,
            origin_id,
            chainlink_metrics::METRIC_NOT_FOUND,
            &error.message,
            &format!("All metrics of {} found again.", name),
            timestamp,
            Some(error.code),
        );

        if error.code == codes::NODE_IS_DOWN {
            let downtime: DowntimeData = serde_json::from_value(error.data.clone())?;
            let went_down = downtime.went_down_at.current;
            self.factory.classify_downtime_alert(
                went_down,
                &config.node_is_down,
                |severity, ts| {
                    alerts::chainlink::node_went_down_at(
                        name,
                        severity,
                        ts,
                        parent_id,
                        origin_id,
                        went_down.unwrap_or(ts),
                    )
                },
                |duration, severity, ts| {
                    alerts::chainlink::node_still_down(
                        name, duration, severity, ts, parent_id, origin_id,
                    )
                },
                |severity, ts| {
                    alerts::chainlink::node_back_up_again(name, severity, ts, parent_id, origin_id)
                },
                out,
                parent_id,
                origin_id,
                chainlink_metrics::NODE_IS_DOWN,
                timestamp,
            );
        }
        Ok(())
    }
}

impl AlertClassifier for ChainlinkNodeAlerter {
    fn name(&self) -> &str {
        &self.alerter_name
    }

    fn input_queue(&self) -> &'static str {
        topology::CL_NODE_ALERTER_INPUT_QUEUE
    }

    fn input_bindings(&self) -> Vec<(&'static str, &'static str)> {
        vec![(
            topology::TRANSFORMED_DATA_EXCHANGE,
            topology::CL_NODE_TRANSFORMED_DATA_ROUTING_KEY,
        )]
    }

    fn alert_routing_key(&self) -> &'static str {
        topology::CL_NODE_ALERT_ROUTING_KEY
    }

    fn classify(&mut self, payload: &serde_json::Value) -> Result<Vec<Alert>, AlerterError> {
        let message: TransformedDataMessage = serde_json::from_value(payload.clone())?;
        let mut out = Vec::new();
        match &message {
            TransformedDataMessage::Result(result) => self.process_result(result, &mut out)?,
            TransformedDataMessage::Error(error) => self.process_error(error, &mut out)?,
        }
        Ok(out)
    }

    fn remove_chain_state(&mut self, parent_id: &str) {
        self.factory.remove_chain_alerting_state(parent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThresholdConfig;

    fn config() -> ChainlinkNodeAlertsConfig {
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
                warning_threshold: 30.0,
                critical_threshold: 60.0,
                critical_repeat: 300.0,
                ..ThresholdConfig::default()
            },
            max_unconfirmed_blocks: ThresholdConfig {
                name: "max_unconfirmed_blocks".to_string(),
                warning_threshold: 3.0,
                critical_threshold: 5.0,
                warning_time_window: 30.0,
                critical_time_window: 60.0,
                critical_repeat: 300.0,
                ..ThresholdConfig::default()
            },
            errored_job_runs: ThresholdConfig {
                name: "errored_job_runs".to_string(),
                warning_threshold: 3.0,
                critical_threshold: 5.0,
                warning_time_window: 60.0,
                critical_time_window: 120.0,
                critical_repeat: 300.0,
                ..ThresholdConfig::default()
            },
            balance_amount: ThresholdConfig {
                name: "balance_amount".to_string(),
                warning_threshold: 10.0,
                critical_threshold: 5.0,
                critical_repeat: 300.0,
                ..ThresholdConfig::default()
            },
        }
    }

    fn result_payload(balance: f64, timestamp: f64) -> serde_json::Value {
        serde_json::json!({
            "result": {
                "meta_data": {
                    "origin_name": "ocr-node-1",
                    "origin_id": "node_1",
                    "parent_id": "chain_1",
                    "last_monitored": timestamp
                },
                "data": {
                    "went_down_at": { "current": null, "previous": null },
                    "current_height": { "current": 100, "previous": 99 },
                    "max_unconfirmed_blocks": { "current": 0.0, "previous": 0.0 },
                    "errored_job_runs_total": { "current": 0.0, "previous": 0.0 },
                    "balance": { "current": balance, "previous": balance },
                    "last_source_used": {
                        "current": "http://node-1:6688",
                        "previous": "http://node-1:6688"
                    },
                    "prometheus_source_up": { "current": true, "previous": true }
                }
            }
        })
    }

    #[test]
    fn test_healthy_result_produces_no_alerts() {
        let mut alerter = ChainlinkNodeAlerter::for_chain(config());
        let alerts = alerter.classify(&result_payload(50.0, 100.0)).unwrap();
        assert_eq!(alerts, Vec::new());
    }

    #[test]
    fn test_low_balance_raises_warning_then_resolves() {
        let mut alerter = ChainlinkNodeAlerter::for_chain(config());

        let alerts = alerter.classify(&result_payload(9.0, 100.0)).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(alerts[0].metric_code, chainlink_metrics::BALANCE);

        // Same observation again: idempotent, no repeat for warnings
        let alerts = alerter.classify(&result_payload(9.0, 101.0)).unwrap();
        assert_eq!(alerts, Vec::new());

        let alerts = alerter.classify(&result_payload(20.0, 102.0)).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Info);
    }

    #[test]
    fn test_node_down_error_envelope_drives_downtime_protocol() {
        let mut alerter = ChainlinkNodeAlerter::for_chain(config());
        let error_payload = |went_down: f64, ts: f64| {
            serde_json::json!({
                "error": {
                    "meta_data": {
                        "origin_name": "ocr-node-1",
                        "origin_id": "node_1",
                        "parent_id": "chain_1",
                        "last_monitored": ts
                    },
                    "message": "Node ocr-node-1 is unreachable",
                    "code": 5015,
                    "data": {
                        "went_down_at": { "current": went_down, "previous": null }
                    }
                }
            })
        };

        // First observation starts the window timers
        let alerts = alerter.classify(&error_payload(100.0, 100.0)).unwrap();
        assert_eq!(alerts, Vec::new());

        // Warning window (3s) elapsed
        let alerts = alerter.classify(&error_payload(100.0, 103.0)).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(alerts[0].alert_code.name, "NodeWentDownAt");

        // Critical window (7s) elapsed
        let alerts = alerter.classify(&error_payload(100.0, 107.0)).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].alert_code.name, "NodeWentDownAt");

        // Node comes back via a result envelope
        let alerts = alerter.classify(&result_payload(50.0, 110.0)).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Info);
        assert_eq!(alerts[0].alert_code.name, "NodeBackUpAgain");
    }

    #[test]
    fn test_invalid_url_error_raises_and_resolves() {
        let mut alerter = ChainlinkNodeAlerter::for_chain(config());
        let error_payload = serde_json::json!({
            "error": {
                "meta_data": {
                    "origin_name": "ocr-node-1",
                    "origin_id": "node_1",
                    "parent_id": "chain_1",
                    "last_monitored": 100.0
                },
                "message": "Invalid URL 'not-a-url'",
                "code": 5009
            }
        });

        let alerts = alerter.classify(&error_payload).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Error);
        assert_eq!(alerts[0].alert_code.name, "InvalidUrl");

        // A clean result resolves the error
        let alerts = alerter.classify(&result_payload(50.0, 101.0)).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Info);
        assert_eq!(alerts[0].alert_code.name, "ValidUrl");
    }

    #[test]
    fn test_change_of_source_emits_warning() {
        let mut alerter = ChainlinkNodeAlerter::for_chain(config());
        let mut payload = result_payload(50.0, 100.0);
        payload["result"]["data"]["last_source_used"] = serde_json::json!({
            "current": "http://node-2:6688",
            "previous": "http://node-1:6688"
        });
        let alerts = alerter.classify(&payload).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_code.name, "ChangeInSourceNode");
        assert_eq!(alerts[0].severity, Severity::Warning);
    }

    #[test]
    fn test_prometheus_source_downtime_raise_and_resolve() {
        let mut alerter = ChainlinkNodeAlerter::for_chain(config());
        let mut down = result_payload(50.0, 100.0);
        down["result"]["data"]["prometheus_source_up"] =
            serde_json::json!({ "current": false, "previous": true });

        let alerts = alerter.classify(&down).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_code.name, "PrometheusSourceIsDown");

        // Still down: suppressed
        down["result"]["meta_data"]["last_monitored"] = serde_json::json!(101.0);
        let alerts = alerter.classify(&down).unwrap();
        assert_eq!(alerts, Vec::new());

        let alerts = alerter.classify(&result_payload(50.0, 102.0)).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_code.name, "PrometheusSourceBackUpAgain");
    }

    #[test]
    fn test_malformed_data_is_an_error() {
        let mut alerter = ChainlinkNodeAlerter::for_chain(config());
        let payload = serde_json::json!({
            "result": {
                "meta_data": {
                    "origin_name": "ocr-node-1",
                    "origin_id": "node_1",
                    "parent_id": "chain_1",
                    "last_monitored": 100.0
                },
                "data": { "unexpected": true }
            }
        });
        assert!(alerter.classify(&payload).is_err());
    }

    #[test]
    fn test_current_height_scalar_is_tracked() {
        let mut alerter = ChainlinkNodeAlerter::for_chain(config());
        alerter.classify(&result_payload(50.0, 100.0)).unwrap();
        let state = alerter.factory().alerting_state("chain_1", "node_1").unwrap();
        assert_eq!(state.current_height, Some(100));
    }
}
