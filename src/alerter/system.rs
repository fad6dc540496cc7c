// chainwatch - System Alerter
// Classifies transformed host metrics into alerts

use super::factory::AlertingFactory;
use super::runner::AlertClassifier;
use super::state::AlertingState;
use super::{alerts, system_metrics, Alert};
use crate::bus::topology;
use crate::config::{SystemAlertsConfig, ThresholdConfig};
use crate::error::{codes, AlerterError};
use crate::{MetaData, MetricPair, TransformedDataMessage, TransformedError, TransformedResult};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Metric pairs a system transformer attaches to a result envelope
#[derive(Debug, Clone, Deserialize)]
struct SystemData {
    went_down_at: MetricPair<Option<f64>>,
    cpu_usage: MetricPair<f64>,
    ram_usage: MetricPair<f64>,
    storage_usage: MetricPair<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct DowntimeData {
    went_down_at: MetricPair<Option<f64>>,
}

/// The system subsystem: percentage-usage thresholds plus host downtime.
/// Configured per chain; a message for an unconfigured chain is skipped.
pub struct SystemAlerter {
    alerter_name: String,
    configs: HashMap<String, SystemAlertsConfig>,
    factory: AlertingFactory,
}

impl SystemAlerter {
    pub fn new(configs: HashMap<String, SystemAlertsConfig>) -> Self {
        Self {
            alerter_name: "System Alerter".to_string(),
            configs,
            factory: AlertingFactory::new(),
        }
    }

    /// Alerter serving a single chain
    pub fn for_chain(config: SystemAlertsConfig) -> Self {
        let mut configs = HashMap::new();
        configs.insert(config.parent_id.clone(), config);
        Self::new(configs)
    }

    pub fn factory(&self) -> &AlertingFactory {
        &self.factory
    }

    fn chain_config(&self, parent_id: &str) -> Option<SystemAlertsConfig> {
        let config = self.configs.get(parent_id).cloned();
        if config.is_none() {
            debug!(parent_id, "no system alerts config for chain, skipping");
        }
        config
    }

    #[allow(clippy::too_many_arguments)]
    fn classify_usage(
        factory: &mut AlertingFactory,
        meta: &MetaData,
        usage: &MetricPair<f64>,
        config: &ThresholdConfig,
        resource: &str,
        metric_code: &'static str,
        raise_code: &'static str,
        resolve_code: &'static str,
        out: &mut Vec<Alert>,
    ) {
        let name = meta.origin_name.as_str();
        let parent_id = meta.parent_id.as_str();
        let origin_id = meta.origin_id.as_str();
        factory.classify_thresholded_alert(
            usage.current,
            config,
            |value, severity, ts, threshold_severity| {
                alerts::system::percentage_usage_increased_above_threshold(
                    name,
                    resource,
                    metric_code,
                    raise_code,
                    value,
                    severity,
                    ts,
                    threshold_severity,
                    parent_id,
                    origin_id,
                )
            },
            |value, severity, ts, threshold_severity| {
                alerts::system::percentage_usage_decreased_below_threshold(
                    name,
                    resource,
                    metric_code,
                    resolve_code,
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
            metric_code,
            meta.last_monitored,
        );
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
            AlertingState::for_system(&config),
        );
        let data: SystemData = serde_json::from_value(result.data.clone())?;
        let timestamp = meta.last_monitored;
        let name = meta.origin_name.as_str();
        let parent_id = meta.parent_id.as_str();
        let origin_id = meta.origin_id.as_str();

        self.factory.classify_error_alert(
            codes::INVALID_URL,
            |message, severity, ts| {
                alerts::system::invalid_url(message, severity, ts, parent_id, origin_id)
            },
            |message, severity, ts| {
                alerts::system::valid_url(message, severity, ts, parent_id, origin_id)
            },
            out,
            parent_id,
            origin_id,
            system_metrics::INVALID_URL,
            "",
            &format!("Monitoring url of {} is now valid.", name),
            timestamp,
            None,
        );
        self.factory.classify_error_alert(
            codes::METRIC_NOT_FOUND,
            |message, severity, ts| {
                alerts::system::metric_not_found(message, severity, ts, parent_id, origin_id)
            },
            |message, severity, ts| {
                alerts::system::metric_found(message, severity, ts, parent_id, origin_id)
            },
            out,
            parent_id,
            origin_id,
            system_metrics::METRIC_NOT_FOUND,
            "",
            &format!("All metrics of {} found again.", name),
            timestamp,
            None,
        );

        let went_down = data.went_down_at.current;
        self.factory.classify_downtime_alert(
            went_down,
            &config.system_is_down,
            |severity, ts| {
                alerts::system::system_went_down_at(
                    name,
                    severity,
                    ts,
                    parent_id,
                    origin_id,
                    went_down.unwrap_or(ts),
                )
            },
            |duration, severity, ts| {
                alerts::system::system_still_down(name, duration, severity, ts, parent_id, origin_id)
            },
            |severity, ts| {
                alerts::system::system_back_up_again(name, severity, ts, parent_id, origin_id)
            },
            out,
            parent_id,
            origin_id,
            system_metrics::SYSTEM_IS_DOWN,
            timestamp,
        );

        Self::classify_usage(
            &mut self.factory,
            meta,
            &data.cpu_usage,
            &config.cpu_usage,
            "CPU",
            system_metrics::CPU_USAGE,
            "system_alert_4",
            "system_alert_5",
            out,
        );
        Self::classify_usage(
            &mut self.factory,
            meta,
            &data.ram_usage,
            &config.ram_usage,
            "RAM",
            system_metrics::RAM_USAGE,
            "system_alert_6",
            "system_alert_7",
            out,
        );
        Self::classify_usage(
            &mut self.factory,
            meta,
            &data.storage_usage,
            &config.storage_usage,
            "storage",
            system_metrics::STORAGE_USAGE,
            "system_alert_8",
            "system_alert_9",
            out,
        );
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
            AlertingState::for_system(&config),
        );
        let timestamp = meta.last_monitored;
        let name = meta.origin_name.as_str();
        let parent_id = meta.parent_id.as_str();
        let origin_id = meta.origin_id.as_str();

        self.factory.classify_error_alert(
            codes::INVALID_URL,
            |message, severity, ts| {
                alerts::system::invalid_url(message, severity, ts, parent_id, origin_id)
            },
            |message, severity, ts| {
                alerts::system::valid_url(message, severity, ts, parent_id, origin_id)
            },
            out,
            parent_id,
            origin_id,
            system_metrics::INVALID_URL,
            &error.message,
            &format!("Monitoring url of {} is now valid.", name),
            timestamp,
            Some(error.code),
        );
        self.factory.classify_error_alert(
            codes::METRIC_NOT_FOUND,
            |message, severity, ts| {
                alerts::system::metric_not_found(message, severity, ts, parent_id, origin_id)
            },
            |message, severity, ts| {
                alerts::system::metric_found(message, severity, ts, parent_id, origin_id)
            },
            out,
            parent_id,
            origin_id,
            system_metrics::METRIC_NOT_FOUND,
            &error.message,
            &format!("All metrics of {} found again.", name),
            timestamp,
            Some(error.code),
        );

        if error.code == codes::SYSTEM_IS_DOWN {
            let downtime: DowntimeData = serde_json::from_value(error.data.clone())?;
            let went_down = downtime.went_down_at.current;
            self.factory.classify_downtime_alert(
                went_down,
                &config.system_is_down,
                |severity, ts| {
                    alerts::system::system_went_down_at(
                        name,
                        severity,
                        ts,
                        parent_id,
                        origin_id,
                        went_down.unwrap_or(ts),
                    )
                },
                |duration, severity, ts| {
                    alerts::system::system_still_down(
                        name, duration, severity, ts, parent_id, origin_id,
                    )
                },
                |severity, ts| {
                    alerts::system::system_back_up_again(name, severity, ts, parent_id, origin_id)
                },
                out,
                parent_id,
                origin_id,
                system_metrics::SYSTEM_IS_DOWN,
                timestamp,
            );
        }
        Ok(())
    }
}

impl AlertClassifier for SystemAlerter {
    fn name(&self) -> &str {
        &self.alerter_name
    }

    fn input_queue(&self) -> &'static str {
        topology::SYSTEM_ALERTER_INPUT_QUEUE
    }

    fn input_bindings(&self) -> Vec<(&'static str, &'static str)> {
        vec![(
            topology::TRANSFORMED_DATA_EXCHANGE,
            topology::SYSTEM_TRANSFORMED_DATA_PATTERN,
        )]
    }

    fn alert_routing_key(&self) -> &'static str {
        topology::SYSTEM_ALERT_ROUTING_KEY
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
    use crate::alerter::Severity;

    fn config() -> SystemAlertsConfig {
        let usage = |name: &str| ThresholdConfig {
            name: name.to_string(),
            warning_threshold: 85.0,
            critical_threshold: 95.0,
            critical_repeat: 300.0,
            ..ThresholdConfig::default()
        };
        SystemAlertsConfig {
            parent_id: "chain_1".to_string(),
            system_is_down: ThresholdConfig {
                name: "system_is_down".to_string(),
                warning_threshold: 0.0,
                critical_threshold: 120.0,
                critical_repeat: 300.0,
                ..ThresholdConfig::default()
            },
            cpu_usage: usage("cpu_usage"),
            ram_usage: usage("ram_usage"),
            storage_usage: usage("storage_usage"),
        }
    }

    fn result_payload(cpu: f64, timestamp: f64) -> serde_json::Value {
        serde_json::json!({
            "result": {
                "meta_data": {
                    "origin_name": "validator-host",
                    "origin_id": "system_1",
                    "parent_id": "chain_1",
                    "last_monitored": timestamp
                },
                "data": {
                    "went_down_at": { "current": null, "previous": null },
                    "cpu_usage": { "current": cpu, "previous": cpu },
                    "ram_usage": { "current": 40.0, "previous": 40.0 },
                    "storage_usage": { "current": 50.0, "previous": 50.0 }
                }
            }
        })
    }

    #[test]
    fn test_healthy_system_produces_no_alerts() {
        let mut alerter = SystemAlerter::for_chain(config());
        let alerts = alerter.classify(&result_payload(20.0, 100.0)).unwrap();
        assert_eq!(alerts, Vec::new());
    }

    #[test]
    fn test_cpu_escalation_and_downgrade() {
        let mut alerter = SystemAlerter::for_chain(config());

        let alerts = alerter.classify(&result_payload(90.0, 100.0)).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(alerts[0].metric_code, system_metrics::CPU_USAGE);

        let alerts = alerter.classify(&result_payload(96.0, 101.0)).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);

        // Back into the warning band: INFO resolve first, WARNING re-raise after
        let alerts = alerter.classify(&result_payload(90.0, 102.0)).unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].severity, Severity::Info);
        assert_eq!(alerts[1].severity, Severity::Warning);

        let alerts = alerter.classify(&result_payload(10.0, 103.0)).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Info);
    }

    #[test]
    fn test_system_down_error_with_zero_warning_window() {
        let mut alerter = SystemAlerter::for_chain(config());
        let payload = serde_json::json!({
            "error": {
                "meta_data": {
                    "origin_name": "validator-host",
                    "origin_id": "system_1",
                    "parent_id": "chain_1",
                    "last_monitored": 100.0
                },
                "message": "System validator-host is unreachable",
                "code": 5004,
                "data": {
                    "went_down_at": { "current": 100.0, "previous": null }
                }
            }
        });

        // warning_threshold is 0 so the warning fires on the first round
        let alerts = alerter.classify(&payload).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_code.name, "SystemWentDownAt");
        assert_eq!(alerts[0].severity, Severity::Warning);
    }

    #[test]
    fn test_unrelated_error_does_not_touch_downtime_state() {
        let mut alerter = SystemAlerter::for_chain(config());
        let payload = serde_json::json!({
            "error": {
                "meta_data": {
                    "origin_name": "validator-host",
                    "origin_id": "system_1",
                    "parent_id": "chain_1",
                    "last_monitored": 100.0
                },
                "message": "Invalid URL 'nope'",
                "code": 5009
            }
        });
        let alerts = alerter.classify(&payload).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_code.name, "InvalidUrl");

        let state = alerter
            .factory()
            .alerting_state("chain_1", "system_1")
            .unwrap();
        assert!(!state.warning_sent(system_metrics::SYSTEM_IS_DOWN));
    }
}
