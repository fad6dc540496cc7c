// chainwatch - Alerter Module
// Alert model, metric codes, classification factory, and subsystem shells

pub mod alerts;
pub mod chainlink;
pub mod factory;
pub mod github;
pub mod runner;
pub mod state;
pub mod system;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Informational alert, including resolves of previously raised problems
    Info,
    /// Warning alert
    Warning,
    /// Critical alert requiring immediate attention
    Critical,
    /// Operational error surfaced as an alert
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Stable identifier of a specific alert kind within a metric family
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertCode {
    /// Human-readable alert kind, e.g. "NodeWentDownAt"
    pub name: String,

    /// Stable wire value, e.g. "chainlink_node_alert_10"
    pub value: String,
}

impl AlertCode {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// A single alert produced by the alerting factory.
///
/// One flat record covers every alert kind; the free functions in
/// [`alerts`] fill it in. Equality is field-wise, which is what the
/// factory tests and downstream dedup rely on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Which alert kind this is
    pub alert_code: AlertCode,

    /// Alert severity
    pub severity: Severity,

    /// Human-readable alert message
    pub message: String,

    /// Seconds since the epoch at classification time
    pub timestamp: f64,

    /// Chain-scoped identifier grouping monitorables
    pub parent_id: String,

    /// Monitorable this alert originated from
    pub origin_id: String,

    /// Metric family the alert belongs to
    pub metric_code: String,

    /// Extra alert data (value, previous, duration) where applicable
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub alert_data: HashMap<String, serde_json::Value>,
}

impl Alert {
    /// Wire form published on the alert exchange. The full alert body rides
    /// along under `alert_data` so every transport sees the same payload.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "alert_code": self.alert_code,
            "severity": self.severity,
            "message": self.message,
            "timestamp": self.timestamp,
            "parent_id": self.parent_id,
            "origin_id": self.origin_id,
            "metric_code": self.metric_code,
            "alert_data": self.alert_data,
        })
    }
}

/// Metric codes for chainlink node alerts
pub mod chainlink_metrics {
    pub const NODE_IS_DOWN: &str = "chainlink_node_is_down";
    pub const NO_CHANGE_IN_HEIGHT: &str = "chainlink_node_change_in_height";
    pub const MAX_UNCONFIRMED_BLOCKS: &str = "chainlink_node_max_unconfirmed_blocks";
    pub const ERRORED_JOB_RUNS: &str = "chainlink_node_errored_job_runs";
    pub const BALANCE: &str = "chainlink_node_balance";
    pub const INVALID_URL: &str = "chainlink_node_prometheus_url_invalid";
    pub const METRIC_NOT_FOUND: &str = "chainlink_node_metric_not_found";
    pub const PROMETHEUS_SOURCE_IS_DOWN: &str = "chainlink_node_prometheus_is_down";
    pub const CHANGE_IN_SOURCE_NODE: &str = "chainlink_node_change_in_source_node";
}

/// Metric codes for system alerts
pub mod system_metrics {
    pub const SYSTEM_IS_DOWN: &str = "system_is_down";
    pub const CPU_USAGE: &str = "system_cpu_usage";
    pub const RAM_USAGE: &str = "system_ram_usage";
    pub const STORAGE_USAGE: &str = "system_storage_usage";
    pub const INVALID_URL: &str = "system_url_invalid";
    pub const METRIC_NOT_FOUND: &str = "system_metric_not_found";
}

/// Metric codes for github repo alerts
pub mod github_metrics {
    pub const RELEASE: &str = "github_release";
    pub const CANNOT_ACCESS_PAGE: &str = "github_cannot_access_page";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_display_is_upper_case() {
        assert_eq!(Severity::Info.to_string(), "INFO");
        assert_eq!(Severity::Warning.to_string(), "WARNING");
        assert_eq!(Severity::Critical.to_string(), "CRITICAL");
        assert_eq!(Severity::Error.to_string(), "ERROR");
    }

    #[test]
    fn test_severity_serde_wire_form() {
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"CRITICAL\""
        );
        let severity: Severity = serde_json::from_str("\"WARNING\"").unwrap();
        assert_eq!(severity, Severity::Warning);
    }

    #[test]
    fn test_alert_equality_is_field_wise() {
        let make = |ts: f64| Alert {
            alert_code: AlertCode::new("NodeWentDownAt", "chainlink_node_alert_10"),
            severity: Severity::Warning,
            message: "node-1 went down at 100".to_string(),
            timestamp: ts,
            parent_id: "chain_1".to_string(),
            origin_id: "node_1".to_string(),
            metric_code: chainlink_metrics::NODE_IS_DOWN.to_string(),
            alert_data: HashMap::new(),
        };
        assert_eq!(make(100.0), make(100.0));
        assert_ne!(make(100.0), make(101.0));
    }

    #[test]
    fn test_alert_wire_form_carries_full_body() {
        let mut alert_data = HashMap::new();
        alert_data.insert("value".to_string(), serde_json::json!(42.0));
        let alert = Alert {
            alert_code: AlertCode::new("CpuUsageIncreasedAboveThreshold", "system_alert_2"),
            severity: Severity::Critical,
            message: "host-1 CPU usage INCREASED above CRITICAL threshold.".to_string(),
            timestamp: 1_600_000_000.0,
            parent_id: "chain_1".to_string(),
            origin_id: "system_1".to_string(),
            metric_code: system_metrics::CPU_USAGE.to_string(),
            alert_data,
        };
        let wire = alert.to_wire();
        assert_eq!(wire["severity"], "CRITICAL");
        assert_eq!(wire["alert_code"]["value"], "system_alert_2");
        assert_eq!(wire["alert_data"]["value"], 42.0);
        assert_eq!(wire["metric_code"], "system_cpu_usage");
    }
}
