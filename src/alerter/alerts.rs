// chainwatch - Alert Constructors
// One free function per alert kind, all filling the flat Alert record

use super::{chainlink_metrics, github_metrics, system_metrics, Alert, AlertCode, Severity};
use chrono::{TimeZone, Utc};
use std::collections::HashMap;

#[allow(clippy::too_many_arguments)]
fn new_alert(
    name: &str,
    value: &str,
    severity: Severity,
    message: String,
    timestamp: f64,
    parent_id: &str,
    origin_id: &str,
    metric_code: &str,
    alert_data: HashMap<String, serde_json::Value>,
) -> Alert {
    Alert {
        alert_code: AlertCode::new(name, value),
        severity,
        message,
        timestamp,
        parent_id: parent_id.to_string(),
        origin_id: origin_id.to_string(),
        metric_code: metric_code.to_string(),
        alert_data,
    }
}

fn data_value(value: f64) -> HashMap<String, serde_json::Value> {
    let mut data = HashMap::new();
    data.insert("value".to_string(), serde_json::json!(value));
    data
}

fn render_timestamp(timestamp: f64) -> String {
    match Utc.timestamp_opt(timestamp as i64, 0).single() {
        Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("{}", timestamp),
    }
}

/// Alerts produced by the chainlink node alerter
pub mod chainlink {
    use super::*;

    #[allow(clippy::too_many_arguments)]
    pub fn no_change_in_height(
        origin_name: &str,
        duration: f64,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
        height: u64,
    ) -> Alert {
        let mut data = HashMap::new();
        data.insert("duration".to_string(), serde_json::json!(duration));
        data.insert("value".to_string(), serde_json::json!(height));
        new_alert(
            "NoChangeInHeight",
            "chainlink_node_alert_1",
            severity,
            format!(
                "The block height of {} has not changed in {} seconds. Last height: {}.",
                origin_name, duration, height
            ),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::NO_CHANGE_IN_HEIGHT,
            data,
        )
    }

    pub fn block_height_updated(
        origin_name: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
        height: u64,
    ) -> Alert {
        let mut data = HashMap::new();
        data.insert("value".to_string(), serde_json::json!(height));
        new_alert(
            "BlockHeightUpdated",
            "chainlink_node_alert_2",
            severity,
            format!(
                "{} is receiving blocks again. New height: {}.",
                origin_name, height
            ),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::NO_CHANGE_IN_HEIGHT,
            data,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn max_unconfirmed_blocks_increased_above_threshold(
        origin_name: &str,
        value: f64,
        severity: Severity,
        timestamp: f64,
        duration: f64,
        threshold_severity: Severity,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        let mut data = data_value(value);
        data.insert("duration".to_string(), serde_json::json!(duration));
        new_alert(
            "MaxUnconfirmedBlocksIncreasedAboveThreshold",
            "chainlink_node_alert_3",
            severity,
            format!(
                "{} max unconfirmed blocks INCREASED above {} threshold for at least {} \
                 seconds. Current value: {}.",
                origin_name, threshold_severity, duration, value
            ),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::MAX_UNCONFIRMED_BLOCKS,
            data,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn max_unconfirmed_blocks_decreased_below_threshold(
        origin_name: &str,
        value: f64,
        severity: Severity,
        timestamp: f64,
        threshold_severity: Severity,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "MaxUnconfirmedBlocksDecreasedBelowThreshold",
            "chainlink_node_alert_4",
            severity,
            format!(
                "{} max unconfirmed blocks DECREASED below {} threshold. Current value: {}.",
                origin_name, threshold_severity, value
            ),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::MAX_UNCONFIRMED_BLOCKS,
            data_value(value),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn errored_job_runs_increased_above_threshold(
        origin_name: &str,
        occurrences: f64,
        severity: Severity,
        timestamp: f64,
        period: f64,
        threshold_severity: Severity,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        let mut data = data_value(occurrences);
        data.insert("period".to_string(), serde_json::json!(period));
        new_alert(
            "TotalErroredJobRunsIncreasedAboveThreshold",
            "chainlink_node_alert_5",
            severity,
            format!(
                "The total errored job runs of {} INCREASED above {} threshold. {} errored \
                 job runs in the last {} seconds.",
                origin_name, threshold_severity, occurrences, period
            ),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::ERRORED_JOB_RUNS,
            data,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn errored_job_runs_decreased_below_threshold(
        origin_name: &str,
        occurrences: f64,
        severity: Severity,
        timestamp: f64,
        period: f64,
        threshold_severity: Severity,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        let mut data = data_value(occurrences);
        data.insert("period".to_string(), serde_json::json!(period));
        new_alert(
            "TotalErroredJobRunsDecreasedBelowThreshold",
            "chainlink_node_alert_6",
            severity,
            format!(
                "The total errored job runs of {} DECREASED below {} threshold. {} errored \
                 job runs in the last {} seconds.",
                origin_name, threshold_severity, occurrences, period
            ),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::ERRORED_JOB_RUNS,
            data,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn balance_decreased_below_threshold(
        origin_name: &str,
        value: f64,
        severity: Severity,
        timestamp: f64,
        threshold_severity: Severity,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "BalanceDecreasedBelowThreshold",
            "chainlink_node_alert_7",
            severity,
            format!(
                "The account balance of {} has DECREASED below {} threshold. Current \
                 value: {}.",
                origin_name, threshold_severity, value
            ),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::BALANCE,
            data_value(value),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn balance_increased_above_threshold(
        origin_name: &str,
        value: f64,
        severity: Severity,
        timestamp: f64,
        threshold_severity: Severity,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "BalanceIncreasedAboveThreshold",
            "chainlink_node_alert_8",
            severity,
            format!(
                "The account balance of {} has INCREASED above {} threshold. Current \
                 value: {}.",
                origin_name, threshold_severity, value
            ),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::BALANCE,
            data_value(value),
        )
    }

    pub fn node_went_down_at(
        origin_name: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
        went_down_at: f64,
    ) -> Alert {
        let mut data = HashMap::new();
        data.insert("went_down_at".to_string(), serde_json::json!(went_down_at));
        new_alert(
            "NodeWentDownAt",
            "chainlink_node_alert_9",
            severity,
            format!(
                "{} went down at {}.",
                origin_name,
                render_timestamp(went_down_at)
            ),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::NODE_IS_DOWN,
            data,
        )
    }

    pub fn node_still_down(
        origin_name: &str,
        duration: f64,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        let mut data = HashMap::new();
        data.insert("duration".to_string(), serde_json::json!(duration));
        new_alert(
            "NodeStillDown",
            "chainlink_node_alert_10",
            severity,
            format!(
                "{} is still down, it has been down for {} seconds.",
                origin_name, duration
            ),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::NODE_IS_DOWN,
            data,
        )
    }

    pub fn node_back_up_again(
        origin_name: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "NodeBackUpAgain",
            "chainlink_node_alert_11",
            severity,
            format!("{} is back up again.", origin_name),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::NODE_IS_DOWN,
            HashMap::new(),
        )
    }

    pub fn invalid_url(
        message: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "InvalidUrl",
            "chainlink_node_alert_12",
            severity,
            message.to_string(),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::INVALID_URL,
            HashMap::new(),
        )
    }

    pub fn valid_url(
        message: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "ValidUrl",
            "chainlink_node_alert_13",
            severity,
            message.to_string(),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::INVALID_URL,
            HashMap::new(),
        )
    }

    pub fn metric_not_found(
        message: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "MetricNotFound",
            "chainlink_node_alert_14",
            severity,
            message.to_string(),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::METRIC_NOT_FOUND,
            HashMap::new(),
        )
    }

    pub fn metric_found(
        message: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "MetricFound",
            "chainlink_node_alert_15",
            severity,
            message.to_string(),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::METRIC_NOT_FOUND,
            HashMap::new(),
        )
    }

    pub fn prometheus_source_is_down(
        origin_name: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "PrometheusSourceIsDown",
            "chainlink_node_alert_16",
            severity,
            format!("The prometheus source of {} is down.", origin_name),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::PROMETHEUS_SOURCE_IS_DOWN,
            HashMap::new(),
        )
    }

    pub fn prometheus_source_back_up_again(
        origin_name: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "PrometheusSourceBackUpAgain",
            "chainlink_node_alert_17",
            severity,
            format!("The prometheus source of {} is back up again.", origin_name),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::PROMETHEUS_SOURCE_IS_DOWN,
            HashMap::new(),
        )
    }

    pub fn change_in_source_node(
        origin_name: &str,
        new_source: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        let mut data = HashMap::new();
        data.insert("new_source".to_string(), serde_json::json!(new_source));
        new_alert(
            "ChangeInSourceNode",
            "chainlink_node_alert_18",
            severity,
            format!(
                "{} restarted. The source node was changed to {}.",
                origin_name, new_source
            ),
            timestamp,
            parent_id,
            origin_id,
            chainlink_metrics::CHANGE_IN_SOURCE_NODE,
            data,
        )
    }
}

/// Alerts produced by the system alerter
pub mod system {
    use super::*;

    pub fn system_went_down_at(
        origin_name: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
        went_down_at: f64,
    ) -> Alert {
        let mut data = HashMap::new();
        data.insert("went_down_at".to_string(), serde_json::json!(went_down_at));
        new_alert(
            "SystemWentDownAt",
            "system_alert_1",
            severity,
            format!(
                "{} went down at {}.",
                origin_name,
                render_timestamp(went_down_at)
            ),
            timestamp,
            parent_id,
            origin_id,
            system_metrics::SYSTEM_IS_DOWN,
            data,
        )
    }

    pub fn system_still_down(
        origin_name: &str,
        duration: f64,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        let mut data = HashMap::new();
        data.insert("duration".to_string(), serde_json::json!(duration));
        new_alert(
            "SystemStillDown",
            "system_alert_2",
            severity,
            format!(
                "{} is still down, it has been down for {} seconds.",
                origin_name, duration
            ),
            timestamp,
            parent_id,
            origin_id,
            system_metrics::SYSTEM_IS_DOWN,
            data,
        )
    }

    pub fn system_back_up_again(
        origin_name: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "SystemBackUpAgain",
            "system_alert_3",
            severity,
            format!("{} is back up again.", origin_name),
            timestamp,
            parent_id,
            origin_id,
            system_metrics::SYSTEM_IS_DOWN,
            HashMap::new(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn percentage_usage_increased_above_threshold(
        origin_name: &str,
        resource: &str,
        metric_code: &str,
        alert_value: &str,
        value: f64,
        severity: Severity,
        timestamp: f64,
        threshold_severity: Severity,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "PercentageUsageIncreasedAboveThreshold",
            alert_value,
            severity,
            format!(
                "{} {} usage INCREASED above {} threshold. Current value: {}%.",
                origin_name, resource, threshold_severity, value
            ),
            timestamp,
            parent_id,
            origin_id,
            metric_code,
            data_value(value),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn percentage_usage_decreased_below_threshold(
        origin_name: &str,
        resource: &str,
        metric_code: &str,
        alert_value: &str,
        value: f64,
        severity: Severity,
        timestamp: f64,
        threshold_severity: Severity,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "PercentageUsageDecreasedBelowThreshold",
            alert_value,
            severity,
            format!(
                "{} {} usage DECREASED below {} threshold. Current value: {}%.",
                origin_name, resource, threshold_severity, value
            ),
            timestamp,
            parent_id,
            origin_id,
            metric_code,
            data_value(value),
        )
    }

    pub fn invalid_url(
        message: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "InvalidUrl",
            "system_alert_10",
            severity,
            message.to_string(),
            timestamp,
            parent_id,
            origin_id,
            system_metrics::INVALID_URL,
            HashMap::new(),
        )
    }

    pub fn valid_url(
        message: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "ValidUrl",
            "system_alert_11",
            severity,
            message.to_string(),
            timestamp,
            parent_id,
            origin_id,
            system_metrics::INVALID_URL,
            HashMap::new(),
        )
    }

    pub fn metric_not_found(
        message: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "MetricNotFound",
            "system_alert_12",
            severity,
            message.to_string(),
            timestamp,
            parent_id,
            origin_id,
            system_metrics::METRIC_NOT_FOUND,
            HashMap::new(),
        )
    }

    pub fn metric_found(
        message: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "MetricFound",
            "system_alert_13",
            severity,
            message.to_string(),
            timestamp,
            parent_id,
            origin_id,
            system_metrics::METRIC_NOT_FOUND,
            HashMap::new(),
        )
    }
}

/// Alerts produced by the github alerter
pub mod github {
    use super::*;

    #[allow(clippy::too_many_arguments)]
    pub fn new_release(
        repo_name: &str,
        release_name: &str,
        tag_name: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        let mut data = HashMap::new();
        data.insert("release_name".to_string(), serde_json::json!(release_name));
        data.insert("tag_name".to_string(), serde_json::json!(tag_name));
        new_alert(
            "NewGitHubRelease",
            "github_alert_1",
            severity,
            format!(
                "Repo: {} has a new release {} tagged {}.",
                repo_name, release_name, tag_name
            ),
            timestamp,
            parent_id,
            origin_id,
            github_metrics::RELEASE,
            data,
        )
    }

    pub fn cannot_access_page(
        message: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "CannotAccessGitHubPage",
            "github_alert_2",
            severity,
            message.to_string(),
            timestamp,
            parent_id,
            origin_id,
            github_metrics::CANNOT_ACCESS_PAGE,
            HashMap::new(),
        )
    }

    pub fn page_now_accessible(
        message: &str,
        severity: Severity,
        timestamp: f64,
        parent_id: &str,
        origin_id: &str,
    ) -> Alert {
        new_alert(
            "GitHubPageNowAccessible",
            "github_alert_3",
            severity,
            message.to_string(),
            timestamp,
            parent_id,
            origin_id,
            github_metrics::CANNOT_ACCESS_PAGE,
            HashMap::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_pair_share_metric_code() {
        let raised = chainlink::balance_decreased_below_threshold(
            "node-1", 4.0, Severity::Critical, 100.0, Severity::Critical, "chain_1", "node_1",
        );
        let resolved = chainlink::balance_increased_above_threshold(
            "node-1", 11.0, Severity::Info, 200.0, Severity::Critical, "chain_1", "node_1",
        );
        assert_eq!(raised.metric_code, resolved.metric_code);
        assert_ne!(raised.alert_code, resolved.alert_code);
        assert_eq!(raised.alert_data["value"], serde_json::json!(4.0));
    }

    #[test]
    fn test_went_down_message_renders_timestamp() {
        let alert = chainlink::node_went_down_at(
            "node-1",
            Severity::Warning,
            1_600_000_003.0,
            "chain_1",
            "node_1",
            1_600_000_000.0,
        );
        assert!(alert.message.contains("went down at 2020-09-13"));
        assert_eq!(
            alert.alert_data["went_down_at"],
            serde_json::json!(1_600_000_000.0)
        );
    }

    #[test]
    fn test_new_release_carries_tag_data() {
        let alert = github::new_release(
            "chainwatch/chainwatch",
            "v1.2.0",
            "1.2.0",
            Severity::Info,
            100.0,
            "chain_1",
            "repo_1",
        );
        assert_eq!(alert.severity, Severity::Info);
        assert_eq!(alert.alert_data["tag_name"], serde_json::json!("1.2.0"));
        assert!(alert.message.contains("new release"));
    }
}
