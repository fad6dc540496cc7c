// chainwatch - Error Taxonomy
// Operational errors with stable integer codes shared across the pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors that flow through the monitoring pipeline.
///
/// Each variant carries a stable integer code in the 5000 range. The codes
/// are part of the wire contract: transformers put them in error envelopes
/// and the alerting factory compares them against expected codes when
/// classifying error alerts. Expected operational errors (metric not found,
/// system/node down, unreachable pages, invalid URLs) surface as alerts;
/// everything else is logged and dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlerterError {
    /// A connection with a component was never initialised
    ConnectionNotInitialised { component: String },

    /// A bus message could not be delivered
    MessageNotDelivered { reason: String },

    /// A monitor was given no metrics to look for
    NoMetricsGiven { message: String },

    /// A metric was missing at the queried endpoint
    MetricNotFound { metric: String, endpoint: String },

    /// A monitored system is unreachable
    SystemIsDown { system_name: String },

    /// A monitor experienced errors while reading from a source
    DataReading { monitor: String, source: String },

    /// A GitHub releases page could not be accessed
    CannotAccessGitHubPage { page: String },

    /// A GitHub API call failed
    GitHubApiCall { reason: String },

    /// A component received data it does not understand
    ReceivedUnexpectedData { receiver: String },

    /// A source URL is malformed
    InvalidUrl { url: String },

    /// Alert configs for one chain carry different parent ids
    ParentIdsMismatch { reason: String },

    /// A required key is missing from a config file
    MissingKeyInConfig { key: String, config_file: String },

    /// A payload could not be decoded as JSON
    JsonDecode { message: String },

    /// A connection was attempted with blank credentials
    BlankCredential { credentials: Vec<String> },

    /// An enabled data source has an empty endpoint
    EnabledSourceEmpty { source: String, monitorable: String },

    /// A monitored node is unreachable
    NodeIsDown { node_name: String },
}

impl AlerterError {
    /// Stable integer code for this error kind
    pub fn code(&self) -> i64 {
        match self {
            AlerterError::ConnectionNotInitialised { .. } => 5000,
            AlerterError::MessageNotDelivered { .. } => 5001,
            AlerterError::NoMetricsGiven { .. } => 5002,
            AlerterError::MetricNotFound { .. } => 5003,
            AlerterError::SystemIsDown { .. } => 5004,
            AlerterError::DataReading { .. } => 5005,
            AlerterError::CannotAccessGitHubPage { .. } => 5006,
            AlerterError::GitHubApiCall { .. } => 5007,
            AlerterError::ReceivedUnexpectedData { .. } => 5008,
            AlerterError::InvalidUrl { .. } => 5009,
            AlerterError::ParentIdsMismatch { .. } => 5010,
            AlerterError::MissingKeyInConfig { .. } => 5011,
            AlerterError::JsonDecode { .. } => 5012,
            AlerterError::BlankCredential { .. } => 5013,
            AlerterError::EnabledSourceEmpty { .. } => 5014,
            AlerterError::NodeIsDown { .. } => 5015,
        }
    }
}

/// Error codes referenced by the alerter shells when matching incoming
/// error envelopes against classifier expectations.
pub mod codes {
    pub const METRIC_NOT_FOUND: i64 = 5003;
    pub const SYSTEM_IS_DOWN: i64 = 5004;
    pub const CANNOT_ACCESS_GITHUB_PAGE: i64 = 5006;
    pub const RECEIVED_UNEXPECTED_DATA: i64 = 5008;
    pub const INVALID_URL: i64 = 5009;
    pub const NODE_IS_DOWN: i64 = 5015;
}

impl fmt::Display for AlerterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlerterError::ConnectionNotInitialised { component } => {
                write!(f, "Did not initialise a connection with {}", component)
            }
            AlerterError::MessageNotDelivered { reason } => {
                write!(f, "Message could not be delivered. Error: {}", reason)
            }
            AlerterError::NoMetricsGiven { message } => write!(f, "{}", message),
            AlerterError::MetricNotFound { metric, endpoint } => {
                write!(f, "Could not find metric {} at endpoint {}", metric, endpoint)
            }
            AlerterError::SystemIsDown { system_name } => {
                write!(f, "System {} is unreachable", system_name)
            }
            AlerterError::DataReading { monitor, source } => {
                write!(
                    f,
                    "{} experienced errors when reading data from {}",
                    monitor, source
                )
            }
            AlerterError::CannotAccessGitHubPage { page } => {
                write!(f, "Cannot access GitHub page {}", page)
            }
            AlerterError::GitHubApiCall { reason } => {
                write!(f, "Error in API call: {}", reason)
            }
            AlerterError::ReceivedUnexpectedData { receiver } => {
                write!(f, "{} received unexpected data", receiver)
            }
            AlerterError::InvalidUrl { url } => write!(f, "Invalid URL '{}'", url),
            AlerterError::ParentIdsMismatch { reason } => {
                write!(f, "{} Error, alerts do not have the same parent_ids", reason)
            }
            AlerterError::MissingKeyInConfig { key, config_file } => {
                write!(f, "Expected {} field in the {} config", key, config_file)
            }
            AlerterError::JsonDecode { message } => write!(f, "{}", message),
            AlerterError::BlankCredential { credentials } => {
                write!(
                    f,
                    "Tried to initiate a connection with a blank or missing {}",
                    credentials.join(",")
                )
            }
            AlerterError::EnabledSourceEmpty { source, monitorable } => {
                write!(
                    f,
                    "Enabled source {} is empty for node {}",
                    source, monitorable
                )
            }
            AlerterError::NodeIsDown { node_name } => {
                write!(f, "Node {} is unreachable", node_name)
            }
        }
    }
}

impl std::error::Error for AlerterError {}

impl From<serde_json::Error> for AlerterError {
    fn from(err: serde_json::Error) -> Self {
        AlerterError::JsonDecode {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = AlerterError::MetricNotFound {
            metric: "process_start_time_seconds".to_string(),
            endpoint: "http://localhost:6688/metrics".to_string(),
        };
        assert_eq!(err.code(), 5003);

        let err = AlerterError::NodeIsDown {
            node_name: "ocr-node-1".to_string(),
        };
        assert_eq!(err.code(), 5015);

        let err = AlerterError::InvalidUrl {
            url: "not a url".to_string(),
        };
        assert_eq!(err.code(), 5009);
    }

    #[test]
    fn test_display_includes_context() {
        let err = AlerterError::SystemIsDown {
            system_name: "validator-host".to_string(),
        };
        assert_eq!(err.to_string(), "System validator-host is unreachable");

        let err = AlerterError::MissingKeyInConfig {
            key: "parent_id".to_string(),
            config_file: "alerts_config".to_string(),
        };
        assert!(err.to_string().contains("parent_id"));
        assert!(err.to_string().contains("alerts_config"));
    }

    #[test]
    fn test_json_decode_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: AlerterError = json_err.into();
        assert_eq!(err.code(), 5012);
    }

    #[test]
    fn test_error_serialization_round_trip() {
        let err = AlerterError::EnabledSourceEmpty {
            source: "prometheus".to_string(),
            monitorable: "node-1".to_string(),
        };
        let serialized = serde_json::to_string(&err).unwrap();
        let deserialized: AlerterError = serde_json::from_str(&serialized).unwrap();
        assert_eq!(err, deserialized);
    }
}
