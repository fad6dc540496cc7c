// chainwatch - Library
// Blockchain infrastructure monitoring and alerting pipeline core

pub mod alerter;
pub mod bus;
pub mod config;
pub mod error;
pub mod health;
pub mod manager;
pub mod timing;

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the epoch from the wall clock. Input timestamps are
/// authoritative; this is only consulted when a message carries none.
pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs_f64())
        .unwrap_or(0.0)
}

/// A metric reading paired with the value the transformer persisted from
/// the previous round
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetricPair<T> {
    pub current: T,
    pub previous: T,
}

/// Who a transformed-data message is about
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetaData {
    pub origin_name: String,
    pub origin_id: String,
    pub parent_id: String,

    /// When the monitor took the reading, seconds since the epoch
    pub last_monitored: f64,
}

/// Successful monitoring round: domain-specific metric pairs under `data`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransformedResult {
    pub meta_data: MetaData,
    pub data: serde_json::Value,
}

/// Failed monitoring round carrying one of the stable error codes
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransformedError {
    pub meta_data: MetaData,
    pub message: String,
    pub code: i64,

    /// Error-specific extras, e.g. the downtime pair for node/system-down
    #[serde(default)]
    pub data: serde_json::Value,
}

/// The two disjoint envelope shapes on transformed-data queues
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TransformedDataMessage {
    Result(TransformedResult),
    Error(TransformedError),
}

impl TransformedDataMessage {
    pub fn meta_data(&self) -> &MetaData {
        match self {
            TransformedDataMessage::Result(result) => &result.meta_data,
            TransformedDataMessage::Error(error) => &error.meta_data,
        }
    }
}
