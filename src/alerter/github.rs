// chainwatch - GitHub Alerter
// Classifies transformed repository data into release and page-access alerts

use super::factory::AlertingFactory;
use super::runner::AlertClassifier;
use super::state::AlertingState;
use super::{alerts, github_metrics, Alert, Severity};
use crate::bus::topology;
use crate::config::GithubAlertsConfig;
use crate::error::{codes, AlerterError};
use crate::{MetricPair, TransformedDataMessage, TransformedError, TransformedResult};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
struct Release {
    release_name: String,
    tag_name: String,
}

/// Repository data attached to a result envelope. `releases` holds the
/// releases the transformer saw for the first time this round.
#[derive(Debug, Clone, Deserialize)]
struct GithubData {
    no_of_releases: MetricPair<u64>,
    #[serde(default)]
    releases: Vec<Release>,
}

/// The github subsystem: an INFO alert per new release, error protocol for
/// unreachable release pages. Configured per chain; a message for an
/// unconfigured chain is skipped.
pub struct GithubAlerter {
    alerter_name: String,
    configs: HashMap<String, GithubAlertsConfig>,
    factory: AlertingFactory,
}

impl GithubAlerter {
    pub fn new(configs: HashMap<String, GithubAlertsConfig>) -> Self {
        Self {
            alerter_name: "GitHub Alerter".to_string(),
            configs,
            factory: AlertingFactory::new(),
        }
    }

    /// Alerter serving a single chain
    pub fn for_chain(config: GithubAlertsConfig) -> Self {
        let mut configs = HashMap::new();
        configs.insert(config.parent_id.clone(), config);
        Self::new(configs)
    }

    pub fn factory(&self) -> &AlertingFactory {
        &self.factory
    }

    fn chain_config(&self, parent_id: &str) -> Option<GithubAlertsConfig> {
        let config = self.configs.get(parent_id).cloned();
        if config.is_none() {
            debug!(parent_id, "no github alerts config for chain, skipping");
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
            AlertingState::for_github_repo(),
        );
        let data: GithubData = serde_json::from_value(result.data.clone())?;
        let timestamp = meta.last_monitored;
        let name = meta.origin_name.as_str();
        let parent_id = meta.parent_id.as_str();
        let origin_id = meta.origin_id.as_str();

        // A reachable page resolves an outstanding access error
        self.factory.classify_error_alert(
            codes::CANNOT_ACCESS_GITHUB_PAGE,
            |message, severity, ts| {
                alerts::github::cannot_access_page(message, severity, ts, parent_id, origin_id)
            },
            |message, severity, ts| {
                alerts::github::page_now_accessible(message, severity, ts, parent_id, origin_id)
            },
            out,
            parent_id,
            origin_id,
            github_metrics::CANNOT_ACCESS_PAGE,
            "",
            &format!("The releases page of {} is accessible again.", name),
            timestamp,
            None,
        );

        if config.new_release_enabled {
            let releases_changed = data.no_of_releases.current != data.no_of_releases.previous;
            for release in &data.releases {
                self.factory.classify_conditional_alert(
                    || releases_changed,
                    || {
                        alerts::github::new_release(
                            name,
                            &release.release_name,
                            &release.tag_name,
                            Severity::Info,
                            timestamp,
                            parent_id,
                            origin_id,
                        )
                    },
                    None::<fn() -> Alert>,
                    out,
                );
            }
        }
        Ok(())
    }

    fn process_error(
        &mut self,
        error: &TransformedError,
        out: &mut Vec<Alert>,
    ) -> Result<(), AlerterError> {
        let meta = &error.meta_data;
        if self.chain_config(&meta.parent_id).is_none() {
            return Ok(());
        }
        self.factory.create_alerting_state(
            &meta.parent_id,
            &meta.origin_id,
            AlertingState::for_github_repo(),
        );
        let name = meta.origin_name.as_str();
        let parent_id = meta.parent_id.as_str();
        let origin_id = meta.origin_id.as_str();

        self.factory.classify_error_alert(
            codes::CANNOT_ACCESS_GITHUB_PAGE,
            |message, severity, ts| {
                alerts::github::cannot_access_page(message, severity, ts, parent_id, origin_id)
            },
            |message, severity, ts| {
                alerts::github::page_now_accessible(message, severity, ts, parent_id, origin_id)
            },
            out,
            parent_id,
            origin_id,
            github_metrics::CANNOT_ACCESS_PAGE,
            &error.message,
            &format!("The releases page of {} is accessible again.", name),
            meta.last_monitored,
            Some(error.code),
        );
        Ok(())
    }
}

impl AlertClassifier for GithubAlerter {
    fn name(&self) -> &str {
        &self.alerter_name
    }

    fn input_queue(&self) -> &'static str {
        topology::GITHUB_ALERTER_INPUT_QUEUE
    }

    fn input_bindings(&self) -> Vec<(&'static str, &'static str)> {
        vec![(
            topology::TRANSFORMED_DATA_EXCHANGE,
            topology::GITHUB_TRANSFORMED_DATA_ROUTING_KEY,
        )]
    }

    fn alert_routing_key(&self) -> &'static str {
        topology::GITHUB_ALERT_ROUTING_KEY
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
