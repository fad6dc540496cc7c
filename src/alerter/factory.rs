// chainwatch - Alerting Factory
// Stateful per-(chain, monitorable) classifiers with raise, repeat and
// resolve semantics

use super::state::AlertingState;
use super::{Alert, Severity};
use crate::config::ThresholdConfig;
use std::collections::HashMap;
use tracing::{debug, error, info};

/// Turns a stream of timestamped metric observations into a stream of
/// severity-graded alerts.
///
/// One classifier method per alert shape. Each mutates the monitorable's
/// alerting record and appends zero or more alerts to the caller's output
/// list; when both a resolve and a new raise are produced in the same call,
/// the resolve is appended first. Classifiers never block and never raise
/// for protocol-local issues: a disabled config or an input that cannot
/// form a valid alert silently does nothing. A missing alerting record is a
/// caller bug and is logged as an error.
///
/// Alert construction is passed in as closures so the fixed metadata
/// (origin name, parent id, origin id) stays with the caller while the
/// factory supplies the varying pieces (value, severity, timestamp,
/// duration).
#[derive(Debug, Default)]
pub struct AlertingFactory {
    alerting_state: HashMap<(String, String), AlertingState>,
}

impl AlertingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the alerting record for a monitorable. Idempotent: an
    /// existing record is left untouched so replays of the same config
    /// message cannot wipe timers.
    pub fn create_alerting_state(
        &mut self,
        parent_id: &str,
        monitorable_id: &str,
        state: AlertingState,
    ) {
        let key = (parent_id.to_string(), monitorable_id.to_string());
        if !self.alerting_state.contains_key(&key) {
            info!(parent_id, monitorable_id, "creating alerting state");
            self.alerting_state.insert(key, state);
        }
    }

    /// Destroy the alerting record for a monitorable
    pub fn remove_alerting_state(&mut self, parent_id: &str, monitorable_id: &str) {
        let key = (parent_id.to_string(), monitorable_id.to_string());
        if self.alerting_state.remove(&key).is_some() {
            info!(parent_id, monitorable_id, "removed alerting state");
        }
    }

    /// Destroy every alerting record belonging to a chain
    pub fn remove_chain_alerting_state(&mut self, parent_id: &str) {
        let before = self.alerting_state.len();
        self.alerting_state.retain(|(pid, _), _| pid != parent_id);
        let removed = before - self.alerting_state.len();
        if removed > 0 {
            info!(parent_id, removed, "removed chain alerting state");
        }
    }

    pub fn alerting_state(&self, parent_id: &str, monitorable_id: &str) -> Option<&AlertingState> {
        self.alerting_state
            .get(&(parent_id.to_string(), monitorable_id.to_string()))
    }

    pub fn alerting_state_mut(
        &mut self,
        parent_id: &str,
        monitorable_id: &str,
    ) -> Option<&mut AlertingState> {
        self.alerting_state
            .get_mut(&(parent_id.to_string(), monitorable_id.to_string()))
    }

    fn record_mut(&mut self, parent_id: &str, monitorable_id: &str) -> Option<&mut AlertingState> {
        let state = self
            .alerting_state
            .get_mut(&(parent_id.to_string(), monitorable_id.to_string()));
        if state.is_none() {
            error!(
                parent_id,
                monitorable_id, "no alerting state exists for monitorable"
            );
        }
        state
    }

    /// Threshold alert, higher is worse. A value at or above a threshold
    /// raises that severity; dropping strictly below it resolves. The
    /// CRITICAL raise absorbs a standing WARNING; resolving CRITICAL while
    /// the warning band still holds downgrades by re-raising WARNING after
    /// the INFO resolve.
    #[allow(clippy::too_many_arguments)]
    pub fn classify_thresholded_alert<R, S>(
        &mut self,
        current: f64,
        config: &ThresholdConfig,
        raise_alert: R,
        resolve_alert: S,
        out: &mut Vec<Alert>,
        parent_id: &str,
        origin_id: &str,
        metric_code: &str,
        timestamp: f64,
    ) where
        R: Fn(f64, Severity, f64, Severity) -> Alert,
        S: Fn(f64, Severity, f64, Severity) -> Alert,
    {
        if config.is_muted() {
            return;
        }
        let state = match self.record_mut(parent_id, origin_id) {
            Some(state) => state,
            None => return,
        };
        let warning_threshold = config.warning_threshold;
        let critical_threshold = config.critical_threshold;
        let warning_sent = state.warning_sent(metric_code);
        let critical_sent = state.critical_sent(metric_code);
        debug!(metric_code, current, "classifying thresholded observation");

        if critical_sent && current < critical_threshold {
            out.push(resolve_alert(
                current,
                Severity::Info,
                timestamp,
                Severity::Critical,
            ));
            state.set_critical_sent(metric_code, false);
            if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                limiter.reset();
            }
            if config.warning_enabled && current >= warning_threshold {
                out.push(raise_alert(
                    current,
                    Severity::Warning,
                    timestamp,
                    Severity::Warning,
                ));
                state.set_warning_sent(metric_code, true);
            }
        } else if config.critical_enabled && current >= critical_threshold {
            let can_repeat = state
                .critical_repeat_timer
                .get(metric_code)
                .map(|limiter| limiter.can_do_task(timestamp))
                .unwrap_or(false);
            if !critical_sent {
                out.push(raise_alert(
                    current,
                    Severity::Critical,
                    timestamp,
                    Severity::Critical,
                ));
                state.set_critical_sent(metric_code, true);
                if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                    limiter.did_task(timestamp);
                }
            } else if config.critical_repeat_enabled && can_repeat {
                out.push(raise_alert(
                    current,
                    Severity::Critical,
                    timestamp,
                    Severity::Critical,
                ));
                if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                    limiter.did_task(timestamp);
                }
            }
            if state.warning_sent(metric_code) {
                state.set_warning_sent(metric_code, false);
            }
        } else if config.warning_enabled
            && !warning_sent
            && !critical_sent
            && current >= warning_threshold
        {
            out.push(raise_alert(
                current,
                Severity::Warning,
                timestamp,
                Severity::Warning,
            ));
            state.set_warning_sent(metric_code, true);
        } else if warning_sent && current < warning_threshold {
            out.push(resolve_alert(
                current,
                Severity::Info,
                timestamp,
                Severity::Warning,
            ));
            state.set_warning_sent(metric_code, false);
        }
    }

    /// Threshold alert, lower is worse. Mirror of the thresholded
    /// classifier with all comparisons inverted; used for metrics like
    /// account balances where the config satisfies
    /// warning_threshold >= critical_threshold.
    #[allow(clippy::too_many_arguments)]
    pub fn classify_thresholded_alert_reverse<R, S>(
        &mut self,
        current: f64,
        config: &ThresholdConfig,
        raise_alert: R,
        resolve_alert: S,
        out: &mut Vec<Alert>,
        parent_id: &str,
        origin_id: &str,
        metric_code: &str,
        timestamp: f64,
    ) where
        R: Fn(f64, Severity, f64, Severity) -> Alert,
        S: Fn(f64, Severity, f64, Severity) -> Alert,
    {
        if config.is_muted() {
            return;
        }
        let state = match self.record_mut(parent_id, origin_id) {
            Some(state) => state,
            None => return,
        };
        let warning_threshold = config.warning_threshold;
        let critical_threshold = config.critical_threshold;
        let warning_sent = state.warning_sent(metric_code);
        let critical_sent = state.critical_sent(metric_code);

        if critical_sent && current > critical_threshold {
            out.push(resolve_alert(
                current,
                Severity::Info,
                timestamp,
                Severity::Critical,
            ));
            state.set_critical_sent(metric_code, false);
            if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                limiter.reset();
            }
            if config.warning_enabled && current <= warning_threshold {
                out.push(raise_alert(
                    current,
                    Severity::Warning,
                    timestamp,
                    Severity::Warning,
                ));
                state.set_warning_sent(metric_code, true);
            }
        } else if config.critical_enabled && current <= critical_threshold {
            let can_repeat = state
                .critical_repeat_timer
                .get(metric_code)
                .map(|limiter| limiter.can_do_task(timestamp))
                .unwrap_or(false);
            if !critical_sent {
                out.push(raise_alert(
                    current,
                    Severity::Critical,
                    timestamp,
                    Severity::Critical,
                ));
                state.set_critical_sent(metric_code, true);
                if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                    limiter.did_task(timestamp);
                }
            } else if config.critical_repeat_enabled && can_repeat {
                out.push(raise_alert(
                    current,
                    Severity::Critical,
                    timestamp,
                    Severity::Critical,
                ));
                if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                    limiter.did_task(timestamp);
                }
            }
            if state.warning_sent(metric_code) {
                state.set_warning_sent(metric_code, false);
            }
        } else if config.warning_enabled
            && !warning_sent
            && !critical_sent
            && current <= warning_threshold
        {
            out.push(raise_alert(
                current,
                Severity::Warning,
                timestamp,
                Severity::Warning,
            ));
            state.set_warning_sent(metric_code, true);
        } else if warning_sent && current > warning_threshold {
            out.push(resolve_alert(
                current,
                Severity::Info,
                timestamp,
                Severity::Warning,
            ));
            state.set_warning_sent(metric_code, false);
        }
    }

    /// Time-window threshold alert. The raise only fires once the value has
    /// stayed at or above the threshold for the configured window; the
    /// raise closure receives how long the condition has held.
    #[allow(clippy::too_many_arguments)]
    pub fn classify_thresholded_time_window_alert<R, S>(
        &mut self,
        current: f64,
        config: &ThresholdConfig,
        raise_alert: R,
        resolve_alert: S,
        out: &mut Vec<Alert>,
        parent_id: &str,
        origin_id: &str,
        metric_code: &str,
        timestamp: f64,
    ) where
        R: Fn(f64, Severity, f64, f64, Severity) -> Alert,
        S: Fn(f64, Severity, f64, Severity) -> Alert,
    {
        if config.is_muted() {
            return;
        }
        let state = match self.record_mut(parent_id, origin_id) {
            Some(state) => state,
            None => return,
        };
        let warning_threshold = config.warning_threshold;
        let critical_threshold = config.critical_threshold;

        if current >= warning_threshold {
            if let Some(timer) = state.warning_window_timer.get_mut(metric_code) {
                timer.start(timestamp);
            }
        }
        if current >= critical_threshold {
            if let Some(timer) = state.critical_window_timer.get_mut(metric_code) {
                timer.start(timestamp);
            }
        }

        let warning_sent = state.warning_sent(metric_code);
        let critical_sent = state.critical_sent(metric_code);
        let (warning_start, warning_elapsed) = state
            .warning_window_timer
            .get(metric_code)
            .map(|timer| (timer.start_time(), timer.did_elapse(timestamp)))
            .unwrap_or((timestamp, false));
        let (critical_start, critical_elapsed) = state
            .critical_window_timer
            .get(metric_code)
            .map(|timer| (timer.start_time(), timer.did_elapse(timestamp)))
            .unwrap_or((timestamp, false));

        if critical_sent && current < critical_threshold {
            out.push(resolve_alert(
                current,
                Severity::Info,
                timestamp,
                Severity::Critical,
            ));
            state.set_critical_sent(metric_code, false);
            if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                limiter.reset();
            }
        } else if config.critical_enabled && critical_elapsed {
            let can_repeat = state
                .critical_repeat_timer
                .get(metric_code)
                .map(|limiter| limiter.can_do_task(timestamp))
                .unwrap_or(false);
            if !critical_sent {
                out.push(raise_alert(
                    current,
                    Severity::Critical,
                    timestamp,
                    timestamp - critical_start,
                    Severity::Critical,
                ));
                state.set_critical_sent(metric_code, true);
                if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                    limiter.did_task(timestamp);
                }
                if state.warning_sent(metric_code) {
                    state.set_warning_sent(metric_code, false);
                }
            } else if config.critical_repeat_enabled && can_repeat {
                out.push(raise_alert(
                    current,
                    Severity::Critical,
                    timestamp,
                    timestamp - critical_start,
                    Severity::Critical,
                ));
                if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                    limiter.did_task(timestamp);
                }
            }
        }

        let warning_sent = state.warning_sent(metric_code);
        let critical_sent = state.critical_sent(metric_code);
        if warning_sent && current < warning_threshold {
            out.push(resolve_alert(
                current,
                Severity::Info,
                timestamp,
                Severity::Warning,
            ));
            state.set_warning_sent(metric_code, false);
        } else if config.warning_enabled && !warning_sent && !critical_sent && warning_elapsed {
            out.push(raise_alert(
                current,
                Severity::Warning,
                timestamp,
                timestamp - warning_start,
                Severity::Warning,
            ));
            state.set_warning_sent(metric_code, true);
        }

        // Back under a threshold means the window restarts from scratch
        if current < warning_threshold {
            if let Some(timer) = state.warning_window_timer.get_mut(metric_code) {
                timer.reset();
            }
        }
        if current < critical_threshold {
            if let Some(timer) = state.critical_window_timer.get_mut(metric_code) {
                timer.reset();
            }
        }
    }

    /// Occurrences-in-period alert over cumulative counters. The delta
    /// between previous and current totals is stamped into both period
    /// trackers; severities react to how many occurrences remain inside
    /// their windows, so quiet periods resolve by decay alone.
    #[allow(clippy::too_many_arguments)]
    pub fn classify_thresholded_in_time_period_alert<R, S>(
        &mut self,
        current: f64,
        previous: f64,
        config: &ThresholdConfig,
        raise_alert: R,
        resolve_alert: S,
        out: &mut Vec<Alert>,
        parent_id: &str,
        origin_id: &str,
        metric_code: &str,
        timestamp: f64,
    ) where
        R: Fn(f64, Severity, f64, f64, Severity) -> Alert,
        S: Fn(f64, Severity, f64, f64, Severity) -> Alert,
    {
        if config.is_muted() {
            return;
        }
        let state = match self.record_mut(parent_id, origin_id) {
            Some(state) => state,
            None => return,
        };
        let warning_period = config.warning_time_window;
        let critical_period = config.critical_time_window;

        if current > previous {
            let new_occurrences = (current - previous) as u64;
            for _ in 0..new_occurrences {
                if let Some(tracker) = state
                    .warning_occurrences_in_period_tracker
                    .get_mut(metric_code)
                {
                    tracker.add_occurrence(timestamp);
                }
                if let Some(tracker) = state
                    .critical_occurrences_in_period_tracker
                    .get_mut(metric_code)
                {
                    tracker.add_occurrence(timestamp);
                }
            }
        }

        let occurrences_warning = state
            .warning_occurrences_in_period_tracker
            .get_mut(metric_code)
            .map(|tracker| tracker.n_occurrences(timestamp))
            .unwrap_or(0) as f64;
        let occurrences_critical = state
            .critical_occurrences_in_period_tracker
            .get_mut(metric_code)
            .map(|tracker| tracker.n_occurrences(timestamp))
            .unwrap_or(0) as f64;

        let warning_sent = state.warning_sent(metric_code);
        let critical_sent = state.critical_sent(metric_code);

        if critical_sent && occurrences_critical < config.critical_threshold {
            out.push(resolve_alert(
                occurrences_critical,
                Severity::Info,
                timestamp,
                critical_period,
                Severity::Critical,
            ));
            state.set_critical_sent(metric_code, false);
            if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                limiter.reset();
            }
        } else if config.critical_enabled && occurrences_critical >= config.critical_threshold {
            let can_repeat = state
                .critical_repeat_timer
                .get(metric_code)
                .map(|limiter| limiter.can_do_task(timestamp))
                .unwrap_or(false);
            if !critical_sent {
                out.push(raise_alert(
                    occurrences_critical,
                    Severity::Critical,
                    timestamp,
                    critical_period,
                    Severity::Critical,
                ));
                state.set_critical_sent(metric_code, true);
                if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                    limiter.did_task(timestamp);
                }
            } else if config.critical_repeat_enabled && can_repeat {
                out.push(raise_alert(
                    occurrences_critical,
                    Severity::Critical,
                    timestamp,
                    critical_period,
                    Severity::Critical,
                ));
                if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                    limiter.did_task(timestamp);
                }
            }
            if state.warning_sent(metric_code) {
                state.set_warning_sent(metric_code, false);
            }
        }

        let warning_sent = state.warning_sent(metric_code);
        let critical_sent = state.critical_sent(metric_code);
        if warning_sent && occurrences_warning < config.warning_threshold {
            out.push(resolve_alert(
                occurrences_warning,
                Severity::Info,
                timestamp,
                warning_period,
                Severity::Warning,
            ));
            state.set_warning_sent(metric_code, false);
        } else if config.warning_enabled
            && !warning_sent
            && !critical_sent
            && occurrences_warning >= config.warning_threshold
        {
            out.push(raise_alert(
                occurrences_warning,
                Severity::Warning,
                timestamp,
                warning_period,
                Severity::Warning,
            ));
            state.set_warning_sent(metric_code, true);
        }
    }

    /// No-change-in-value alert. Thresholds are durations in seconds; the
    /// per-severity trackers record when the value last moved. Any change
    /// resolves an outstanding alert with an INFO "value updated".
    #[allow(clippy::too_many_arguments)]
    pub fn classify_no_change_in_alert<V, R, S>(
        &mut self,
        current: V,
        previous: V,
        config: &ThresholdConfig,
        raise_alert: R,
        resolve_alert: S,
        out: &mut Vec<Alert>,
        parent_id: &str,
        origin_id: &str,
        metric_code: &str,
        timestamp: f64,
    ) where
        V: PartialEq + Copy,
        R: Fn(f64, Severity, f64, V) -> Alert,
        S: Fn(Severity, f64, V) -> Alert,
    {
        if config.is_muted() {
            return;
        }
        let state = match self.record_mut(parent_id, origin_id) {
            Some(state) => state,
            None => return,
        };

        if current != previous {
            if state.warning_sent(metric_code) || state.critical_sent(metric_code) {
                out.push(resolve_alert(Severity::Info, timestamp, current));
                state.set_warning_sent(metric_code, false);
                state.set_critical_sent(metric_code, false);
                if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                    limiter.reset();
                }
            }
            if let Some(timer) = state.warning_window_timer.get_mut(metric_code) {
                timer.reset();
            }
            if let Some(timer) = state.critical_window_timer.get_mut(metric_code) {
                timer.reset();
            }
            return;
        }

        if let Some(timer) = state.warning_window_timer.get_mut(metric_code) {
            timer.start(timestamp);
        }
        if let Some(timer) = state.critical_window_timer.get_mut(metric_code) {
            timer.start(timestamp);
        }

        let warning_sent = state.warning_sent(metric_code);
        let critical_sent = state.critical_sent(metric_code);
        let (warning_start, warning_elapsed) = state
            .warning_window_timer
            .get(metric_code)
            .map(|timer| (timer.start_time(), timer.did_elapse(timestamp)))
            .unwrap_or((timestamp, false));
        let (critical_start, critical_elapsed) = state
            .critical_window_timer
            .get(metric_code)
            .map(|timer| (timer.start_time(), timer.did_elapse(timestamp)))
            .unwrap_or((timestamp, false));

        if config.critical_enabled && critical_elapsed {
            let can_repeat = state
                .critical_repeat_timer
                .get(metric_code)
                .map(|limiter| limiter.can_do_task(timestamp))
                .unwrap_or(false);
            if !critical_sent {
                out.push(raise_alert(
                    timestamp - critical_start,
                    Severity::Critical,
                    timestamp,
                    current,
                ));
                state.set_critical_sent(metric_code, true);
                if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                    limiter.did_task(timestamp);
                }
                if state.warning_sent(metric_code) {
                    state.set_warning_sent(metric_code, false);
                }
            } else if config.critical_repeat_enabled && can_repeat {
                out.push(raise_alert(
                    timestamp - critical_start,
                    Severity::Critical,
                    timestamp,
                    current,
                ));
                if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                    limiter.did_task(timestamp);
                }
            }
        } else if config.warning_enabled && !warning_sent && !critical_sent && warning_elapsed {
            out.push(raise_alert(
                timestamp - warning_start,
                Severity::Warning,
                timestamp,
                current,
            ));
            state.set_warning_sent(metric_code, true);
        }
    }

    /// Downtime alert. `went_down_at == None` means up; a back-up INFO is
    /// emitted only when a downtime alert is outstanding. While down, both
    /// window timers run from `went_down_at`, the first raise of each
    /// severity is a went-down alert and critical repeats are still-down
    /// alerts carrying the downtime duration.
    #[allow(clippy::too_many_arguments)]
    pub fn classify_downtime_alert<D, SD, B>(
        &mut self,
        went_down_at: Option<f64>,
        config: &ThresholdConfig,
        went_down_alert: D,
        still_down_alert: SD,
        back_up_alert: B,
        out: &mut Vec<Alert>,
        parent_id: &str,
        origin_id: &str,
        metric_code: &str,
        timestamp: f64,
    ) where
        D: Fn(Severity, f64) -> Alert,
        SD: Fn(f64, Severity, f64) -> Alert,
        B: Fn(Severity, f64) -> Alert,
    {
        let state = match self.record_mut(parent_id, origin_id) {
            Some(state) => state,
            None => return,
        };

        let went_down = match went_down_at {
            Some(went_down) => went_down,
            None => {
                if state.warning_sent(metric_code) || state.critical_sent(metric_code) {
                    out.push(back_up_alert(Severity::Info, timestamp));
                    state.set_warning_sent(metric_code, false);
                    state.set_critical_sent(metric_code, false);
                    if let Some(timer) = state.warning_window_timer.get_mut(metric_code) {
                        timer.reset();
                    }
                    if let Some(timer) = state.critical_window_timer.get_mut(metric_code) {
                        timer.reset();
                    }
                    if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                        limiter.reset();
                    }
                }
                return;
            }
        };

        if config.is_muted() {
            return;
        }

        if let Some(timer) = state.warning_window_timer.get_mut(metric_code) {
            timer.start(went_down);
        }
        if let Some(timer) = state.critical_window_timer.get_mut(metric_code) {
            timer.start(went_down);
        }

        let warning_sent = state.warning_sent(metric_code);
        let critical_sent = state.critical_sent(metric_code);
        let warning_elapsed = state
            .warning_window_timer
            .get(metric_code)
            .map(|timer| timer.did_elapse(timestamp))
            .unwrap_or(false);
        let critical_elapsed = state
            .critical_window_timer
            .get(metric_code)
            .map(|timer| timer.did_elapse(timestamp))
            .unwrap_or(false);

        if config.critical_enabled && critical_elapsed {
            let can_repeat = state
                .critical_repeat_timer
                .get(metric_code)
                .map(|limiter| limiter.can_do_task(timestamp))
                .unwrap_or(false);
            if !critical_sent {
                out.push(went_down_alert(Severity::Critical, timestamp));
                state.set_critical_sent(metric_code, true);
                if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                    limiter.did_task(timestamp);
                }
                if state.warning_sent(metric_code) {
                    state.set_warning_sent(metric_code, false);
                }
            } else if config.critical_repeat_enabled && can_repeat {
                out.push(still_down_alert(
                    timestamp - went_down,
                    Severity::Critical,
                    timestamp,
                ));
                if let Some(limiter) = state.critical_repeat_timer.get_mut(metric_code) {
                    limiter.did_task(timestamp);
                }
            }
        } else if config.warning_enabled && !warning_sent && !critical_sent && warning_elapsed {
            out.push(went_down_alert(Severity::Warning, timestamp));
            state.set_warning_sent(metric_code, true);
        }
    }

    /// Error-code alert. Raises ERROR once when the observed code matches
    /// the expected one; any other observation (no error, or a different
    /// error) while the flag is set resolves it, leaving the new code to
    /// its own classifier.
    #[allow(clippy::too_many_arguments)]
    pub fn classify_error_alert<E, R>(
        &mut self,
        error_code_constant: i64,
        error_alert: E,
        resolved_alert: R,
        out: &mut Vec<Alert>,
        parent_id: &str,
        origin_id: &str,
        metric_code: &str,
        error_message: &str,
        resolved_message: &str,
        timestamp: f64,
        received_error_code: Option<i64>,
    ) where
        E: Fn(&str, Severity, f64) -> Alert,
        R: Fn(&str, Severity, f64) -> Alert,
    {
        let state = match self.record_mut(parent_id, origin_id) {
            Some(state) => state,
            None => return,
        };
        let error_sent = state.error_sent(metric_code);

        if received_error_code == Some(error_code_constant) && !error_sent {
            out.push(error_alert(error_message, Severity::Error, timestamp));
            state.set_error_sent(metric_code, true);
        } else if error_sent && received_error_code != Some(error_code_constant) {
            out.push(resolved_alert(resolved_message, Severity::Info, timestamp));
            state.set_error_sent(metric_code, false);
        }
    }

    /// One-shot conditional alert: no state is stored, every true condition
    /// emits the true-alert and a false condition optionally emits the
    /// false-alert.
    pub fn classify_conditional_alert<C, T, F>(
        &self,
        condition: C,
        true_alert: T,
        false_alert: Option<F>,
        out: &mut Vec<Alert>,
    ) where
        C: FnOnce() -> bool,
        T: FnOnce() -> Alert,
        F: FnOnce() -> Alert,
    {
        if condition() {
            out.push(true_alert());
        } else if let Some(false_alert) = false_alert {
            out.push(false_alert());
        }
    }

    /// Solvable conditional without repetition: the true-alert fires once
    /// and is then suppressed until a false condition emits the solved
    /// alert and re-arms it.
    #[allow(clippy::too_many_arguments)]
    pub fn classify_solvable_conditional_alert_no_repetition<C, T, F>(
        &mut self,
        parent_id: &str,
        origin_id: &str,
        metric_code: &str,
        condition: C,
        true_alert: T,
        solved_alert: F,
        out: &mut Vec<Alert>,
    ) where
        C: FnOnce() -> bool,
        T: FnOnce() -> Alert,
        F: FnOnce() -> Alert,
    {
        let state = match self.record_mut(parent_id, origin_id) {
            Some(state) => state,
            None => return,
        };
        let already_sent = state.any_severity_sent(metric_code);

        if condition() {
            if !already_sent {
                out.push(true_alert());
                state.set_any_severity_sent(metric_code, true);
            }
        } else if already_sent {
            out.push(solved_alert());
            state.set_any_severity_sent(metric_code, false);
        }
    }

    /// Source-downtime alert: a WARNING-only raise keyed on the warning
    /// sent-flag. The back-up alert is emitted only if the raise actually
    /// happened, so a source that was never reported down is never
    /// "resolved".
    #[allow(clippy::too_many_arguments)]
    pub fn classify_source_downtime_alert<C, T, B>(
        &mut self,
        parent_id: &str,
        origin_id: &str,
        metric_code: &str,
        condition: C,
        down_alert: T,
        back_up_alert: Option<B>,
        out: &mut Vec<Alert>,
    ) where
        C: FnOnce() -> bool,
        T: FnOnce() -> Alert,
        B: FnOnce() -> Alert,
    {
        let state = match self.record_mut(parent_id, origin_id) {
            Some(state) => state,
            None => return,
        };
        let warning_sent = state.warning_sent(metric_code);

        if condition() {
            if !warning_sent {
                out.push(down_alert());
                state.set_warning_sent(metric_code, true);
            }
        } else if let Some(back_up_alert) = back_up_alert {
            if warning_sent {
                out.push(back_up_alert());
                state.set_warning_sent(metric_code, false);
            }
        }
    }
}
