// chainwatch - Timing Primitives
// Reusable building blocks for window, repeat, and occurrence tracking

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Records when a condition first became true and reports whether a
/// configured duration has elapsed since.
///
/// Timestamps are seconds since the epoch, supplied by the caller. Starting
/// an already-started tracker is a no-op, so replaying the same observation
/// stream leaves the start time untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedTaskTracker {
    /// Duration that must pass before the task is considered due
    duration: Duration,

    /// Timestamp at which the timer was started
    start_time: f64,

    /// Whether the timer is currently running
    timer_started: bool,
}

impl TimedTaskTracker {
    /// Create a new tracker for the given duration
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            start_time: 0.0,
            timer_started: false,
        }
    }

    /// Start the timer at `now`. No-op if already started.
    pub fn start(&mut self, now: f64) {
        if !self.timer_started {
            self.timer_started = true;
            self.start_time = now;
        }
    }

    /// True iff the timer is started and the configured duration has elapsed.
    /// The comparison is inclusive: elapsed == duration counts as due.
    pub fn did_elapse(&self, now: f64) -> bool {
        self.timer_started && now - self.start_time >= self.duration.as_secs_f64()
    }

    /// Clear the started flag
    pub fn reset(&mut self) {
        self.timer_started = false;
        self.start_time = 0.0;
    }

    pub fn timer_started(&self) -> bool {
        self.timer_started
    }

    /// Timestamp the timer was started at. Meaningless unless started.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Gate that allows an action at most once per configured interval.
///
/// The disabled variant never admits the action, which is how protocols
/// switch off critical repeats without special-casing every call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedTaskLimiter {
    /// Minimum interval between task executions
    interval: Duration,

    /// Timestamp of the last execution, if any
    last_time_did_task: Option<f64>,

    /// Disabled limiters refuse every request
    enabled: bool,
}

impl TimedTaskLimiter {
    /// Create a new limiter with the given minimum interval
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_time_did_task: None,
            enabled: true,
        }
    }

    /// Create a limiter that never admits the task
    pub fn disabled() -> Self {
        Self {
            interval: Duration::ZERO,
            last_time_did_task: None,
            enabled: false,
        }
    }

    /// True iff the task was never done or the interval has elapsed since
    /// the last execution. Always false for disabled limiters.
    pub fn can_do_task(&self, now: f64) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_time_did_task {
            Some(last) => now - last >= self.interval.as_secs_f64(),
            None => true,
        }
    }

    /// Stamp the task as done at `now`
    pub fn did_task(&mut self, now: f64) {
        self.last_time_did_task = Some(now);
    }

    /// Forget the last execution
    pub fn reset(&mut self) {
        self.last_time_did_task = None;
    }
}

/// Sliding-window counter over timestamps. Entries older than the period
/// are pruned on every read, so a window with no fresh occurrences decays
/// to zero by itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccurrencesInPeriodTracker {
    /// Window length
    period: Duration,

    /// Timestamps of recorded occurrences, oldest first
    occurrences: VecDeque<f64>,
}

impl OccurrencesInPeriodTracker {
    /// Create a new tracker over the given period
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            occurrences: VecDeque::new(),
        }
    }

    /// Record an occurrence at `now`
    pub fn add_occurrence(&mut self, now: f64) {
        self.occurrences.push_back(now);
    }

    /// Number of occurrences with timestamp >= now - period. Older entries
    /// are dropped as a side effect.
    pub fn n_occurrences(&mut self, now: f64) -> usize {
        let cutoff = now - self.period.as_secs_f64();
        while let Some(&front) = self.occurrences.front() {
            if front < cutoff {
                self.occurrences.pop_front();
            } else {
                break;
            }
        }
        self.occurrences.len()
    }

    /// Drop all recorded occurrences
    pub fn reset(&mut self) {
        self.occurrences.clear();
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
