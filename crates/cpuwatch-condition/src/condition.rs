//! The CPU-usage condition and its lifecycle.
//!
//! A condition is built once (validate + prepare), then polled with
//! [`CpuUsageCondition::test`] on the host's schedule. Setup problems are
//! fatal; problems at poll time are logged and reported in the evaluation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cpuwatch_core::{CpuwatchError, CpuwatchResult};
use cpuwatch_proc::{aggregate_usage, CpuMode, ProcessMetrics, SystemMetrics};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::pid::{has_pid_source, resolve_pid, Watch};
use crate::policy::{ThresholdPolicy, TimesSpec};
use crate::timeline::Timeline;

/// Poll interval used when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

// ============================================================================
// Builder
// ============================================================================

/// Settings for a [`CpuUsageCondition`], checked by [`validate`](Self::validate).
pub struct ConditionBuilder {
    above: Option<f64>,
    times: TimesSpec,
    pid_file: Option<PathBuf>,
    interval: Duration,
    cpu_mode: CpuMode,
    watch: Option<Arc<dyn Watch>>,
}

impl Default for ConditionBuilder {
    fn default() -> Self {
        Self {
            above: None,
            times: TimesSpec::default(),
            pid_file: None,
            interval: DEFAULT_INTERVAL,
            cpu_mode: CpuMode::default(),
            watch: None,
        }
    }
}

impl ConditionBuilder {
    /// CPU percentage (not normalized by core count) a sample must exceed.
    pub fn above(mut self, percent: f64) -> Self {
        self.above = Some(percent);
        self
    }

    /// Fire when `occurrences` of the last `window` samples are over.
    pub fn times(mut self, occurrences: u32, window: u32) -> Self {
        self.times = TimesSpec::Window(occurrences, window);
        self
    }

    /// Fire when each of the last `k` samples is over.
    pub fn times_last(mut self, k: u32) -> Self {
        self.times = TimesSpec::Last(k);
        self
    }

    pub fn times_spec(mut self, times: TimesSpec) -> Self {
        self.times = times;
        self
    }

    /// PID file naming the root process. Takes precedence over the watch.
    pub fn pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_file = Some(path.into());
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Measurement mode for the live backend built by [`build`](Self::build).
    pub fn cpu_mode(mut self, mode: CpuMode) -> Self {
        self.cpu_mode = mode;
        self
    }

    pub fn watch(mut self, watch: Arc<dyn Watch>) -> Self {
        self.watch = Some(watch);
        self
    }

    /// Check the settings without building.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when `above` is missing or invalid, `times`
    /// is out of bounds, the interval is zero, or neither a PID file nor a
    /// watch supplying a PID is present.
    pub fn validate(&self) -> CpuwatchResult<()> {
        self.policy().map(|_| ())
    }

    fn policy(&self) -> CpuwatchResult<ThresholdPolicy> {
        if !has_pid_source(self.pid_file.as_deref(), self.watch.as_deref()) {
            return Err(CpuwatchError::configuration(
                "must specify a pid_file or attach a watch with a pid or pid_file",
            ));
        }
        let above = self
            .above
            .ok_or_else(|| CpuwatchError::configuration("must specify a minimum cpu (above)"))?;
        if self.interval.is_zero() {
            return Err(CpuwatchError::configuration("interval must be greater than zero"));
        }
        ThresholdPolicy::new(above, self.times.normalize()?)
    }

    /// Validate and prepare a condition sampling the live process table.
    pub fn build(self) -> CpuwatchResult<CpuUsageCondition<SystemMetrics>> {
        let metrics = SystemMetrics::new(self.cpu_mode);
        self.build_with(metrics)
    }

    /// Validate and prepare a condition sampling `metrics`.
    pub fn build_with<M: ProcessMetrics>(self, metrics: M) -> CpuwatchResult<CpuUsageCondition<M>> {
        let policy = self.policy()?;
        Ok(CpuUsageCondition {
            policy,
            pid_file: self.pid_file,
            interval: self.interval,
            watch: self.watch,
            metrics,
            timeline: window_for(&policy),
            info: None,
        })
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// Whether the threshold rule fired on this poll.
    pub triggered: bool,

    /// Human-readable diagnostic, e.g. `cpu out of bounds [*42%, 10%]`.
    pub message: String,

    /// Root PID sampled, absent when it could not be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Tree CPU percentage recorded this poll.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<f64>,

    /// Whether the root process was running.
    pub root_present: bool,

    /// Descendants included in the sample.
    pub descendants: usize,

    /// Samples in the window strictly over the threshold.
    pub count_above: usize,

    /// Window contents, oldest first.
    pub history: Vec<f64>,

    /// Absorbed poll-time error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Evaluation {
    /// `(triggered, message)` as a supervisor consumes it.
    pub fn into_parts(self) -> (bool, String) {
        (self.triggered, self.message)
    }
}

// ============================================================================
// Condition
// ============================================================================

/// Fires when a process tree's CPU usage exceeds a threshold often enough
/// within a sliding window of recent polls.
///
/// Each [`test`](Self::test) resolves the root PID, sums CPU over the root
/// and all its descendants, appends the sum to the window and applies the
/// [`ThresholdPolicy`]. An absent root records 0%.
pub struct CpuUsageCondition<M: ProcessMetrics = SystemMetrics> {
    policy: ThresholdPolicy,
    pid_file: Option<PathBuf>,
    interval: Duration,
    watch: Option<Arc<dyn Watch>>,
    metrics: M,
    timeline: Timeline,
    info: Option<String>,
}

impl CpuUsageCondition<SystemMetrics> {
    pub fn builder() -> ConditionBuilder {
        ConditionBuilder::default()
    }
}

impl<M: ProcessMetrics> CpuUsageCondition<M> {
    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    /// How often the host should call [`test`](Self::test).
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn pid_file(&self) -> Option<&Path> {
        self.pid_file.as_deref()
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn metrics(&self) -> &M {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut M {
        &mut self.metrics
    }

    /// Last diagnostic produced by [`test`](Self::test).
    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    /// Allocate a fresh, empty window sized to the policy.
    ///
    /// Safe to call repeatedly; each call discards prior history.
    pub fn prepare(&mut self) {
        self.timeline = window_for(&self.policy);
    }

    /// Discard sample history, e.g. after the supervisor restarts the process.
    pub fn reset(&mut self) {
        self.timeline.clear();
        self.info = None;
        info!(
            pid_file = ?self.pid_file,
            "cpu condition history reset"
        );
    }

    /// Take one sample and decide whether the condition fires.
    ///
    /// Never fails: an unusable PID file records no sample and reports
    /// `triggered == false`; a missing process records 0%.
    pub fn test(&mut self) -> Evaluation {
        let (pid, source) = match resolve_pid(self.pid_file.as_deref(), self.watch.as_deref()) {
            Ok(resolved) => resolved,
            Err(err) => return self.unavailable(err),
        };

        if let Err(err) = self.metrics.refresh() {
            warn!(pid, error = %err, "process table refresh failed");
        }

        let usage = aggregate_usage(&self.metrics, pid);
        if !usage.root_present {
            warn!(pid, "monitored process is not running, recording 0%");
        }
        for warning in &usage.warnings {
            debug!(pid, %warning, "tree walk");
        }

        let sample = usage.total_cpu_percent;
        self.timeline.push(sample);

        let count_above = self.timeline.count_above(self.policy.above);
        let triggered = self.policy.is_triggered(count_above);
        let history = render_history(&self.timeline, &self.policy);
        let message = if triggered {
            format!("cpu out of bounds {}", history)
        } else {
            format!("cpu within bounds {}", history)
        };

        debug!(
            pid,
            source = ?source,
            sample,
            count_above,
            triggered,
            "cpu condition evaluated"
        );
        if triggered {
            info!(pid, above = self.policy.above, %message, "cpu condition triggered");
        }

        self.info = Some(message.clone());
        Evaluation {
            triggered,
            message,
            pid: Some(pid),
            sample: Some(sample),
            root_present: usage.root_present,
            descendants: usage.descendant_count(),
            count_above,
            history: self.timeline.to_vec(),
            error: None,
        }
    }

    fn unavailable(&mut self, err: CpuwatchError) -> Evaluation {
        if err.is_recoverable() {
            warn!(error = %err, "cpu sample unavailable");
        } else {
            // No PID source left at all; every poll will fail until reconfigured.
            error!(error = %err, "cpu sample unavailable");
        }

        let message = format!(
            "cpu sample unavailable: {} {}",
            err,
            render_history(&self.timeline, &self.policy)
        );
        self.info = Some(message.clone());
        Evaluation {
            triggered: false,
            message,
            pid: None,
            sample: None,
            root_present: false,
            descendants: 0,
            count_above: self.timeline.count_above(self.policy.above),
            history: self.timeline.to_vec(),
            error: Some(err.to_string()),
        }
    }
}

fn window_for(policy: &ThresholdPolicy) -> Timeline {
    Timeline::new(policy.times.window() as usize)
}

// ============================================================================
// Formatting
// ============================================================================

/// Render the window as `[*42%, 10%, *55.5%]`, starring over-threshold samples.
pub fn render_history(timeline: &Timeline, policy: &ThresholdPolicy) -> String {
    let entries: Vec<String> = timeline
        .iter()
        .map(|sample| {
            let pct = format_percent(sample);
            if policy.exceeds(sample) {
                format!("*{}%", pct)
            } else {
                format!("{}%", pct)
            }
        })
        .collect();
    format!("[{}]", entries.join(", "))
}

/// Shortest exact rendering, so a starred sample never prints at or below
/// the threshold.
fn format_percent(value: f64) -> String {
    value.to_string()
}
