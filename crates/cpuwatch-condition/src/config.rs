//! JSON configuration for a CPU-usage condition.
//!
//! ```json
//! {
//!   "above": 80,
//!   "times": [3, 5],
//!   "pid_file": "/var/run/worker.pid",
//!   "interval": "10s",
//!   "cpu_mode": "interval"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cpuwatch_core::schema::CONDITION_CONFIG_V1;
use cpuwatch_core::{CpuwatchError, CpuwatchResult};
use cpuwatch_proc::CpuMode;
use serde::{Deserialize, Serialize};

use crate::condition::ConditionBuilder;
use crate::policy::TimesSpec;

/// Condition settings as loaded from a file or assembled from CLI flags.
///
/// Every field is optional so partial configs can be layered with
/// [`merge`](Self::merge); required settings are enforced when building.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionConfig {
    /// Must equal [`CONDITION_CONFIG_V1`] when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,

    /// CPU percentage threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub above: Option<f64>,

    /// `k` or `[occurrences, window]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<TimesSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_file: Option<PathBuf>,

    /// Poll interval, e.g. `"500ms"`, `"5s"`, `"2m"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_mode: Option<CpuMode>,
}

impl ConditionConfig {
    /// Parse a JSON document.
    pub fn from_json(json: &str) -> CpuwatchResult<Self> {
        let config: ConditionConfig = serde_json::from_str(json)
            .map_err(|e| CpuwatchError::configuration(format!("invalid condition config: {}", e)))?;
        config.check_schema()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn from_path(path: &Path) -> CpuwatchResult<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            CpuwatchError::configuration(format!(
                "failed to read config '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    /// Schema identifier accepted in the `schema_id` field.
    pub fn schema_id() -> &'static str {
        CONDITION_CONFIG_V1
    }

    fn check_schema(&self) -> CpuwatchResult<()> {
        match self.schema_id.as_deref() {
            None => Ok(()),
            Some(id) if id == Self::schema_id() => Ok(()),
            Some(id) => Err(CpuwatchError::configuration(format!(
                "unsupported schema_id '{}', expected '{}'",
                id,
                Self::schema_id()
            ))),
        }
    }

    /// Layer `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merge(self, overrides: ConditionConfig) -> ConditionConfig {
        ConditionConfig {
            schema_id: overrides.schema_id.or(self.schema_id),
            above: overrides.above.or(self.above),
            times: overrides.times.or(self.times),
            pid_file: overrides.pid_file.or(self.pid_file),
            interval: overrides.interval.or(self.interval),
            cpu_mode: overrides.cpu_mode.or(self.cpu_mode),
        }
    }

    /// Turn the config into a builder. Bounds are checked when it builds.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `interval` is not a valid duration.
    pub fn into_builder(self) -> CpuwatchResult<ConditionBuilder> {
        let mut builder = ConditionBuilder::default();
        if let Some(above) = self.above {
            builder = builder.above(above);
        }
        if let Some(times) = self.times {
            builder = builder.times_spec(times);
        }
        if let Some(path) = self.pid_file {
            builder = builder.pid_file(path);
        }
        if let Some(interval) = self.interval.as_deref() {
            let interval = parse_duration(interval)
                .map_err(|e| CpuwatchError::configuration(format!("interval: {}", e)))?;
            builder = builder.interval(interval);
        }
        if let Some(mode) = self.cpu_mode {
            builder = builder.cpu_mode(mode);
        }
        Ok(builder)
    }
}

/// Parse a duration: a plain number of seconds, or a number with an
/// `ms`, `s`, `m` or `h` suffix.
pub fn parse_duration(s: &str) -> CpuwatchResult<Duration> {
    let s = s.trim();

    // Milliseconds per unit.
    let (num_str, ms_per_unit) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1_000.0)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000.0)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000.0)
    } else {
        (s, 1_000.0)
    };

    let num: f64 = num_str.trim().parse().map_err(|_| {
        CpuwatchError::invalid_argument(format!(
            "invalid duration '{}': expected number or number with suffix (ms, s, m, h)",
            s
        ))
    })?;

    if num < 0.0 {
        return Err(CpuwatchError::invalid_argument(
            "duration cannot be negative",
        ));
    }

    Duration::try_from_secs_f64(num * ms_per_unit / 1_000.0).map_err(|_| {
        CpuwatchError::invalid_argument(format!("invalid duration '{}': out of range", s))
    })
}
