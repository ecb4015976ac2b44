//! Threshold policy: how many recent samples must exceed a limit.

use cpuwatch_core::{CpuwatchError, CpuwatchResult};
use serde::{Deserialize, Serialize};

/// "`occurrences` of the last `window` samples".
///
/// Always satisfies `1 <= occurrences <= window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Times {
    occurrences: u32,
    window: u32,
}

impl Times {
    /// # Errors
    ///
    /// Returns `Configuration` unless `1 <= occurrences <= window`.
    pub fn new(occurrences: u32, window: u32) -> CpuwatchResult<Self> {
        if occurrences == 0 {
            return Err(CpuwatchError::configuration(
                "times: occurrences must be at least 1",
            ));
        }
        if occurrences > window {
            return Err(CpuwatchError::configuration(format!(
                "times: occurrences ({}) cannot exceed window ({})",
                occurrences, window
            )));
        }
        Ok(Self {
            occurrences,
            window,
        })
    }

    /// `k` of the last `k` samples.
    pub fn last(k: u32) -> CpuwatchResult<Self> {
        Self::new(k, k)
    }

    pub fn occurrences(&self) -> u32 {
        self.occurrences
    }

    pub fn window(&self) -> u32 {
        self.window
    }
}

impl Default for Times {
    fn default() -> Self {
        Self {
            occurrences: 1,
            window: 1,
        }
    }
}

/// The `times` setting as written by a user: a scalar `k` or a pair.
///
/// Deserializes from `3` or `[2, 5]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimesSpec {
    /// Shorthand for `k` of the last `k`.
    Last(u32),
    /// `(occurrences, window)`.
    Window(u32, u32),
}

impl TimesSpec {
    /// Expand shorthand and check bounds.
    pub fn normalize(self) -> CpuwatchResult<Times> {
        match self {
            TimesSpec::Last(k) => Times::last(k),
            TimesSpec::Window(occurrences, window) => Times::new(occurrences, window),
        }
    }
}

impl Default for TimesSpec {
    fn default() -> Self {
        TimesSpec::Window(1, 1)
    }
}

impl From<u32> for TimesSpec {
    fn from(k: u32) -> Self {
        TimesSpec::Last(k)
    }
}

impl From<(u32, u32)> for TimesSpec {
    fn from((occurrences, window): (u32, u32)) -> Self {
        TimesSpec::Window(occurrences, window)
    }
}

impl From<Times> for TimesSpec {
    fn from(times: Times) -> Self {
        TimesSpec::Window(times.occurrences, times.window)
    }
}

/// Normalized trigger rule: at least `times.occurrences()` of the last
/// `times.window()` samples strictly greater than `above`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdPolicy {
    /// CPU percentage a sample must exceed to count.
    pub above: f64,
    pub times: Times,
}

impl ThresholdPolicy {
    /// # Errors
    ///
    /// Returns `Configuration` if `above` is negative or not finite.
    pub fn new(above: f64, times: Times) -> CpuwatchResult<Self> {
        if !above.is_finite() || above < 0.0 {
            return Err(CpuwatchError::configuration(format!(
                "above must be a non-negative number, got {}",
                above
            )));
        }
        Ok(Self { above, times })
    }

    /// Whether a single sample counts against the limit.
    pub fn exceeds(&self, sample: f64) -> bool {
        sample > self.above
    }

    /// Whether `count_above` over-threshold samples fire the condition.
    pub fn is_triggered(&self, count_above: usize) -> bool {
        count_above >= self.times.occurrences as usize
    }
}
