//! cpuwatch-condition: Sliding-window CPU threshold condition
//!
//! A [`CpuUsageCondition`] samples the CPU usage of a process tree once per
//! poll and fires when enough recent samples exceed a threshold.
//!
//! ## Lifecycle
//!
//! 1. Configure with [`CpuUsageCondition::builder`] or [`ConditionConfig`]
//! 2. `build()` validates (fatal [`CpuwatchError::Configuration`] on failure)
//!    and prepares an empty window
//! 3. The host calls [`CpuUsageCondition::test`] every
//!    [`interval`](CpuUsageCondition::interval)
//! 4. [`CpuUsageCondition::reset`] discards history after a restart
//!
//! ## Trigger Rule
//!
//! With `above = 25` and `times = (2, 3)`, the window `[10, 30, 40]` fires
//! (two samples over 25) while `[10, 20, 24]` does not. Comparison is strict.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cpuwatch_condition::{CpuUsageCondition, StaticWatch};
//!
//! let mut condition = CpuUsageCondition::builder()
//!     .above(80.0)
//!     .times(3, 5)
//!     .watch(Arc::new(StaticWatch::with_pid(std::process::id())))
//!     .build()
//!     .unwrap();
//!
//! let (triggered, message) = condition.test().into_parts();
//! println!("{triggered}: {message}");
//! ```
//!
//! [`CpuwatchError::Configuration`]: cpuwatch_core::CpuwatchError::Configuration

mod condition;
mod config;
mod pid;
mod policy;
mod timeline;

pub use condition::{
    render_history, ConditionBuilder, CpuUsageCondition, Evaluation, DEFAULT_INTERVAL,
};
pub use config::{parse_duration, ConditionConfig};
pub use pid::{has_pid_source, read_pid_file, resolve_pid, PidSource, StaticWatch, Watch};
pub use policy::{ThresholdPolicy, Times, TimesSpec};
pub use timeline::Timeline;
