//! cpuwatch-proc: Process-table queries and process-tree CPU aggregation
//!
//! This crate answers one question per poll: how much CPU is a process and
//! everything it spawned using right now?
//!
//! ## Features
//!
//! - **Process metrics**: [`ProcessMetrics`] reports a single process's CPU
//!   percentage and its direct children
//! - **Live backend**: [`SystemMetrics`] reads the OS process table
//! - **In-memory backend**: [`ProcessTable`] for snapshots and tests
//! - **Tree aggregation**: [`aggregate_usage`] sums CPU over a process and
//!   all its descendants
//!
//! ## Platform Support
//!
//! | Feature | Linux | macOS | Windows |
//! |---------|-------|-------|---------|
//! | Parent enumeration | /proc/[pid]/stat | proc_listpids + proc_pidinfo | Toolhelp32 |
//! | CPU time | /proc/[pid]/stat | proc_pidinfo (task info) | GetProcessTimes |
//!
//! CPU percentages are never divided by core count: a process saturating two
//! cores reports 200.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cpuwatch_proc::{aggregate_usage, CpuMode, ProcessMetrics, SystemMetrics};
//!
//! let mut metrics = SystemMetrics::new(CpuMode::Lifetime);
//! metrics.refresh().unwrap();
//!
//! let usage = aggregate_usage(&metrics, std::process::id());
//! println!("tree cpu: {:.1}%", usage.total_cpu_percent);
//! ```

use cpuwatch_core::{validate_pid, CpuwatchError, CpuwatchResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

mod tree;

pub use tree::{aggregate_usage, TreeProcess, TreeUsage};

// Platform-specific implementations
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(windows)]
mod windows;
#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
mod unsupported;

// Re-export the platform implementation
#[cfg(target_os = "linux")]
use linux as platform;
#[cfg(target_os = "macos")]
use macos as platform;
#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
use unsupported as platform;
#[cfg(windows)]
use windows as platform;

// ============================================================================
// Core Types
// ============================================================================

/// A `(pid, ppid)` pair from the OS process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParentLink {
    /// Process ID.
    pub pid: u32,
    /// Parent process ID (0 when the parent is unknown or the kernel).
    pub ppid: u32,
}

/// Cumulative CPU accounting for one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    /// User + system CPU time consumed since the process started.
    pub total_ns: u64,
    /// Process start time (Unix epoch milliseconds).
    ///
    /// Used to tell a process apart from a later one reusing its PID.
    pub start_time_unix_ms: u64,
}

/// How a CPU percentage is derived from cumulative CPU time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuMode {
    /// CPU time divided by process age (the `ps %cpu` figure).
    #[default]
    Lifetime,
    /// Rate between two consecutive observations of the same process.
    ///
    /// The first observation of a process falls back to the lifetime value.
    Interval,
}

/// CPU usage of a single process plus its direct children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessUsage {
    /// Process ID.
    pub pid: u32,

    /// CPU usage percentage (may exceed 100 on multi-core systems).
    pub cpu_percent: f64,

    /// PIDs whose parent is `pid`, ascending.
    pub children: Vec<u32>,
}

/// Source of per-process CPU usage.
///
/// Implementations report the host's own accounting, not normalized by core
/// count. A PID with no live process yields [`CpuwatchError::NotFound`].
pub trait ProcessMetrics {
    /// Usage and direct children of `pid`.
    fn usage(&self, pid: u32) -> CpuwatchResult<ProcessUsage>;

    /// Re-read whatever process-table state the source caches.
    ///
    /// Called once per poll, before a tree walk.
    fn refresh(&mut self) -> CpuwatchResult<()> {
        Ok(())
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Enumerate `(pid, ppid)` for every process visible to the current user.
///
/// Processes that exit or cannot be read during enumeration are skipped.
pub fn parent_links() -> CpuwatchResult<Vec<ParentLink>> {
    platform::parent_links_impl()
}

/// Read cumulative CPU time for a process.
///
/// # Errors
///
/// Returns `InvalidArgument` for PID 0 or PIDs above `i32::MAX`.
/// Returns `NotFound` if the process does not exist.
/// Returns `PermissionDenied` if the process cannot be read.
pub fn cpu_times(pid: u32) -> CpuwatchResult<CpuTimes> {
    validate_pid(pid)?;
    platform::cpu_times_impl(pid)
}

/// Lifetime-average CPU percentage for `times`, as of `now_unix_ms`.
///
/// Not clamped: multi-threaded processes legitimately exceed 100.
pub fn lifetime_cpu_percent(times: CpuTimes, now_unix_ms: u64) -> f64 {
    let elapsed_ms = now_unix_ms.saturating_sub(times.start_time_unix_ms);
    if elapsed_ms == 0 {
        return 0.0;
    }
    let cpu_ms = times.total_ns as f64 / 1_000_000.0;
    cpu_ms / elapsed_ms as f64 * 100.0
}

// ============================================================================
// Live Backend
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Observation {
    start_time_unix_ms: u64,
    total_ns: u64,
    at: Instant,
}

/// [`ProcessMetrics`] backed by the live OS process table.
///
/// [`refresh`](ProcessMetrics::refresh) enumerates parent links once; CPU
/// time is then read per process on demand, so a process that exits between
/// enumeration and measurement surfaces as `NotFound`.
#[derive(Debug)]
pub struct SystemMetrics {
    mode: CpuMode,
    children: HashMap<u32, Vec<u32>>,
    previous: Mutex<HashMap<u32, Observation>>,
}

impl SystemMetrics {
    /// Create a metrics source. Call `refresh()` before the first walk.
    pub fn new(mode: CpuMode) -> Self {
        Self {
            mode,
            children: HashMap::new(),
            previous: Mutex::new(HashMap::new()),
        }
    }

    /// The CPU measurement mode in use.
    pub fn mode(&self) -> CpuMode {
        self.mode
    }

    fn cpu_percent(&self, pid: u32, times: CpuTimes) -> f64 {
        let now_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let lifetime = lifetime_cpu_percent(times, now_unix_ms);

        if self.mode == CpuMode::Lifetime {
            return lifetime;
        }

        let now = Instant::now();
        let mut previous = self.previous.lock().unwrap_or_else(|e| e.into_inner());
        let percent = match previous.get(&pid) {
            // PID reuse guard: only compute a rate against the same process.
            Some(prev) if prev.start_time_unix_ms == times.start_time_unix_ms => {
                let dt_ns = now.duration_since(prev.at).as_nanos() as f64;
                if dt_ns > 0.0 {
                    let delta = times.total_ns.saturating_sub(prev.total_ns) as f64;
                    delta / dt_ns * 100.0
                } else {
                    lifetime
                }
            }
            _ => lifetime,
        };
        previous.insert(
            pid,
            Observation {
                start_time_unix_ms: times.start_time_unix_ms,
                total_ns: times.total_ns,
                at: now,
            },
        );
        percent
    }
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self::new(CpuMode::default())
    }
}

impl ProcessMetrics for SystemMetrics {
    fn usage(&self, pid: u32) -> CpuwatchResult<ProcessUsage> {
        let times = cpu_times(pid)?;
        Ok(ProcessUsage {
            pid,
            cpu_percent: self.cpu_percent(pid, times),
            children: self.children.get(&pid).cloned().unwrap_or_default(),
        })
    }

    fn refresh(&mut self) -> CpuwatchResult<()> {
        let links = parent_links()?;

        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for link in &links {
            if link.pid != link.ppid {
                children.entry(link.ppid).or_default().push(link.pid);
            }
        }
        for kids in children.values_mut() {
            kids.sort_unstable();
        }
        self.children = children;

        // Drop interval state for processes that are gone.
        let live: HashSet<u32> = links.iter().map(|l| l.pid).collect();
        self.previous
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|pid, _| live.contains(pid));

        Ok(())
    }
}

// ============================================================================
// In-memory Backend
// ============================================================================

/// A row in a [`ProcessTable`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TableEntry {
    /// Parent process ID.
    pub ppid: u32,
    /// CPU usage percentage.
    pub cpu_percent: f64,
}

/// In-memory process table mapping PID to `(ppid, cpu_percent)`.
///
/// Useful for replaying captured snapshots and for deterministic tests.
/// Parent links are taken at face value, so a table may contain cycles;
/// [`aggregate_usage`] terminates regardless.
#[derive(Debug, Clone, Default)]
pub struct ProcessTable {
    entries: BTreeMap<u32, TableEntry>,
    // ppid -> child PIDs, kept in step with `entries`.
    children: BTreeMap<u32, BTreeSet<u32>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a process.
    pub fn insert(&mut self, pid: u32, ppid: u32, cpu_percent: f64) -> &mut Self {
        if let Some(old) = self.entries.insert(pid, TableEntry { ppid, cpu_percent }) {
            self.unlink(pid, old.ppid);
        }
        if ppid != pid {
            self.children.entry(ppid).or_default().insert(pid);
        }
        self
    }

    /// Remove a process, as if it exited.
    pub fn remove(&mut self, pid: u32) -> Option<TableEntry> {
        let entry = self.entries.remove(&pid)?;
        self.unlink(pid, entry.ppid);
        Some(entry)
    }

    fn unlink(&mut self, pid: u32, ppid: u32) {
        if let Some(siblings) = self.children.get_mut(&ppid) {
            siblings.remove(&pid);
            if siblings.is_empty() {
                self.children.remove(&ppid);
            }
        }
    }

    pub fn get(&self, pid: u32) -> Option<&TableEntry> {
        self.entries.get(&pid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(u32, u32, f64)> for ProcessTable {
    fn from_iter<I: IntoIterator<Item = (u32, u32, f64)>>(iter: I) -> Self {
        let mut table = ProcessTable::new();
        for (pid, ppid, cpu_percent) in iter {
            table.insert(pid, ppid, cpu_percent);
        }
        table
    }
}

impl ProcessMetrics for ProcessTable {
    fn usage(&self, pid: u32) -> CpuwatchResult<ProcessUsage> {
        let entry = self
            .entries
            .get(&pid)
            .ok_or_else(|| CpuwatchError::not_found(pid))?;

        let children = self
            .children
            .get(&pid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        Ok(ProcessUsage {
            pid,
            cpu_percent: entry.cpu_percent,
            children,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Get current timestamp in ISO 8601 format.
fn current_timestamp() -> String {
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;

    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

// ============================================================================
// Tests
// ============================================================================
