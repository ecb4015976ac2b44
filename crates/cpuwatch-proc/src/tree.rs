//! Process-tree CPU aggregation.
//!
//! Walks a process and all of its descendants breadth-first, summing CPU
//! usage. The walk keeps a visited set, so a metrics source that reports a
//! cyclic or duplicated parent/child relationship still terminates, and every
//! PID contributes at most once. Worst-case cost is one `usage()` call per
//! live process.

use crate::{current_timestamp, ProcessMetrics};
use cpuwatch_core::schema::TREE_USAGE_V1;
use cpuwatch_core::{get_platform, CpuwatchError};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

/// One process counted in a [`TreeUsage`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeProcess {
    /// Process ID.
    pub pid: u32,

    /// PID of the process through which this one was reached (None for the root).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<u32>,

    /// Depth below the root (0 = root, 1 = direct children, ...).
    pub depth: u32,

    /// CPU usage percentage.
    pub cpu_percent: f64,
}

/// Aggregate CPU usage of a process tree.
#[derive(Debug, Clone, Serialize)]
pub struct TreeUsage {
    /// Schema identifier for version detection.
    pub schema_id: &'static str,

    /// Timestamp of the walk (ISO 8601).
    pub timestamp: String,

    /// Current platform (e.g., "linux", "macos", "windows").
    pub platform: &'static str,

    /// Root PID the walk started from.
    pub root_pid: u32,

    /// False when the root had already exited (or could not be read).
    ///
    /// The total is 0 in that case; this is a soft failure, not an error.
    pub root_present: bool,

    /// Sum of `cpu_percent` over every counted process.
    pub total_cpu_percent: f64,

    /// Counted processes in BFS order, root first.
    pub processes: Vec<TreeProcess>,

    /// Descendants that vanished or could not be read mid-walk.
    pub skipped: Vec<u32>,

    /// Warnings about degraded visibility.
    pub warnings: Vec<String>,
}

impl TreeUsage {
    /// Number of descendants counted (root excluded).
    pub fn descendant_count(&self) -> usize {
        self.processes.iter().filter(|p| p.depth > 0).count()
    }
}

/// Sum CPU usage of `root_pid` and all of its descendants.
///
/// Never fails: a missing root yields a zero total with `root_present = false`,
/// and descendants that disappear between enumeration and measurement are
/// listed in `skipped` and contribute nothing.
pub fn aggregate_usage<M: ProcessMetrics + ?Sized>(metrics: &M, root_pid: u32) -> TreeUsage {
    let mut result = TreeUsage {
        schema_id: TREE_USAGE_V1,
        timestamp: current_timestamp(),
        platform: get_platform(),
        root_pid,
        root_present: false,
        total_cpu_percent: 0.0,
        processes: Vec::new(),
        skipped: Vec::new(),
        warnings: Vec::new(),
    };

    let root = match metrics.usage(root_pid) {
        Ok(root) => root,
        Err(err) => {
            result.warnings.push(root_warning(root_pid, &err));
            return result;
        }
    };

    result.root_present = true;
    result.total_cpu_percent = root.cpu_percent;
    result.processes.push(TreeProcess {
        pid: root_pid,
        parent: None,
        depth: 0,
        cpu_percent: root.cpu_percent,
    });

    let mut visited: HashSet<u32> = HashSet::from([root_pid]);
    let mut queue: VecDeque<(u32, u32, u32)> = root
        .children
        .iter()
        .map(|&child| (child, root_pid, 1))
        .collect();

    let mut unreadable = 0usize;
    while let Some((pid, parent, depth)) = queue.pop_front() {
        if !visited.insert(pid) {
            continue;
        }

        match metrics.usage(pid) {
            Ok(usage) => {
                result.total_cpu_percent += usage.cpu_percent;
                result.processes.push(TreeProcess {
                    pid,
                    parent: Some(parent),
                    depth,
                    cpu_percent: usage.cpu_percent,
                });
                for child in usage.children {
                    if !visited.contains(&child) {
                        queue.push_back((child, pid, depth + 1));
                    }
                }
            }
            Err(err) => {
                if !matches!(err, CpuwatchError::NotFound { .. }) {
                    unreadable += 1;
                }
                result.skipped.push(pid);
            }
        }
    }

    if unreadable > 0 {
        result.warnings.push(format!(
            "Skipped {} descendant(s) due to read errors",
            unreadable
        ));
    }

    result
}

fn root_warning(root_pid: u32, err: &CpuwatchError) -> String {
    match err {
        CpuwatchError::NotFound { .. } => format!("Root process {} is not running", root_pid),
        other => format!("Root process {} could not be read: {}", root_pid, other),
    }
}
