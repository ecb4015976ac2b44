//! Linux implementation using /proc filesystem
//!
//! Reads process information from:
//! - `/proc/[pid]/stat` - parent PID, CPU ticks, start time
//! - `/proc/stat` - system boot time

use crate::{CpuTimes, ParentLink};
use cpuwatch_core::{CpuwatchError, CpuwatchResult};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

// ============================================================================
// Implementation
// ============================================================================

pub fn parent_links_impl() -> CpuwatchResult<Vec<ParentLink>> {
    let proc_dir = fs::read_dir("/proc")
        .map_err(|e| CpuwatchError::internal(format!("Failed to read /proc: {}", e)))?;

    let mut links = Vec::new();
    for entry in proc_dir.flatten() {
        let name = entry.file_name();
        let pid: u32 = match name.to_string_lossy().parse() {
            Ok(p) => p,
            // Skip non-numeric entries
            Err(_) => continue,
        };

        // Skip PID 0 (kernel scheduler)
        if pid == 0 {
            continue;
        }

        // Processes can exit between readdir and read; skip them.
        if let Ok(stat) = read_stat(pid) {
            links.push(ParentLink {
                pid,
                ppid: stat.ppid,
            });
        }
    }

    Ok(links)
}

pub fn cpu_times_impl(pid: u32) -> CpuwatchResult<CpuTimes> {
    let stat = read_stat(pid)?;
    let ticks = clock_ticks();

    let total_ticks = stat.utime.saturating_add(stat.stime);
    let total_ns = (total_ticks as u128 * 1_000_000_000 / ticks as u128) as u64;

    let start_time_unix_ms = boot_time()
        .saturating_mul(1000)
        .saturating_add(stat.starttime.saturating_mul(1000) / ticks);

    Ok(CpuTimes {
        total_ns,
        start_time_unix_ms,
    })
}

fn read_stat(pid: u32) -> CpuwatchResult<StatInfo> {
    let path = Path::new("/proc").join(pid.to_string()).join("stat");
    let content = fs::read_to_string(&path).map_err(|e| map_io_error(e, pid))?;
    parse_stat(&content)
}

/// Parsed /proc/[pid]/stat fields.
#[derive(Debug)]
struct StatInfo {
    ppid: u32,
    utime: u64,
    stime: u64,
    starttime: u64,
}

/// Parse /proc/[pid]/stat content.
///
/// Format: pid (comm) state ppid pgrp session tty_nr tpgid flags minflt cminflt
///         majflt cmajflt utime stime cutime cstime priority nice num_threads
///         itrealvalue starttime vsize rss ...
fn parse_stat(content: &str) -> CpuwatchResult<StatInfo> {
    // comm can contain spaces and parens; the last ')' closes it.
    let end_paren = content
        .rfind(')')
        .ok_or_else(|| CpuwatchError::internal("Invalid stat format: no ')'"))?;

    let rest = content.get(end_paren + 1..).unwrap_or_default();
    let fields: Vec<&str> = rest.split_whitespace().collect();

    if fields.len() < 20 {
        return Err(CpuwatchError::internal(
            "Invalid stat format: too few fields",
        ));
    }

    Ok(StatInfo {
        ppid: fields[1].parse().unwrap_or(0),
        utime: fields[11].parse().unwrap_or(0),
        stime: fields[12].parse().unwrap_or(0),
        starttime: fields[19].parse().unwrap_or(0),
    })
}

/// Map IO error to CpuwatchError.
fn map_io_error(e: io::Error, pid: u32) -> CpuwatchError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => CpuwatchError::permission_denied(pid, "read stat"),
        // ESRCH shows up when the process exits mid-read.
        _ => CpuwatchError::not_found(pid),
    }
}

/// Get system boot time (seconds since epoch) from /proc/stat.
fn boot_time() -> u64 {
    static BOOT_TIME: OnceLock<u64> = OnceLock::new();
    *BOOT_TIME.get_or_init(|| {
        if let Ok(content) = fs::read_to_string("/proc/stat") {
            for line in content.lines() {
                if let Some(rest) = line.strip_prefix("btime ") {
                    return rest.trim().parse().unwrap_or(0);
                }
            }
        }
        0
    })
}

/// Get clock ticks per second (usually 100 on Linux).
///
/// Returns 100 as fallback if sysconf fails (returns -1).
fn clock_ticks() -> u64 {
    let result = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if result <= 0 {
        100 // Standard fallback for Linux
    } else {
        result as u64
    }
}
