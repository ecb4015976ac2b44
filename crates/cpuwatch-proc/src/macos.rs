//! macOS implementation using libproc
//!
//! Uses the following APIs:
//! - `proc_listpids()` - enumerate all PIDs
//! - `proc_pidinfo()` with `PROC_PIDTBSDINFO` - parent PID and start time
//! - `proc_pidinfo()` with `PROC_PIDTASKINFO` - cumulative CPU time
//! - `mach_timebase_info()` - convert Mach time units to nanoseconds

use crate::{CpuTimes, ParentLink};
use cpuwatch_core::{CpuwatchError, CpuwatchResult};
use libc::{c_int, c_void, pid_t, uid_t};
use std::mem;
use std::sync::OnceLock;

// ============================================================================
// libproc FFI Bindings
// ============================================================================

// Constants from <libproc.h>
const PROC_ALL_PIDS: u32 = 1;
const PROC_PIDTBSDINFO: c_int = 3;
const PROC_PIDTASKINFO: c_int = 4;
const MAXCOMLEN: usize = 16;

/// BSD info structure returned by proc_pidinfo with PROC_PIDTBSDINFO
#[repr(C)]
#[derive(Debug, Default)]
struct ProcBsdInfo {
    pbi_flags: u32,
    pbi_status: u32,
    pbi_xstatus: u32,
    pbi_pid: u32,
    pbi_ppid: u32,
    pbi_uid: uid_t,
    pbi_gid: u32,
    pbi_ruid: uid_t,
    pbi_rgid: u32,
    pbi_svuid: uid_t,
    pbi_svgid: u32,
    _rfu_1: u32,
    pbi_comm: [u8; MAXCOMLEN],
    pbi_name: [u8; 2 * MAXCOMLEN],
    pbi_nfiles: u32,
    pbi_pgid: u32,
    pbi_pjobc: u32,
    e_tdev: u32,
    e_tpgid: u32,
    pbi_nice: i32,
    pbi_start_tvsec: u64,
    pbi_start_tvusec: u64,
}

/// Task info structure returned by proc_pidinfo with PROC_PIDTASKINFO
#[repr(C)]
#[derive(Debug, Default)]
struct ProcTaskInfo {
    pti_virtual_size: u64,
    pti_resident_size: u64,
    pti_total_user: u64,
    pti_total_system: u64,
    pti_threads_user: u64,
    pti_threads_system: u64,
    pti_policy: i32,
    pti_faults: i32,
    pti_pageins: i32,
    pti_cow_faults: i32,
    pti_messages_sent: i32,
    pti_messages_received: i32,
    pti_syscalls_mach: i32,
    pti_syscalls_unix: i32,
    pti_csw: i32,
    pti_threadnum: i32,
    pti_numrunning: i32,
    pti_priority: i32,
}

extern "C" {
    fn proc_listpids(type_: u32, typeinfo: u32, buffer: *mut c_void, buffersize: c_int) -> c_int;

    fn proc_pidinfo(
        pid: c_int,
        flavor: c_int,
        arg: u64,
        buffer: *mut c_void,
        buffersize: c_int,
    ) -> c_int;

    fn mach_timebase_info(info: *mut MachTimebaseInfo) -> c_int;
}

/// Mach timebase info for converting Mach time units to nanoseconds.
/// On Apple Silicon, numer/denom is typically 125/3 (~41.67x).
/// On Intel Macs, it's often 1/1.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct MachTimebaseInfo {
    numer: u32,
    denom: u32,
}

/// Cached Mach timebase conversion factor (numer/denom).
static MACH_TIMEBASE_FACTOR: OnceLock<f64> = OnceLock::new();

fn mach_to_ns_factor() -> f64 {
    *MACH_TIMEBASE_FACTOR.get_or_init(|| {
        let mut info = MachTimebaseInfo { numer: 0, denom: 0 };
        let ret = unsafe { mach_timebase_info(&mut info) };
        if ret != 0 || info.denom == 0 {
            1.0
        } else {
            info.numer as f64 / info.denom as f64
        }
    })
}

#[inline]
fn mach_time_to_ns(mach_time: u64) -> u64 {
    (mach_time as f64 * mach_to_ns_factor()) as u64
}

// ============================================================================
// Implementation
// ============================================================================

pub fn parent_links_impl() -> CpuwatchResult<Vec<ParentLink>> {
    let pids = list_all_pids()?;
    let mut links = Vec::with_capacity(pids.len());

    for pid in pids {
        if pid <= 0 {
            continue;
        }
        // Silently skip processes we can't read or that already exited
        if let Ok(info) = get_bsd_info(pid as u32) {
            links.push(ParentLink {
                pid: pid as u32,
                ppid: info.pbi_ppid,
            });
        }
    }

    Ok(links)
}

pub fn cpu_times_impl(pid: u32) -> CpuwatchResult<CpuTimes> {
    let bsd_info = get_bsd_info(pid)?;
    let task_info = get_task_info(pid)?;

    let total_mach_time = task_info
        .pti_total_user
        .saturating_add(task_info.pti_total_system);
    let start_time_unix_ms = bsd_info
        .pbi_start_tvsec
        .saturating_mul(1000)
        .saturating_add(bsd_info.pbi_start_tvusec / 1000);

    Ok(CpuTimes {
        total_ns: mach_time_to_ns(total_mach_time),
        start_time_unix_ms,
    })
}

fn list_all_pids() -> CpuwatchResult<Vec<pid_t>> {
    // First call to get required buffer size
    let buffer_size = unsafe { proc_listpids(PROC_ALL_PIDS, 0, std::ptr::null_mut(), 0) };

    if buffer_size <= 0 {
        return Err(CpuwatchError::internal("proc_listpids failed to get size"));
    }

    let count = buffer_size as usize / mem::size_of::<pid_t>();
    let mut pids: Vec<pid_t> = vec![0; count];

    let actual = unsafe {
        proc_listpids(
            PROC_ALL_PIDS,
            0,
            pids.as_mut_ptr() as *mut c_void,
            buffer_size,
        )
    };

    if actual <= 0 {
        return Err(CpuwatchError::internal("proc_listpids failed"));
    }

    let actual_count = actual as usize / mem::size_of::<pid_t>();
    pids.truncate(actual_count);

    Ok(pids)
}

/// Translate errno after a failed proc_pidinfo call.
fn pidinfo_error(pid: u32, operation: &str) -> CpuwatchError {
    let errno = unsafe { *libc::__error() };
    if errno == libc::EPERM || errno == libc::EACCES {
        CpuwatchError::permission_denied(pid, operation)
    } else {
        // ESRCH and friends: the process is gone.
        CpuwatchError::not_found(pid)
    }
}

fn get_bsd_info(pid: u32) -> CpuwatchResult<ProcBsdInfo> {
    let mut info: ProcBsdInfo = unsafe { mem::zeroed() };
    let size = mem::size_of::<ProcBsdInfo>() as c_int;

    let result = unsafe {
        proc_pidinfo(
            pid as c_int,
            PROC_PIDTBSDINFO,
            0,
            &mut info as *mut _ as *mut c_void,
            size,
        )
    };

    if result <= 0 {
        return Err(pidinfo_error(pid, "read process info"));
    }

    Ok(info)
}

fn get_task_info(pid: u32) -> CpuwatchResult<ProcTaskInfo> {
    let mut info: ProcTaskInfo = unsafe { mem::zeroed() };
    let size = mem::size_of::<ProcTaskInfo>() as c_int;

    let result = unsafe {
        proc_pidinfo(
            pid as c_int,
            PROC_PIDTASKINFO,
            0,
            &mut info as *mut _ as *mut c_void,
            size,
        )
    };

    if result <= 0 {
        return Err(pidinfo_error(pid, "read cpu times"));
    }

    Ok(info)
}
