//! Windows implementation using Toolhelp32 and Win32 APIs
//!
//! Uses the following APIs:
//! - `CreateToolhelp32Snapshot` - enumerate all processes with parent PIDs
//! - `Process32FirstW/NextW` - iterate process list
//! - `OpenProcess` / `GetProcessTimes` - CPU timing and creation time

use crate::{CpuTimes, ParentLink};
use cpuwatch_core::{CpuwatchError, CpuwatchResult};
use std::mem;
use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_ACCESS_DENIED, FILETIME, INVALID_HANDLE_VALUE, STILL_ACTIVE,
};
use windows_sys::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W, TH32CS_SNAPPROCESS,
};
use windows_sys::Win32::System::Threading::{
    GetExitCodeProcess, GetProcessTimes, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
};

/// FILETIME is 100-nanosecond intervals since Jan 1, 1601.
const WINDOWS_EPOCH_OFFSET: u64 = 116444736000000000;

// ============================================================================
// Implementation
// ============================================================================

pub fn parent_links_impl() -> CpuwatchResult<Vec<ParentLink>> {
    let mut links = Vec::new();

    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0);
        if snapshot == INVALID_HANDLE_VALUE {
            return Err(CpuwatchError::system(
                "CreateToolhelp32Snapshot failed",
                GetLastError() as i32,
            ));
        }

        let mut entry: PROCESSENTRY32W = mem::zeroed();
        entry.dwSize = mem::size_of::<PROCESSENTRY32W>() as u32;

        if Process32FirstW(snapshot, &mut entry) != 0 {
            loop {
                // PID 0 is the System Idle Process.
                if entry.th32ProcessID != 0 {
                    links.push(ParentLink {
                        pid: entry.th32ProcessID,
                        ppid: entry.th32ParentProcessID,
                    });
                }

                if Process32NextW(snapshot, &mut entry) == 0 {
                    break;
                }
            }
        }

        CloseHandle(snapshot);
    }

    Ok(links)
}

pub fn cpu_times_impl(pid: u32) -> CpuwatchResult<CpuTimes> {
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle == 0 {
            let err = GetLastError();
            if err == ERROR_ACCESS_DENIED {
                return Err(CpuwatchError::permission_denied(pid, "read cpu times"));
            }
            // ERROR_INVALID_PARAMETER: no such process.
            return Err(CpuwatchError::not_found(pid));
        }

        // A handle can outlive the process; exited processes are absent.
        let mut exit_code: u32 = 0;
        let alive = GetExitCodeProcess(handle, &mut exit_code) != 0
            && exit_code == STILL_ACTIVE as u32;

        let mut creation_time: FILETIME = mem::zeroed();
        let mut exit_time: FILETIME = mem::zeroed();
        let mut kernel_time: FILETIME = mem::zeroed();
        let mut user_time: FILETIME = mem::zeroed();

        let times_ok = GetProcessTimes(
            handle,
            &mut creation_time,
            &mut exit_time,
            &mut kernel_time,
            &mut user_time,
        ) != 0;

        CloseHandle(handle);

        if !alive {
            return Err(CpuwatchError::not_found(pid));
        }
        if !times_ok {
            return Err(CpuwatchError::system(
                "GetProcessTimes failed",
                GetLastError() as i32,
            ));
        }

        let creation_unix_100ns =
            filetime_to_u64(&creation_time).saturating_sub(WINDOWS_EPOCH_OFFSET);
        let cpu_100ns =
            filetime_to_u64(&kernel_time).saturating_add(filetime_to_u64(&user_time));

        Ok(CpuTimes {
            total_ns: cpu_100ns.saturating_mul(100),
            start_time_unix_ms: creation_unix_100ns / 10_000,
        })
    }
}

fn filetime_to_u64(ft: &FILETIME) -> u64 {
    (ft.dwHighDateTime as u64) << 32 | ft.dwLowDateTime as u64
}
