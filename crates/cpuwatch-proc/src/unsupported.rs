//! Fallback for platforms without a process-table backend.

use crate::{CpuTimes, ParentLink};
use cpuwatch_core::{get_platform, CpuwatchError, CpuwatchResult};

pub fn parent_links_impl() -> CpuwatchResult<Vec<ParentLink>> {
    Err(CpuwatchError::not_supported("process table", get_platform()))
}

pub fn cpu_times_impl(_pid: u32) -> CpuwatchResult<CpuTimes> {
    Err(CpuwatchError::not_supported("cpu times", get_platform()))
}
