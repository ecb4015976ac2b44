//! cpuwatch-core: Core types, errors, and platform abstractions
//!
//! This crate provides the foundational types used across all cpuwatch crates:
//! - The canonical error type [`CpuwatchError`]
//! - Schema ID constants for JSON contracts
//! - Re-exports from rsfulmen for exit code constants
//! - Platform detection and PID validation
//!
//! ## Ecosystem Integration
//!
//! Exit code constants are re-exported from rsfulmen for Fulmen ecosystem
//! alignment. Access via [`exit_codes`].

use std::env::consts::OS;

pub mod error;
pub mod schema;

// Re-export canonical error type at crate root
pub use error::{CpuwatchError, CpuwatchResult};

pub use rsfulmen::foundry::exit_codes;

/// Largest PID accepted anywhere in cpuwatch.
///
/// PIDs are cast to `pid_t` on Unix; values above `i32::MAX` would turn
/// negative and address process groups instead of processes.
pub const MAX_SAFE_PID: u32 = i32::MAX as u32;

/// Get the current platform identifier.
///
/// Returns one of: "linux", "macos", "windows", "freebsd", etc.
#[inline]
pub fn get_platform() -> &'static str {
    OS
}

/// Reject PIDs that can never name a single process.
pub fn validate_pid(pid: u32) -> CpuwatchResult<u32> {
    if pid == 0 {
        return Err(CpuwatchError::invalid_argument("PID 0 is not valid"));
    }
    if pid > MAX_SAFE_PID {
        return Err(CpuwatchError::invalid_argument(format!(
            "PID {} exceeds maximum safe value {}",
            pid, MAX_SAFE_PID
        )));
    }
    Ok(pid)
}
