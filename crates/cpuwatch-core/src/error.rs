//! Error types for cpuwatch operations.
//!
//! This module defines the error taxonomy shared by every cpuwatch crate:
//! - [`CpuwatchError`] - Canonical error type for all cpuwatch operations
//!
//! ## Design Principles
//!
//! - **Structured**: Errors carry typed context (pid, path, operation) not just messages
//! - **Two tiers**: Configuration errors are fatal before polling starts; poll-time
//!   errors ([`CpuwatchError::is_recoverable`]) are absorbed by the caller
//! - **ABI-aligned**: Uses `u32` for PIDs (unsigned for cross-platform consistency)

use std::io;
use thiserror::Error;

// ============================================================================
// Canonical Error Type
// ============================================================================

/// Canonical error type for all cpuwatch operations.
///
/// ## Error Code Mapping
///
/// | Variant | Code |
/// |---------|------|
/// | `InvalidArgument` | 1 |
/// | `Configuration` | 2 |
/// | `InvalidPidFile` | 3 |
/// | `PermissionDenied` | 4 |
/// | `NotFound` | 5 |
/// | `NotSupported` | 6 |
/// | `System` | 8 |
/// | `Internal` | 99 |
#[derive(Debug, Error)]
pub enum CpuwatchError {
    /// Invalid argument provided.
    ///
    /// Returned when input validation fails (e.g., pid = 0, malformed duration).
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of what was invalid.
        message: String,
    },

    /// A condition is missing a required setting or carries an impossible one.
    ///
    /// Fatal at setup time: a condition that fails with this error must not poll.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the missing or invalid setting.
        message: String,
    },

    /// PID file is missing, unreadable, or does not contain an integer.
    #[error("Invalid PID file '{path}': {reason}")]
    InvalidPidFile {
        /// The PID file path as configured.
        path: String,
        /// Why the file could not be used.
        reason: String,
    },

    /// Permission denied for the operation.
    ///
    /// Typically returned when reading a process owned by another user.
    #[error("Permission denied for '{operation}' on PID {pid}")]
    PermissionDenied {
        /// The process ID we attempted to inspect.
        pid: u32,
        /// The operation that was denied (e.g., "read cpu times").
        operation: String,
    },

    /// Target process not found.
    ///
    /// The specified PID does not exist or has already exited.
    #[error("Process {pid} not found")]
    NotFound {
        /// The process ID that was not found.
        pid: u32,
    },

    /// Operation not supported on the current platform.
    #[error("Operation '{feature}' not supported on {platform}")]
    NotSupported {
        /// The feature that is not supported.
        feature: String,
        /// The platform where it's not supported.
        platform: String,
    },

    /// System-level error with errno/GetLastError context.
    #[error("System error: {message} (errno: {errno})")]
    System {
        /// Description of the error.
        message: String,
        /// The errno value (Unix) or GetLastError (Windows).
        errno: i32,
    },

    /// Internal error (should not happen in normal operation).
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl CpuwatchError {
    /// Get the stable numeric code for this error.
    pub fn error_code(&self) -> i32 {
        match self {
            CpuwatchError::InvalidArgument { .. } => 1,
            CpuwatchError::Configuration { .. } => 2,
            CpuwatchError::InvalidPidFile { .. } => 3,
            CpuwatchError::PermissionDenied { .. } => 4,
            CpuwatchError::NotFound { .. } => 5,
            CpuwatchError::NotSupported { .. } => 6,
            CpuwatchError::System { .. } => 8,
            CpuwatchError::Internal { .. } => 99,
        }
    }

    /// Whether a poll loop should absorb this error and keep going.
    ///
    /// Processes come and go and PID files get rewritten during restarts;
    /// none of that should stop a monitoring condition.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CpuwatchError::InvalidPidFile { .. }
                | CpuwatchError::NotFound { .. }
                | CpuwatchError::PermissionDenied { .. }
        )
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl CpuwatchError {
    /// Create an `InvalidArgument` error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        CpuwatchError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        CpuwatchError::Configuration {
            message: message.into(),
        }
    }

    /// Create an `InvalidPidFile` error.
    pub fn invalid_pid_file(path: impl Into<String>, reason: impl Into<String>) -> Self {
        CpuwatchError::InvalidPidFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a `PermissionDenied` error.
    pub fn permission_denied(pid: u32, operation: impl Into<String>) -> Self {
        CpuwatchError::PermissionDenied {
            pid,
            operation: operation.into(),
        }
    }

    /// Create a `NotFound` error.
    pub fn not_found(pid: u32) -> Self {
        CpuwatchError::NotFound { pid }
    }

    /// Create a `NotSupported` error.
    pub fn not_supported(feature: impl Into<String>, platform: impl Into<String>) -> Self {
        CpuwatchError::NotSupported {
            feature: feature.into(),
            platform: platform.into(),
        }
    }

    /// Create a `System` error.
    pub fn system(message: impl Into<String>, errno: i32) -> Self {
        CpuwatchError::System {
            message: message.into(),
            errno,
        }
    }

    /// Create an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        CpuwatchError::Internal {
            message: message.into(),
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<io::Error> for CpuwatchError {
    fn from(source: io::Error) -> Self {
        match source.raw_os_error() {
            Some(errno) => CpuwatchError::System {
                message: source.to_string(),
                errno,
            },
            None => CpuwatchError::Internal {
                message: format!("IO error: {}", source),
            },
        }
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for cpuwatch operations.
pub type CpuwatchResult<T> = Result<T, CpuwatchError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CpuwatchError::invalid_argument("pid must be > 0");
        assert_eq!(err.to_string(), "Invalid argument: pid must be > 0");

        let err = CpuwatchError::configuration("Attribute 'above' must be specified");
        assert_eq!(
            err.to_string(),
            "Configuration error: Attribute 'above' must be specified"
        );

        let err = CpuwatchError::invalid_pid_file("/var/run/app.pid", "not an integer");
        assert_eq!(
            err.to_string(),
            "Invalid PID file '/var/run/app.pid': not an integer"
        );

        let err = CpuwatchError::permission_denied(1234, "read cpu times");
        assert_eq!(
            err.to_string(),
            "Permission denied for 'read cpu times' on PID 1234"
        );

        let err = CpuwatchError::not_found(5678);
        assert_eq!(err.to_string(), "Process 5678 not found");

        let err = CpuwatchError::not_supported("process table", "plan9");
        assert_eq!(
            err.to_string(),
            "Operation 'process table' not supported on plan9"
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(CpuwatchError::invalid_argument("").error_code(), 1);
        assert_eq!(CpuwatchError::configuration("").error_code(), 2);
        assert_eq!(CpuwatchError::invalid_pid_file("", "").error_code(), 3);
        assert_eq!(CpuwatchError::permission_denied(0, "").error_code(), 4);
        assert_eq!(CpuwatchError::not_found(0).error_code(), 5);
        assert_eq!(CpuwatchError::not_supported("", "").error_code(), 6);
        assert_eq!(CpuwatchError::system("", 0).error_code(), 8);
        assert_eq!(CpuwatchError::internal("").error_code(), 99);
    }

    #[test]
    fn test_recoverable_split() {
        assert!(CpuwatchError::not_found(42).is_recoverable());
        assert!(CpuwatchError::invalid_pid_file("x", "y").is_recoverable());
        assert!(CpuwatchError::permission_denied(1, "read").is_recoverable());

        assert!(!CpuwatchError::configuration("above").is_recoverable());
        assert!(!CpuwatchError::invalid_argument("pid").is_recoverable());
        assert!(!CpuwatchError::internal("bug").is_recoverable());
    }

    #[test]
    fn test_pid_is_u32() {
        let err = CpuwatchError::not_found(u32::MAX);
        match err {
            CpuwatchError::NotFound { pid } => {
                assert_eq!(pid, u32::MAX);
            }
            _ => panic!("Expected NotFound"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::from_raw_os_error(13);
        let err: CpuwatchError = io_err.into();
        match err {
            CpuwatchError::System { errno, .. } => assert_eq!(errno, 13),
            _ => panic!("Expected System from raw OS error"),
        }

        let io_err = io::Error::other("test error");
        let err: CpuwatchError = io_err.into();
        assert!(matches!(err, CpuwatchError::Internal { .. }));
    }
}
