//! Locating the process a condition watches.

use std::fs;
use std::path::{Path, PathBuf};

use cpuwatch_core::{validate_pid, CpuwatchError, CpuwatchResult};

/// The supervisor-side handle a condition is attached to.
///
/// Either accessor may return `None`; a usable watch offers at least one.
/// Values are re-read on every poll, so a restarted process is picked up.
pub trait Watch: Send + Sync {
    /// PID file the supervisor maintains for the process.
    fn pid_file(&self) -> Option<PathBuf>;

    /// PID the supervisor currently knows about.
    fn pid(&self) -> Option<u32>;
}

/// A [`Watch`] with fixed values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticWatch {
    pub pid: Option<u32>,
    pub pid_file: Option<PathBuf>,
}

impl StaticWatch {
    pub fn with_pid(pid: u32) -> Self {
        Self {
            pid: Some(pid),
            pid_file: None,
        }
    }

    pub fn with_pid_file(path: impl Into<PathBuf>) -> Self {
        Self {
            pid: None,
            pid_file: Some(path.into()),
        }
    }
}

impl Watch for StaticWatch {
    fn pid_file(&self) -> Option<PathBuf> {
        self.pid_file.clone()
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Read a PID file: one decimal integer, surrounding whitespace ignored.
///
/// # Errors
///
/// Returns `InvalidPidFile` if the file cannot be read, is not an integer,
/// or holds a PID that cannot name a process (0, negative, above `i32::MAX`).
pub fn read_pid_file(path: &Path) -> CpuwatchResult<u32> {
    let invalid =
        |reason: String| CpuwatchError::invalid_pid_file(path.display().to_string(), reason);

    let content = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;

    let text = content.trim();
    if text.is_empty() {
        return Err(invalid("file is empty".to_string()));
    }

    let pid: u32 = text
        .parse()
        .map_err(|_| invalid(format!("'{}' is not a PID", text)))?;

    validate_pid(pid).map_err(|_| invalid(format!("PID {} is out of range", pid)))
}

/// Where a resolved PID came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PidSource {
    /// The condition's own `pid_file` setting.
    ConditionPidFile(PathBuf),
    /// `Watch::pid()`.
    WatchPid,
    /// `Watch::pid_file()`.
    WatchPidFile(PathBuf),
}

/// Whether any identifier source is configured at all.
pub fn has_pid_source(pid_file: Option<&Path>, watch: Option<&dyn Watch>) -> bool {
    pid_file.is_some() || watch.is_some_and(|w| w.pid().is_some() || w.pid_file().is_some())
}

/// Resolve the PID to sample this poll.
///
/// Order: the condition's `pid_file`, then `watch.pid()`, then
/// `watch.pid_file()`. A configured condition PID file is authoritative: if
/// it is unusable the error is returned rather than falling back.
///
/// # Errors
///
/// Returns `InvalidPidFile` when the chosen PID file is unusable, and
/// `Configuration` when no source yields a PID.
pub fn resolve_pid(
    pid_file: Option<&Path>,
    watch: Option<&dyn Watch>,
) -> CpuwatchResult<(u32, PidSource)> {
    if let Some(path) = pid_file {
        let pid = read_pid_file(path)?;
        return Ok((pid, PidSource::ConditionPidFile(path.to_path_buf())));
    }

    if let Some(watch) = watch {
        if let Some(pid) = watch.pid() {
            let pid = validate_pid(pid)?;
            return Ok((pid, PidSource::WatchPid));
        }
        if let Some(path) = watch.pid_file() {
            let pid = read_pid_file(&path)?;
            return Ok((pid, PidSource::WatchPidFile(path)));
        }
    }

    Err(CpuwatchError::configuration(
        "no PID source: set pid_file or attach a watch that supplies a PID",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_pid_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "cpuwatch-pid-{}-{}.pid",
            std::process::id(),
            name
        ));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_read_pid_file_trims_whitespace() {
        let path = temp_pid_file("trim", "  4242\n");
        assert_eq!(read_pid_file(&path).unwrap(), 4242);
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_read_pid_file_rejects_garbage() {
        for (name, content) in [("word", "abc"), ("empty", "\n"), ("neg", "-5"), ("zero", "0")] {
            let path = temp_pid_file(name, content);
            let result = read_pid_file(&path);
            assert!(
                matches!(result, Err(CpuwatchError::InvalidPidFile { .. })),
                "{content:?} gave {result:?}"
            );
            fs::remove_file(path).ok();
        }
    }

    #[test]
    fn test_read_pid_file_missing() {
        let path = std::env::temp_dir().join("cpuwatch-definitely-missing.pid");
        assert!(matches!(
            read_pid_file(&path),
            Err(CpuwatchError::InvalidPidFile { .. })
        ));
    }

    #[test]
    fn test_condition_pid_file_wins() {
        let path = temp_pid_file("wins", "77");
        let watch = StaticWatch::with_pid(11);
        let (pid, source) = resolve_pid(Some(path.as_path()), Some(&watch as &dyn Watch)).unwrap();
        assert_eq!(pid, 77);
        assert_eq!(source, PidSource::ConditionPidFile(path.clone()));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_bad_condition_pid_file_does_not_fall_back() {
        let path = temp_pid_file("nofallback", "not-a-pid");
        let watch = StaticWatch::with_pid(11);
        assert!(matches!(
            resolve_pid(Some(path.as_path()), Some(&watch as &dyn Watch)),
            Err(CpuwatchError::InvalidPidFile { .. })
        ));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_watch_pid_before_watch_pid_file() {
        let path = temp_pid_file("watchfile", "99");
        let watch = StaticWatch {
            pid: Some(12),
            pid_file: Some(path.clone()),
        };
        assert_eq!(resolve_pid(None, Some(&watch as &dyn Watch)).unwrap().0, 12);

        let watch = StaticWatch::with_pid_file(&path);
        let (pid, source) = resolve_pid(None, Some(&watch as &dyn Watch)).unwrap();
        assert_eq!(pid, 99);
        assert_eq!(source, PidSource::WatchPidFile(path.clone()));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_no_source() {
        assert!(!has_pid_source(None, None));
        assert!(!has_pid_source(None, Some(&StaticWatch::default() as &dyn Watch)));
        assert!(has_pid_source(None, Some(&StaticWatch::with_pid(3) as &dyn Watch)));
        assert!(matches!(
            resolve_pid(None, Some(&StaticWatch::default() as &dyn Watch)),
            Err(CpuwatchError::Configuration { .. })
        ));
    }
}
