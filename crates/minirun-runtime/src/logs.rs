//! Container log management.
//!
//! Each container has one append-only log at `<logs_dir>/<name>.log`. The
//! container's stdout and stderr and its supervisor's lifecycle messages
//! all land there.

use std::fs::File;
use std::path::{Path, PathBuf};

use minirun_common::error::{MinirunError, Result};
use minirun_common::types::ContainerName;

/// Returns the log file path for a container.
#[must_use]
pub fn log_path(logs_dir: &Path, name: &ContainerName) -> PathBuf {
    logs_dir.join(format!("{name}.log"))
}

/// Opens the container's log for appending, creating it if needed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created.
pub fn open_log(logs_dir: &Path, name: &ContainerName) -> Result<File> {
    std::fs::create_dir_all(logs_dir).map_err(|e| MinirunError::io(logs_dir, e))?;
    let path = log_path(logs_dir, name);
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| MinirunError::io(path, e))
}

/// Reads container logs from disk.
///
/// Returns an empty string if the log file does not exist yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_logs(logs_dir: &Path, name: &ContainerName) -> Result<String> {
    let path = log_path(logs_dir, name);
    match std::fs::read(&path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(MinirunError::io(path, e)),
    }
}

/// Deletes a container's log. A missing log is not an error.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be removed.
pub fn remove_log(logs_dir: &Path, name: &ContainerName) -> Result<()> {
    let path = log_path(logs_dir, name);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MinirunError::io(path, e)),
    }
}

#[cfg(test)]
pub(crate) fn append_log(logs_dir: &Path, name: &ContainerName, line: &str) -> Result<()> {
    use std::io::Write;

    let mut file = open_log(logs_dir, name)?;
    writeln!(file, "{line}").map_err(|e| MinirunError::io(log_path(logs_dir, name), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ContainerName {
        ContainerName::parse(s).expect("name")
    }

    #[test]
    fn log_path_is_constructed_correctly() {
        let p = log_path(Path::new("/var/lib/minirun/logs"), &name("abc-123"));
        assert_eq!(p, Path::new("/var/lib/minirun/logs/abc-123.log"));
    }

    #[test]
    fn read_logs_missing_file_returns_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let content = read_logs(dir.path(), &name("nonexistent")).expect("should succeed");
        assert!(content.is_empty());
    }

    #[test]
    fn append_accumulates_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        append_log(dir.path(), &name("c1"), "line one").expect("append 1");
        append_log(dir.path(), &name("c1"), "line two").expect("append 2");

        let content = read_logs(dir.path(), &name("c1")).expect("read");
        assert_eq!(content, "line one\nline two\n");
    }

    #[test]
    fn open_log_creates_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let logs_dir = dir.path().join("logs");
        drop(open_log(&logs_dir, &name("c2")).expect("open"));
        assert!(log_path(&logs_dir, &name("c2")).exists());
    }

    #[test]
    fn separate_containers_have_separate_logs() {
        let dir = tempfile::tempdir().expect("tempdir");
        append_log(dir.path(), &name("a"), "from a").expect("append a");
        append_log(dir.path(), &name("b"), "from b").expect("append b");

        let a_logs = read_logs(dir.path(), &name("a")).expect("read a");
        assert!(a_logs.contains("from a"));
        assert!(!a_logs.contains("from b"));
    }

    #[test]
    fn remove_log_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        append_log(dir.path(), &name("gone"), "bye").expect("append");
        remove_log(dir.path(), &name("gone")).expect("remove");
        assert!(!log_path(dir.path(), &name("gone")).exists());
        remove_log(dir.path(), &name("gone")).expect("remove again");
    }
}
