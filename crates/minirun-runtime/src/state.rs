//! Persistent container records.
//!
//! One JSON document per container holds its immutable spec together with
//! the mutable lifecycle fields. Records are written atomically: a temp
//! file in the same directory is synced and renamed over the target, then
//! the directory itself is synced.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use minirun_common::error::{MinirunError, Result};
use minirun_common::types::{ContainerName, ContainerState};
use serde::{Deserialize, Serialize};

use crate::process::ProcessHandle;
use crate::spec::ContainerSpec;

/// Prefix of in-flight temp files inside the records directory.
pub const TEMP_PREFIX: &str = ".tmp-";

/// Persistent record of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Immutable specification.
    #[serde(flatten)]
    pub spec: ContainerSpec,
    /// Current lifecycle state.
    pub state: ContainerState,
    /// PID of the entry process while running.
    pub pid: Option<u32>,
    /// Kernel start time of `pid`, in clock ticks since boot.
    pub pid_start_time: Option<u64>,
    /// Exit code once finished.
    pub exit_code: Option<i32>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the entry process was launched.
    pub started_at: Option<DateTime<Utc>>,
    /// When the container reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ContainerRecord {
    /// Builds a fresh record in the `Created` state.
    #[must_use]
    pub fn new(spec: ContainerSpec) -> Self {
        Self {
            spec,
            state: ContainerState::Created,
            pid: None,
            pid_start_time: None,
            exit_code: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Returns the container's name.
    #[must_use]
    pub const fn name(&self) -> &ContainerName {
        &self.spec.name
    }

    /// Returns the entry process while the record says it is running.
    #[must_use]
    pub fn process(&self) -> Option<ProcessHandle> {
        match (self.state, self.pid, self.pid_start_time) {
            (ContainerState::Running, Some(pid), Some(start_time)) => {
                Some(ProcessHandle { pid, start_time })
            }
            _ => None,
        }
    }
}

/// Reads a record from disk.
///
/// Returns `Ok(None)` if the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn read_record(path: &Path) -> Result<Option<ContainerRecord>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(MinirunError::io(path, e)),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// Persists a record to `path` atomically.
///
/// With `overwrite` unset the rename refuses to replace an existing file
/// and [`MinirunError::AlreadyExists`] is returned.
///
/// # Errors
///
/// Returns an error if the temp file cannot be written, synced, or renamed.
pub fn write_record(path: &Path, record: &ContainerRecord, overwrite: bool) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tracing::debug!(path = %path.display(), state = %record.state, "saving record");

    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(|e| MinirunError::io(dir, e))?;
    serde_json::to_writer_pretty(&mut tmp, record)?;
    tmp.write_all(b"\n").map_err(|e| MinirunError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| MinirunError::io(tmp.path(), e))?;

    let persisted = if overwrite {
        tmp.persist(path)
    } else {
        tmp.persist_noclobber(path)
    };
    if let Err(e) = persisted {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            return Err(MinirunError::AlreadyExists {
                name: record.name().to_string(),
            });
        }
        return Err(MinirunError::io(path, e.error));
    }
    sync_dir(dir)
}

/// Removes a record file and syncs its directory.
///
/// # Errors
///
/// Returns an error if the file cannot be removed.
pub fn remove_record(path: &Path) -> Result<()> {
    std::fs::remove_file(path).map_err(|e| MinirunError::io(path, e))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    sync_dir(dir)
}

fn sync_dir(dir: &Path) -> Result<()> {
    std::fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| MinirunError::io(dir, e))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use minirun_common::types::ResourceLimits;

    use super::*;

    fn record(name: &str) -> ContainerRecord {
        ContainerRecord::new(ContainerSpec {
            name: ContainerName::parse(name).expect("name"),
            rootfs: PathBuf::from("/srv/rootfs"),
            command: vec!["/bin/sh".into(), "-c".into(), "echo hi".into()],
            limits: ResourceLimits::default(),
        })
    }

    #[test]
    fn new_record_is_created() {
        let rec = record("fresh");
        assert_eq!(rec.state, ContainerState::Created);
        assert!(rec.pid.is_none());
        assert!(rec.exit_code.is_none());
        assert!(rec.process().is_none());
    }

    #[test]
    fn json_has_flat_spec_fields() {
        let rec = record("flat");
        let value: serde_json::Value = serde_json::to_value(&rec).expect("to_value");
        assert_eq!(value["name"], "flat");
        assert_eq!(value["rootfs"], "/srv/rootfs");
        assert_eq!(value["command"][2], "echo hi");
        assert_eq!(value["state"], "created");
        assert!(value["created_at"].is_string());
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app.json");
        let rec = record("app");
        write_record(&path, &rec, false).expect("write");
        let loaded = read_record(&path).expect("read").expect("present");
        assert_eq!(loaded, rec);
    }

    #[test]
    fn read_missing_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(read_record(&dir.path().join("nope.json")).expect("read").is_none());
    }

    #[test]
    fn noclobber_refuses_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dup.json");
        write_record(&path, &record("dup"), false).expect("first write");
        let err = write_record(&path, &record("dup"), false).expect_err("second write");
        assert!(matches!(err, MinirunError::AlreadyExists { .. }));
    }

    #[test]
    fn overwrite_replaces_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app.json");
        let mut rec = record("app");
        write_record(&path, &rec, false).expect("write");
        rec.state = ContainerState::Failed;
        rec.exit_code = Some(125);
        write_record(&path, &rec, true).expect("overwrite");

        let loaded = read_record(&path).expect("read").expect("present");
        assert_eq!(loaded.state, ContainerState::Failed);
        let entries = std::fs::read_dir(dir.path()).expect("read_dir").count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn corrupt_record_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ truncated").expect("write");
        assert!(read_record(&path).is_err());
    }
}
