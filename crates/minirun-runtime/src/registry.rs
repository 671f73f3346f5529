//! On-disk container registry.
//!
//! Records live at `<data_dir>/containers/<name>.json`. Writers serialize
//! per name through `<data_dir>/locks/<name>.lock`; readers take no lock and
//! rely on records only ever being replaced by `rename(2)`, so they observe
//! either the old or the new document, never a partial one.

use std::path::{Path, PathBuf};

use minirun_common::config::MinirunConfig;
use minirun_common::constants::{RECORD_EXTENSION, SUPERVISOR_LOCKS_DIR};
use minirun_common::error::{MinirunError, Result};
use minirun_common::types::ContainerName;

use crate::lifecycle::{self, LifecycleEvent, Outcome};
use crate::lock::FileLock;
use crate::spec::ContainerSpec;
use crate::state::{self, ContainerRecord};

/// Handle to the registry directories.
#[derive(Debug, Clone)]
pub struct Registry {
    records_dir: PathBuf,
    locks_dir: PathBuf,
    supervisor_locks_dir: PathBuf,
}

impl Registry {
    /// Opens the registry for `config`, creating its directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn open(config: &MinirunConfig) -> Result<Self> {
        let locks_dir = config.locks_dir();
        let registry = Self {
            records_dir: config.containers_dir(),
            supervisor_locks_dir: locks_dir.join(SUPERVISOR_LOCKS_DIR),
            locks_dir,
        };
        for dir in [&registry.records_dir, &registry.supervisor_locks_dir] {
            std::fs::create_dir_all(dir).map_err(|e| MinirunError::io(dir, e))?;
        }
        Ok(registry)
    }

    /// Path of the record file for `name`.
    #[must_use]
    pub fn record_path(&self, name: &ContainerName) -> PathBuf {
        self.records_dir.join(format!("{name}.{RECORD_EXTENSION}"))
    }

    /// Path of the supervisor lock for `name`.
    ///
    /// Kept in a subdirectory so it can never collide with the record lock
    /// of another container.
    #[must_use]
    pub fn supervisor_lock_path(&self, name: &ContainerName) -> PathBuf {
        self.supervisor_locks_dir.join(format!("{name}.lock"))
    }

    fn lock_path(&self, name: &ContainerName) -> PathBuf {
        self.locks_dir.join(format!("{name}.lock"))
    }

    /// Locks `name` and loads its record, if any.
    ///
    /// The lock is held until the returned [`Entry`] is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken or the record is
    /// unreadable.
    pub fn entry(&self, name: &ContainerName) -> Result<Entry<'_>> {
        let lock = FileLock::exclusive(&self.lock_path(name))?;
        let record = state::read_record(&self.record_path(name))?;
        Ok(Entry {
            registry: self,
            name: name.clone(),
            record,
            _lock: lock,
        })
    }

    /// Registers a new container in the `Created` state.
    ///
    /// # Errors
    ///
    /// Returns [`MinirunError::AlreadyExists`] if the name is taken.
    pub fn create(&self, spec: ContainerSpec) -> Result<ContainerRecord> {
        let mut entry = self.entry(&spec.name)?;
        let record = ContainerRecord::new(spec);
        entry.insert(record.clone())?;
        tracing::info!(name = %record.name(), "container registered");
        Ok(record)
    }

    /// Reads the record for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MinirunError::NotFound`] if no such container exists.
    pub fn get(&self, name: &ContainerName) -> Result<ContainerRecord> {
        state::read_record(&self.record_path(name))?.ok_or_else(|| MinirunError::NotFound {
            name: name.to_string(),
        })
    }

    /// Returns every readable record, oldest first.
    ///
    /// Temp files and records removed mid-scan are skipped silently;
    /// unreadable records are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the records directory cannot be listed.
    pub fn list(&self) -> Result<Vec<ContainerRecord>> {
        let dir = std::fs::read_dir(&self.records_dir)
            .map_err(|e| MinirunError::io(&self.records_dir, e))?;

        let mut records = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| MinirunError::io(&self.records_dir, e))?;
            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }
            match state::read_record(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name().cmp(b.name()))
        });
        Ok(records)
    }

    /// Applies a lifecycle event to `name` under its lock and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`MinirunError::NotFound`] if the container does not exist,
    /// or [`MinirunError::IllegalTransition`] if the event is not allowed.
    pub fn update(&self, name: &ContainerName, event: LifecycleEvent) -> Result<ContainerRecord> {
        let mut entry = self.entry(name)?;
        let record = entry.apply(event)?;
        Ok(record)
    }

    /// Removes the record for `name`, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`MinirunError::NotFound`] if the container does not exist,
    /// or [`MinirunError::IllegalTransition`] if it is running.
    pub fn delete(&self, name: &ContainerName) -> Result<ContainerRecord> {
        let mut entry = self.entry(name)?;
        let record = entry.apply(LifecycleEvent::Delete)?;
        tracing::info!(name = %name, "container deleted");
        Ok(record)
    }
}

fn is_record_file(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if file_name.starts_with(state::TEMP_PREFIX) {
        return false;
    }
    file_name
        .strip_suffix(RECORD_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .is_some_and(|stem| ContainerName::parse(stem).is_ok())
}

/// A locked view of one registry slot.
#[derive(Debug)]
pub struct Entry<'r> {
    registry: &'r Registry,
    name: ContainerName,
    record: Option<ContainerRecord>,
    _lock: FileLock,
}

impl Entry<'_> {
    /// The current record, if the name is registered.
    #[must_use]
    pub const fn record(&self) -> Option<&ContainerRecord> {
        self.record.as_ref()
    }

    /// The current record.
    ///
    /// # Errors
    ///
    /// Returns [`MinirunError::NotFound`] if the name is not registered.
    pub fn require(&self) -> Result<&ContainerRecord> {
        self.record.as_ref().ok_or_else(|| MinirunError::NotFound {
            name: self.name.to_string(),
        })
    }

    /// Stores a new record in an empty slot.
    ///
    /// # Errors
    ///
    /// Returns [`MinirunError::AlreadyExists`] if the slot is occupied.
    pub fn insert(&mut self, record: ContainerRecord) -> Result<()> {
        if self.record.is_some() {
            return Err(MinirunError::AlreadyExists {
                name: self.name.to_string(),
            });
        }
        state::write_record(&self.registry.record_path(&self.name), &record, false)?;
        self.record = Some(record);
        Ok(())
    }

    /// Applies `event` and persists the result.
    ///
    /// Returns the record after the transition; for `Delete` that is the
    /// record as it was removed.
    ///
    /// # Errors
    ///
    /// Returns [`MinirunError::NotFound`] for an empty slot,
    /// [`MinirunError::IllegalTransition`] if the event is not allowed, or an
    /// I/O error if persisting fails. On error nothing on disk changes.
    pub fn apply(&mut self, event: LifecycleEvent) -> Result<ContainerRecord> {
        let mut next = self.require()?.clone();
        let path = self.registry.record_path(&self.name);
        match lifecycle::apply(&mut next, event)? {
            Outcome::Enter(_) => {
                state::write_record(&path, &next, true)?;
                self.record = Some(next.clone());
            }
            Outcome::Remove => {
                state::remove_record(&path)?;
                self.record = None;
            }
        }
        Ok(next)
    }
}
