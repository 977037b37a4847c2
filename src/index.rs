//! Lock-file-guarded monotonic counters.
//!
//! An [`IndexFile`] is a single-field archive holding the last id handed
//! out for experiments or measurements. Reads are deliberately lock-free
//! and racy (status display); [`IndexFile::increment`] is the one
//! read-modify-write path and the unit of atomicity for id allocation.
//!
//! Locking is advisory and non-blocking: [`LockGuard::acquire`] creates a
//! sibling `<file>.lock` marker and fails immediately with a resource-busy
//! error when the marker already exists. There is no timeout, retry or
//! lease; a crash while holding the lock leaves a stale marker that must
//! be removed manually.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::archive::{archive_exists, Archive};
use crate::config::Settings;
use crate::value::{Map, Value};
use crate::{Error, Result};

/// What a counter numbers; fixes the archive name and field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Numbers experiments (`experiments` / `last_experiment_id`).
    Experiment,
    /// Numbers measurements (`measurements` / `last_measurement_id`).
    Measurement,
}

impl IndexKind {
    const fn archive_name(self) -> &'static str {
        match self {
            Self::Experiment => "experiments",
            Self::Measurement => "measurements",
        }
    }

    const fn field(self) -> &'static str {
        match self {
            Self::Experiment => "last_experiment_id",
            Self::Measurement => "last_measurement_id",
        }
    }
}

/// A monotonic counter stored as a one-field archive.
#[derive(Debug, Clone)]
pub struct IndexFile {
    basename: PathBuf,
    archive: Archive,
    field: &'static str,
}

impl IndexFile {
    /// Bind a counter to `filename`.
    ///
    /// # Errors
    ///
    /// Returns an ambiguity error when several encodings of the basename
    /// exist.
    pub fn new(filename: impl AsRef<Path>, kind: IndexKind, settings: &Settings) -> Result<Self> {
        let archive = Archive::open(filename.as_ref(), Some(kind.archive_name()), settings)?;
        Ok(Self {
            basename: filename.as_ref().to_path_buf(),
            archive,
            field: kind.field(),
        })
    }

    /// Whether any encoding of the counter file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        archive_exists(&self.basename)
    }

    /// Current counter value, read without taking the lock; not linearized
    /// against a concurrent increment. Returns 0 when no file exists.
    ///
    /// # Errors
    ///
    /// Returns a format error when the file exists but does not hold the
    /// counter field.
    pub fn get(&self) -> Result<u64> {
        if !self.exists() {
            return Ok(0);
        }
        self.read_value()
    }

    /// Write the counter value 0 under the lock, creating or resetting the
    /// file.
    ///
    /// # Errors
    ///
    /// Returns a resource-busy error when the lock marker exists.
    pub fn create(&self) -> Result<()> {
        let _guard = LockGuard::acquire(self.archive.filename())?;
        debug!(file = %self.archive.filename().display(), "creating index file");
        self.write_value(0)
    }

    /// Set the counter under the lock. A missing file makes this a no-op.
    ///
    /// # Errors
    ///
    /// Returns a resource-busy error when the lock marker exists.
    pub fn set(&self, value: u64) -> Result<()> {
        if !self.exists() {
            return Ok(());
        }
        let _guard = LockGuard::acquire(self.archive.filename())?;
        self.write_value(value)
    }

    /// Atomically add 1 to the counter and return the new value: acquire
    /// the lock, load, store, release. Returns 0 without touching the
    /// filesystem when no counter file exists.
    ///
    /// # Errors
    ///
    /// Returns a resource-busy error when the lock marker exists.
    pub fn increment(&self) -> Result<u64> {
        if !self.exists() {
            return Ok(0);
        }
        let _guard = LockGuard::acquire(self.archive.filename())?;
        let next = self.read_value()? + 1;
        self.write_value(next)?;
        debug!(file = %self.archive.filename().display(), value = next, "incremented index");
        Ok(next)
    }

    /// Delete the counter file, if present.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the file cannot be removed.
    pub fn remove(&self) -> Result<()> {
        if self.exists() {
            fs::remove_file(self.archive.filename())?;
        }
        Ok(())
    }

    /// The counter's on-disk file.
    #[must_use]
    pub fn filename(&self) -> &Path {
        self.archive.filename()
    }

    fn read_value(&self) -> Result<u64> {
        let document = self.archive.load()?;
        let value = document.get(self.field).and_then(Value::as_int).ok_or_else(|| {
            Error::Format(format!(
                "index file {} does not hold an integer \"{}\" field",
                self.archive.filename().display(),
                self.field
            ))
        })?;
        u64::try_from(value).map_err(|_| {
            Error::Format(format!(
                "index file {} holds a negative counter",
                self.archive.filename().display()
            ))
        })
    }

    fn write_value(&self, value: u64) -> Result<()> {
        let mut document = Map::new();
        document.insert(self.field.to_string(), int_value(value));
        self.archive.save(&Value::Map(document))
    }
}

#[allow(clippy::cast_possible_wrap)]
fn int_value(value: u64) -> Value {
    Value::Int(value as i64)
}

/// Scoped advisory lock over a file.
///
/// Holds a `<file>.lock` marker for its lifetime; the marker is removed on
/// drop, so release happens on every exit path of the critical section. If
/// the owning process dies without dropping the guard the marker stays -
/// that stale marker must be removed manually.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    /// Create the lock marker for `target`, failing immediately (no
    /// blocking, no retry) when it already exists.
    ///
    /// # Errors
    ///
    /// Returns a resource-busy error when the marker exists, or an IO error
    /// when it cannot be created.
    pub fn acquire(target: &Path) -> Result<Self> {
        let path = lock_path(target);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(Error::ResourceBusy { lock: path })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The marker file held by this guard.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn lock_path(target: &Path) -> PathBuf {
    let mut os = target.as_os_str().to_os_string();
    os.push(".lock");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_suffix() {
        assert_eq!(
            lock_path(Path::new("d/measurement.index.json")),
            PathBuf::from("d/measurement.index.json.lock")
        );
    }
}
