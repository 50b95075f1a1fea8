//! Durable status record guarded by a non-blocking advisory lock.
//!
//! The record lives in `status.json`; mutual exclusion comes from an OS file
//! lock on the sibling `status.lock`, which is never deleted so that every
//! process (and every handle inside one process) contends on the same inode.
//! Writes go to a temp file that is renamed over the record, so unlocked
//! readers see either the old or the new record and never a torn one.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::paths;
use crate::types::JobStatus;

/// Outcome of a try-once lock attempt.
#[derive(Debug)]
pub enum Acquire {
    Locked(StatusGuard),
    Busy,
}

/// Handle to the single status record.
#[derive(Debug, Clone)]
pub struct StatusStore {
    status_path: PathBuf,
    lock_path: PathBuf,
}

impl StatusStore {
    /// Open the store inside `data_dir`, creating the directory if needed.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::io(data_dir, e))?;
        Ok(Self {
            status_path: paths::status_file(data_dir),
            lock_path: paths::lock_file(data_dir),
        })
    }

    pub fn status_path(&self) -> &Path {
        &self.status_path
    }

    /// Try to take the exclusive lock without waiting, then load the record.
    ///
    /// A contended caller gets [`Acquire::Busy`] immediately. A corrupt record
    /// is reported as [`StoreError::Corrupt`] and the lock is released.
    pub fn try_acquire(&self) -> Result<Acquire, StoreError> {
        let Some(lock) = self.try_lock()? else {
            return Ok(Acquire::Busy);
        };
        let status = read_status(&self.status_path)?;
        Ok(Acquire::Locked(StatusGuard {
            lock,
            status_path: self.status_path.clone(),
            status,
        }))
    }

    /// Take the lock without loading the record. Used by the Clearer, which
    /// must work even when the record is unreadable.
    pub fn try_lock_raw(&self) -> Result<Option<RawGuard>, StoreError> {
        Ok(self.try_lock()?.map(|lock| RawGuard {
            lock,
            status_path: self.status_path.clone(),
        }))
    }

    /// Cheap, non-exclusive read for progress display.
    pub fn read_without_lock(&self) -> Result<Option<JobStatus>, StoreError> {
        read_status(&self.status_path)
    }

    fn try_lock(&self) -> Result<Option<File>, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| StoreError::io(&self.lock_path, e))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(file)),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(source) => Err(StoreError::Lock {
                path: self.lock_path.clone(),
                source,
            }),
        }
    }
}

/// Exclusive access to the loaded record. Dropping it releases the lock
/// without writing anything.
#[derive(Debug)]
pub struct StatusGuard {
    lock: File,
    status_path: PathBuf,
    status: Option<JobStatus>,
}

impl StatusGuard {
    /// The record as loaded under the lock; `None` when no job exists.
    pub fn status(&self) -> Option<&JobStatus> {
        self.status.as_ref()
    }

    /// Atomically overwrite the record, then release the lock.
    pub fn persist(self, status: &JobStatus) -> Result<(), StoreError> {
        write_status(&self.status_path, status)
    }
}

impl Drop for StatusGuard {
    fn drop(&mut self) {
        release(&self.lock, &self.status_path);
    }
}

/// Exclusive access without a parsed record.
#[derive(Debug)]
pub struct RawGuard {
    lock: File,
    status_path: PathBuf,
}

impl RawGuard {
    /// Best-effort parse of the record (a corrupt record reads as `None`).
    pub fn peek(&self) -> Option<JobStatus> {
        match read_status(&self.status_path) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable job status while clearing");
                None
            }
        }
    }

    /// Delete the record. Returns true if one existed.
    pub fn remove(self) -> Result<bool, StoreError> {
        match std::fs::remove_file(&self.status_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&self.status_path, e)),
        }
    }
}

impl Drop for RawGuard {
    fn drop(&mut self) {
        release(&self.lock, &self.status_path);
    }
}

fn release(lock: &File, status_path: &Path) {
    if let Err(e) = FileExt::unlock(lock) {
        // Closing the handle releases the lock anyway.
        tracing::warn!(path = %status_path.display(), error = %e, "Failed to unlock job status");
    }
}

fn read_status(path: &Path) -> Result<Option<JobStatus>, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            path: path.to_owned(),
            message: e.to_string(),
        })
}

fn write_status(path: &Path, status: &JobStatus) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(status).map_err(|e| StoreError::Corrupt {
        path: path.to_owned(),
        message: format!("failed to serialize: {e}"),
    })?;

    let tmp = path.with_extension("json.tmp");
    let mut file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(&json).map_err(|e| StoreError::io(&tmp, e))?;
    file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
    drop(file);

    std::fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cursor, JobState, JobType};

    fn sample() -> JobStatus {
        JobStatus::started(
            "job-1",
            JobType::Customers,
            "customers.csv",
            "job-1.csv",
            Cursor { offset: 10, row: 0 },
            3,
        )
    }

    #[test]
    fn test_empty_store_reads_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StatusStore::open(tmp.path()).unwrap();
        assert!(store.read_without_lock().unwrap().is_none());

        let Acquire::Locked(guard) = store.try_acquire().unwrap() else {
            panic!("uncontended store should lock");
        };
        assert!(guard.status().is_none());
    }

    #[test]
    fn test_persist_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StatusStore::open(tmp.path()).unwrap();
        let status = sample();

        let Acquire::Locked(guard) = store.try_acquire().unwrap() else {
            panic!("should lock");
        };
        guard.persist(&status).unwrap();

        assert_eq!(store.read_without_lock().unwrap(), Some(status.clone()));
        let Acquire::Locked(guard) = store.try_acquire().unwrap() else {
            panic!("persist should have released the lock");
        };
        assert_eq!(guard.status(), Some(&status));
        assert!(!tmp.path().join("status.json.tmp").exists());
    }

    #[test]
    fn test_second_acquire_is_busy_until_release() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StatusStore::open(tmp.path()).unwrap();
        let other = StatusStore::open(tmp.path()).unwrap();

        let first = store.try_acquire().unwrap();
        assert!(matches!(first, Acquire::Locked(_)));
        assert!(matches!(other.try_acquire().unwrap(), Acquire::Busy));
        assert!(other.try_lock_raw().unwrap().is_none());

        drop(first);
        assert!(matches!(other.try_acquire().unwrap(), Acquire::Locked(_)));
    }

    #[test]
    fn test_unlocked_read_works_while_locked() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StatusStore::open(tmp.path()).unwrap();
        if let Acquire::Locked(guard) = store.try_acquire().unwrap() {
            guard.persist(&sample()).unwrap();
        }

        let _held = store.try_acquire().unwrap();
        let read = store.read_without_lock().unwrap().unwrap();
        assert_eq!(read.state, JobState::Running);
    }

    #[test]
    fn test_corrupt_record_is_an_error_and_releases_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StatusStore::open(tmp.path()).unwrap();
        std::fs::write(store.status_path(), b"{not json").unwrap();

        assert!(matches!(
            store.try_acquire().unwrap_err(),
            StoreError::Corrupt { .. }
        ));
        assert!(matches!(
            store.read_without_lock().unwrap_err(),
            StoreError::Corrupt { .. }
        ));

        let raw = store.try_lock_raw().unwrap().expect("lock must be free");
        assert!(raw.peek().is_none());
        assert!(raw.remove().unwrap());
        assert!(store.read_without_lock().unwrap().is_none());
    }
}
