//! Backup jobs: a manifest of local files pushed one by one to remote storage.
//!
//! The manifest is an ordinary staged artifact with the
//! `source_path,remote_key,size_bytes` layout, so backups resume, report and
//! clear exactly like imports.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::artifact::Unit;
use crate::error::{BatchError, InitiateError, UnitError, UnitErrorKind};
use crate::layout;
use crate::sink::{BatchSink, BatchTx, CarryOver, UnitReport, UnitResult};
use crate::types::JobType;

/// Where backed-up assets end up.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Size of the object stored under `key`, or `None` if absent.
    async fn stat(&self, key: &str) -> std::io::Result<Option<u64>>;

    /// Copy `source` to `key`, returning the number of bytes written.
    async fn upload(&self, source: &Path, key: &str) -> std::io::Result<u64>;
}

/// Remote storage backed by a local (or mounted) directory.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl RemoteStorage for DirectoryStorage {
    async fn stat(&self, key: &str) -> std::io::Result<Option<u64>> {
        match tokio::fs::metadata(self.object_path(key)).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn upload(&self, source: &Path, key: &str) -> std::io::Result<u64> {
        let target = self.object_path(key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source, &target).await
    }
}

/// Walk `source_dir` and render the manifest CSV for every regular file
/// under it, sorted by path. Remote keys are relative paths with `/`
/// separators.
pub fn build_manifest(source_dir: &Path) -> Result<Vec<u8>, InitiateError> {
    let meta = std::fs::metadata(source_dir).map_err(|e| InitiateError::io(source_dir, e))?;
    if !meta.is_dir() {
        return Err(InitiateError::io(
            source_dir,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    let write_err = |e: csv::Error| InitiateError::Malformed {
        path: source_dir.to_owned(),
        message: e.to_string(),
    };
    writer
        .write_record(layout::columns(JobType::Backup))
        .map_err(write_err)?;

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source_dir).to_owned();
            InitiateError::io(path, std::io::Error::other(e.to_string()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let size = entry
            .metadata()
            .map_err(|e| InitiateError::io(entry.path(), std::io::Error::other(e.to_string())))?
            .len();
        let Ok(relative) = entry.path().strip_prefix(source_dir) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let source = entry.path().to_string_lossy();
        writer
            .write_record([source.as_ref(), key.as_str(), size.to_string().as_str()])
            .map_err(write_err)?;
    }

    writer.into_inner().map_err(|e| InitiateError::Malformed {
        path: source_dir.to_owned(),
        message: e.to_string(),
    })
}

/// Keys must stay inside the storage root.
fn validate_key(key: &str) -> Result<(), UnitError> {
    if key.is_empty() {
        return Err(UnitError::invalid("remote_key is empty"));
    }
    let escapes = Path::new(key)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(UnitError::invalid(format!(
            "remote_key '{key}' must be a relative path without '..'"
        )));
    }
    Ok(())
}

/// Batch sink for [`JobType::Backup`].
#[derive(Clone)]
pub struct BackupSink {
    storage: Arc<dyn RemoteStorage>,
}

impl BackupSink {
    pub fn new(storage: Arc<dyn RemoteStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl BatchSink for BackupSink {
    async fn begin(&self, job_type: JobType) -> Result<Box<dyn BatchTx>, BatchError> {
        if job_type != JobType::Backup {
            return Err(BatchError::NoHandler(job_type));
        }
        Ok(Box::new(BackupTx {
            storage: self.storage.clone(),
        }))
    }
}

/// Uploads are not transactional: each asset is durable once `apply`
/// returns, and a re-run skips assets already present with the same size.
struct BackupTx {
    storage: Arc<dyn RemoteStorage>,
}

impl BackupTx {
    async fn back_up(&self, unit: &Unit) -> UnitResult {
        let expected = layout::columns(JobType::Backup).len();
        if unit.fields.len() < expected {
            return Err(UnitError::missing_columns(expected, unit.fields.len()));
        }
        let source = PathBuf::from(unit.field(0));
        let key = unit.field(1);
        validate_key(key)?;

        let size = match tokio::fs::metadata(&source).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => {
                return Err(UnitError::new(
                    UnitErrorKind::MissingAsset,
                    format!("{} is not a file", source.display()),
                ))
            }
            Err(e) => {
                return Err(UnitError::new(
                    UnitErrorKind::MissingAsset,
                    format!("cannot read {}: {e}", source.display()),
                ))
            }
        };

        let existing = self
            .storage
            .stat(key)
            .await
            .map_err(|e| UnitError::new(UnitErrorKind::Upload, format!("cannot check {key}: {e}")))?;
        if existing == Some(size) {
            return Ok(UnitReport::warning(format!(
                "{key} already backed up ({size} bytes), skipped"
            )));
        }

        let written = self
            .storage
            .upload(&source, key)
            .await
            .map_err(|e| UnitError::new(UnitErrorKind::Upload, format!("upload of {key} failed: {e}")))?;
        Ok(UnitReport::success(format!("Backed up {key} ({written} bytes)")))
    }
}

#[async_trait]
impl BatchTx for BackupTx {
    async fn apply(&mut self, unit: &Unit, _carry: &mut CarryOver) -> Result<UnitResult, BatchError> {
        Ok(self.back_up(unit).await)
    }

    async fn commit(self: Box<Self>) -> Result<(), BatchError> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BatchError> {
        Ok(())
    }
}
