//! The job engine: Initiator, Worker, Reader and Clearer over one status
//! record.
//!
//! Every mutating operation takes the status lock with a single non-blocking
//! attempt. The Worker holds it for the whole batch, so a second concurrent
//! caller sees [`Advance::Busy`] instead of double-processing a batch.

use std::path::{Path, PathBuf};

use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::artifact::{self, ArtifactError, Chunk, Inspection, Unit};
use crate::backup;
use crate::config::EngineConfig;
use crate::error::{BatchError, InitiateError, StoreError};
use crate::layout;
use crate::paths;
use crate::sink::{CarryOver, HandlerSet, UnitResult};
use crate::store::{Acquire, StatusStore};
use crate::types::{
    Advance, BatchCounts, ClearReport, Cursor, JobState, JobStatus, JobType, LogEntry, Severity,
    Snapshot,
};

/// Drives the single active job.
#[derive(Debug)]
pub struct JobEngine {
    store: StatusStore,
    staging_dir: PathBuf,
    batch_size: usize,
    handlers: HandlerSet,
}

/// What one committed batch contributes to the job record.
#[derive(Debug)]
struct BatchOutcome {
    entries: Vec<LogEntry>,
    success: u64,
    failed: u64,
    end: Cursor,
    carry_over: CarryOver,
    exhausted: bool,
}

impl BatchOutcome {
    fn record(&mut self, unit: &Unit, result: UnitResult) {
        match result {
            Ok(report) => {
                self.success += 1;
                self.entries.push(LogEntry::new(
                    report.severity,
                    format!("Row {}: {}", unit.row, report.message),
                ));
            }
            Err(err) => {
                self.failed += 1;
                self.entries.push(LogEntry::new(
                    Severity::Error,
                    format!("Row {}: {}", unit.row, err),
                ));
            }
        }
    }
}

impl JobEngine {
    pub fn new(config: &EngineConfig, handlers: HandlerSet) -> Result<Self, StoreError> {
        let store = StatusStore::open(&config.data_dir)?;
        let staging_dir = paths::staging_dir(&config.data_dir);
        std::fs::create_dir_all(&staging_dir).map_err(|e| StoreError::io(&staging_dir, e))?;
        Ok(Self {
            store,
            staging_dir,
            batch_size: config.batch_size.max(1),
            handlers,
        })
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Absolute path of a job's staged artifact, if it still has one.
    pub fn artifact_path(&self, status: &JobStatus) -> Option<PathBuf> {
        status
            .artifact
            .as_deref()
            .map(|name| self.staging_dir.join(name))
    }

    // =========================================================================
    // Initiator
    // =========================================================================

    /// Stage `reader` as a new job's artifact, validate its header against
    /// `job_type` and persist the initial running record.
    ///
    /// On any rejection the staged copy is removed and no record is written.
    pub async fn initiate<R>(
        &self,
        job_type: JobType,
        source_name: &str,
        reader: R,
    ) -> Result<JobStatus, InitiateError>
    where
        R: AsyncRead + Unpin + Send,
    {
        if !self.handlers.supports(job_type) {
            return Err(InitiateError::Unsupported(job_type));
        }

        let guard = match self.store.try_acquire()? {
            Acquire::Busy => return Err(InitiateError::AlreadyRunning { job_id: None }),
            Acquire::Locked(guard) => guard,
        };
        if let Some(existing) = guard.status() {
            if existing.state == JobState::Running {
                return Err(InitiateError::AlreadyRunning {
                    job_id: Some(existing.job_id.clone()),
                });
            }
        }
        let previous_artifact = guard.status().and_then(|s| self.artifact_path(s));

        let job_id = Uuid::new_v4().to_string();
        let artifact_name = format!("{job_id}.csv");
        let path = self.staging_dir.join(&artifact_name);

        let inspection = match self.stage_and_inspect(job_type, &path, reader).await {
            Ok(inspection) => inspection,
            Err(err) => {
                remove_quietly(&path).await;
                tracing::info!(job_type = %job_type, source = source_name, error = %err, "Rejected job");
                return Err(err);
            }
        };

        let status = JobStatus::started(
            job_id,
            job_type,
            source_name,
            artifact_name,
            inspection.start,
            inspection.units,
        );
        if let Err(err) = guard.persist(&status) {
            remove_quietly(&path).await;
            return Err(err.into());
        }
        if let Some(previous) = previous_artifact {
            remove_quietly(&previous).await;
        }

        tracing::info!(
            job_id = %status.job_id,
            job_type = %job_type,
            source = source_name,
            total = status.total,
            "Job started"
        );
        Ok(status)
    }

    /// Build a manifest of every file under `source_dir` and start a backup
    /// job over it.
    pub async fn initiate_backup(&self, source_dir: &Path) -> Result<JobStatus, InitiateError> {
        let dir = source_dir.to_owned();
        let manifest = tokio::task::spawn_blocking(move || backup::build_manifest(&dir))
            .await
            .map_err(|e| InitiateError::io(source_dir, std::io::Error::other(e)))??;
        let source_name = source_dir.display().to_string();
        self.initiate(JobType::Backup, &source_name, manifest.as_slice())
            .await
    }

    async fn stage_and_inspect<R>(
        &self,
        job_type: JobType,
        path: &Path,
        mut reader: R,
    ) -> Result<Inspection, InitiateError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| InitiateError::io(path, e))?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| InitiateError::io(path, e))?;
        file.sync_all()
            .await
            .map_err(|e| InitiateError::io(path, e))?;
        drop(file);

        let owned = path.to_owned();
        let inspection = tokio::task::spawn_blocking(move || artifact::inspect(&owned))
            .await
            .map_err(|e| InitiateError::io(path, std::io::Error::other(e)))?
            .map_err(|e| match e {
                ArtifactError::Io(source) => InitiateError::io(path, source),
                ArtifactError::Csv(message) => InitiateError::Malformed {
                    path: path.to_owned(),
                    message,
                },
            })?;

        if inspection.header.is_empty() {
            return Err(InitiateError::EmptyArtifact {
                reason: "the file has no header row".into(),
            });
        }
        match layout::detect(&inspection.header) {
            None => {
                return Err(InitiateError::UnrecognizedFormat {
                    columns: inspection.header,
                })
            }
            Some(detected) if detected != job_type => {
                return Err(InitiateError::TypeMismatch {
                    detected,
                    expected: job_type,
                })
            }
            Some(_) => {}
        }
        if inspection.units == 0 {
            return Err(InitiateError::EmptyArtifact {
                reason: "the file has a header but no records".into(),
            });
        }
        Ok(inspection)
    }

    // =========================================================================
    // Worker
    // =========================================================================

    /// Process at most one batch of the active job.
    ///
    /// Returns [`Advance::Busy`] when another caller holds the lock. With no
    /// job, or a terminal one, nothing is written and the snapshot is
    /// returned as-is.
    pub async fn advance(&self) -> Result<Advance, StoreError> {
        self.advance_counted().await.map(|(advance, _)| advance)
    }

    /// [`JobEngine::advance`], plus the units committed by this call alone.
    ///
    /// The counts are taken under the lock, so a concurrent caller's batch
    /// is never attributed here.
    pub async fn advance_counted(&self) -> Result<(Advance, BatchCounts), StoreError> {
        let none = BatchCounts::default();
        let guard = match self.store.try_acquire()? {
            Acquire::Busy => {
                tracing::debug!("Advance skipped: job is locked by another caller");
                return Ok((Advance::Busy, none));
            }
            Acquire::Locked(guard) => guard,
        };
        let Some(current) = guard.status() else {
            return Ok((Advance::Snapshot(Snapshot::idle()), none));
        };
        if current.state.is_terminal() {
            return Ok((Advance::Snapshot(current.clone().into()), none));
        }

        let mut status = current.clone();
        let mut finished_artifact = None;
        let mut counts = none;
        match self.run_batch(&status).await {
            Ok(outcome) => {
                counts = BatchCounts {
                    success: outcome.success,
                    failed: outcome.failed,
                };
                tracing::debug!(
                    job_id = %status.job_id,
                    success = outcome.success,
                    failed = outcome.failed,
                    exhausted = outcome.exhausted,
                    "Batch committed"
                );
                let exhausted = outcome.exhausted;
                apply_outcome(&mut status, outcome);
                if exhausted {
                    finished_artifact = self.artifact_path(&status);
                    status.artifact = None;
                    status.mark_complete();
                    tracing::info!(
                        job_id = %status.job_id,
                        processed = status.processed,
                        success = status.success,
                        failed = status.failed,
                        "Job complete"
                    );
                }
            }
            Err(err) => {
                tracing::error!(job_id = %status.job_id, error = %err, "Batch failed");
                status.mark_error(err.to_string());
            }
        }

        guard.persist(&status)?;
        if let Some(path) = finished_artifact {
            remove_quietly(&path).await;
        }
        Ok((Advance::Snapshot(status.into()), counts))
    }

    async fn run_batch(&self, status: &JobStatus) -> Result<BatchOutcome, BatchError> {
        let (Some(cursor), Some(path)) = (status.cursor, self.artifact_path(status)) else {
            return Err(BatchError::MissingCursor);
        };
        let sink = self
            .handlers
            .get(status.job_type)
            .ok_or(BatchError::NoHandler(status.job_type))?;

        let chunk = self.read_chunk(path, cursor).await?;
        let mut outcome = BatchOutcome {
            entries: Vec::with_capacity(chunk.units.len()),
            success: 0,
            failed: 0,
            end: chunk.end,
            carry_over: status.carry_over.clone(),
            exhausted: chunk.exhausted,
        };
        if chunk.units.is_empty() {
            return Ok(outcome);
        }

        let mut tx = sink.begin(status.job_type).await?;
        for unit in &chunk.units {
            let result = match tx.apply(unit, &mut outcome.carry_over).await {
                Ok(result) => result,
                Err(err) => {
                    if let Err(rollback) = tx.rollback().await {
                        tracing::warn!(error = %rollback, "Rollback after batch failure also failed");
                    }
                    return Err(err);
                }
            };
            outcome.record(unit, result);
        }
        tx.commit().await?;
        Ok(outcome)
    }

    async fn read_chunk(&self, path: PathBuf, cursor: Cursor) -> Result<Chunk, BatchError> {
        let limit = self.batch_size;
        let read_path = path.clone();
        let result = tokio::task::spawn_blocking(move || {
            artifact::read_chunk(&read_path, cursor, limit)
        })
        .await
        .map_err(|e| BatchError::Join(e.to_string()))?;

        result.map_err(|e| match e {
            ArtifactError::Io(source) if source.kind() == std::io::ErrorKind::NotFound => {
                BatchError::ArtifactLost { path, source }
            }
            other => BatchError::ArtifactRead {
                path,
                message: other.to_string(),
            },
        })
    }

    // =========================================================================
    // Reader
    // =========================================================================

    /// Current job status without taking the lock.
    pub fn snapshot(&self) -> Result<Snapshot, StoreError> {
        self.store.read_without_lock().map(Snapshot::from)
    }

    // =========================================================================
    // Clearer
    // =========================================================================

    /// Remove the job record and every staged artifact.
    ///
    /// If another caller holds the lock nothing is deleted and the report
    /// says `cleared: false`. Clearing a running job is allowed.
    pub async fn clear(&self) -> Result<ClearReport, StoreError> {
        let Some(guard) = self.store.try_lock_raw()? else {
            tracing::info!("Clear skipped: job is locked by another caller");
            return Ok(ClearReport {
                cleared: false,
                artifacts_removed: 0,
            });
        };
        if let Some(existing) = guard.peek() {
            if existing.state == JobState::Running {
                tracing::warn!(job_id = %existing.job_id, "Clearing a running job");
            }
        }

        let artifacts_removed = self.sweep_staging().await?;
        let had_record = guard.remove()?;
        tracing::info!(had_record, artifacts_removed, "Job cleared");
        Ok(ClearReport {
            cleared: true,
            artifacts_removed,
        })
    }

    async fn sweep_staging(&self) -> Result<u64, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.staging_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StoreError::io(&self.staging_dir, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.staging_dir, e))?
        {
            let path = entry.path();
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        }
        Ok(removed)
    }
}

fn apply_outcome(status: &mut JobStatus, outcome: BatchOutcome) {
    status.processed += outcome.success + outcome.failed;
    status.success += outcome.success;
    status.failed += outcome.failed;
    status.log.extend(outcome.entries);
    status.cursor = Some(outcome.end);
    status.carry_over = outcome.carry_over;
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged file");
        }
    }
}
