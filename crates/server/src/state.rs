// crates/server/src/state.rs
//! Application state for the Axum server.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use batchwright_core::{
    AppConfig, BackupSink, DirectoryStorage, HandlerSet, JobEngine, StoreError,
};
use batchwright_db::{Database, ImportSink};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// The single-job engine (Initiator, Worker, Reader, Clearer).
    pub engine: JobEngine,
    /// Record store written by import jobs.
    pub db: Database,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(engine: JobEngine, db: Database) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            engine,
            db,
        })
    }

    /// Wire the engine with the import sink for every record type and a
    /// directory-backed sink for backups.
    ///
    /// Fails only when the engine's data directory cannot be created.
    pub fn build(config: &AppConfig, db: Database) -> Result<Arc<Self>, StoreError> {
        let engine = JobEngine::new(&config.engine, handlers(db.clone(), &config.server.backup_dir))?;
        Ok(Self::new(engine, db))
    }

    /// Get uptime in seconds since server start.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Handler set used by the server: SQLite imports plus directory backups.
pub fn handlers(db: Database, backup_dir: &Path) -> HandlerSet {
    let backup = BackupSink::new(Arc::new(DirectoryStorage::new(backup_dir)));
    ImportSink::new(db)
        .register(HandlerSet::new())
        .register(batchwright_core::JobType::Backup, Arc::new(backup))
}
