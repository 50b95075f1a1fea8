//! Seams between the engine and the job-type-specific unit handlers.
//!
//! A [`BatchSink`] opens one [`BatchTx`] per Worker call. Every unit of the
//! batch is applied through that transaction and the whole batch is committed
//! at the end. The per-unit result is explicit:
//!
//! - `Ok(Ok(report))`: the unit succeeded (optionally with a warning)
//! - `Ok(Err(unit_error))`: the unit failed; siblings are unaffected
//! - `Err(batch_error)`: the batch itself is broken and must roll back

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::artifact::Unit;
use crate::error::{BatchError, UnitError};
use crate::types::{JobType, Severity};

/// Log line produced by a successful unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub severity: Severity,
    pub message: String,
}

impl UnitReport {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Success,
            message: message.into(),
        }
    }

    /// Counted as a success but logged with `warning` severity.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

pub type UnitResult = Result<UnitReport, UnitError>;

/// Handler state carried across unit (and batch) boundaries.
pub type CarryOver = Option<serde_json::Value>;

/// The write transaction of one batch.
#[async_trait]
pub trait BatchTx: Send {
    /// Apply one unit. Must catch its own unit-level failures and return them
    /// as `Ok(Err(_))`; only batch-level failures may be returned as `Err`.
    async fn apply(&mut self, unit: &Unit, carry: &mut CarryOver) -> Result<UnitResult, BatchError>;

    /// Make every applied unit durable.
    async fn commit(self: Box<Self>) -> Result<(), BatchError>;

    /// Discard every applied unit.
    async fn rollback(self: Box<Self>) -> Result<(), BatchError>;
}

/// Factory for batch transactions of the job types it serves.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn begin(&self, job_type: JobType) -> Result<Box<dyn BatchTx>, BatchError>;
}

/// Job type → sink registry consulted by the Worker.
#[derive(Clone, Default)]
pub struct HandlerSet {
    sinks: HashMap<JobType, Arc<dyn BatchSink>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` for `job_type`, replacing any previous registration.
    pub fn register(mut self, job_type: JobType, sink: Arc<dyn BatchSink>) -> Self {
        self.sinks.insert(job_type, sink);
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn BatchSink>> {
        self.sinks.get(&job_type).cloned()
    }

    pub fn supports(&self, job_type: JobType) -> bool {
        self.sinks.contains_key(&job_type)
    }
}

impl std::fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.sinks.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("HandlerSet").field("job_types", &types).finish()
    }
}
