//! Wire and persistence types for the single active job.
//!
//! [`JobStatus`] is both the on-disk record kept by the status store and the
//! snapshot returned to pollers, so every field here is part of the public
//! contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

// =============================================================================
// Job type and state
// =============================================================================

/// Which unit handler applies to a job's staged artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../bindings/")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Customers,
    Products,
    Orders,
    Backup,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::Customers,
        JobType::Products,
        JobType::Orders,
        JobType::Backup,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Customers => "customers",
            JobType::Products => "products",
            JobType::Orders => "orders",
            JobType::Backup => "backup",
        }
    }

    /// Import jobs write records; backup jobs push assets to remote storage.
    pub fn is_import(self) -> bool {
        !matches!(self, JobType::Backup)
    }

    /// Noun used in log messages ("customer", "asset", ...).
    pub fn unit_noun(self) -> &'static str {
        match self {
            JobType::Customers => "customer",
            JobType::Products => "product",
            JobType::Orders => "order line",
            JobType::Backup => "asset",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown job type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown job type '{0}'. Valid options: customers, products, orders, backup")]
pub struct UnknownJobType(pub String);

impl FromStr for JobType {
    type Err = UnknownJobType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| UnknownJobType(s.to_string()))
    }
}

/// Lifecycle state of the job.
///
/// `Idle` is never persisted: it is what readers report when no record exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../bindings/")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
    Complete,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Error)
    }
}

// =============================================================================
// Log
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../bindings/")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../bindings/")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub severity: Severity,
}

impl LogEntry {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            severity,
        }
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// Resumption position into the staged artifact.
///
/// `offset` is the byte offset of the next unread record; `row` is the number
/// of data rows (header excluded, blank rows included) consumed so far, used to
/// name rows in log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../bindings/")]
pub struct Cursor {
    #[ts(type = "number")]
    pub offset: u64,
    #[ts(type = "number")]
    pub row: u64,
}

// =============================================================================
// Job status
// =============================================================================

/// The persisted record for the one active job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: String,
    pub job_type: JobType,
    pub state: JobState,
    pub source_name: String,

    /// File name of the staged artifact inside the staging directory.
    /// Cleared once the Worker deletes the artifact at natural completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,

    /// Only present while `state == running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,

    #[ts(type = "number")]
    pub total: u64,
    #[ts(type = "number")]
    pub processed: u64,
    #[ts(type = "number")]
    pub success: u64,
    #[ts(type = "number")]
    pub failed: u64,

    pub log: Vec<LogEntry>,

    /// Handler state that spans unit boundaries. Only present while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carry_over: Option<serde_json::Value>,

    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Last fatal message, set when the job ends in `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl JobStatus {
    /// Initial record written by the Initiator.
    pub fn started(
        job_id: impl Into<String>,
        job_type: JobType,
        source_name: impl Into<String>,
        artifact: impl Into<String>,
        cursor: Cursor,
        total: u64,
    ) -> Self {
        let source_name = source_name.into();
        let noun = job_type.unit_noun();
        let message = format!(
            "Started {} job for {}: {} {}{} queued",
            job_type,
            source_name,
            total,
            noun,
            if total == 1 { "" } else { "s" }
        );
        Self {
            job_id: job_id.into(),
            job_type,
            state: JobState::Running,
            source_name,
            artifact: Some(artifact.into()),
            cursor: Some(cursor),
            total,
            processed: 0,
            success: 0,
            failed: 0,
            log: vec![LogEntry::new(Severity::Info, message)],
            carry_over: None,
            started_at: Utc::now(),
            ended_at: None,
            last_error: None,
        }
    }

    pub fn push_log(&mut self, severity: Severity, message: impl Into<String>) {
        self.log.push(LogEntry::new(severity, message));
    }

    /// Completion percentage in `0..=100`. An empty job counts as done.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let pct = self.processed.saturating_mul(100) / self.total;
        pct.min(100) as u8
    }

    /// Transition to `complete`, dropping the resumption-only fields.
    pub fn mark_complete(&mut self) {
        self.state = JobState::Complete;
        self.ended_at = Some(Utc::now());
        self.cursor = None;
        self.carry_over = None;
        let message = format!(
            "Finished: {} of {} processed, {} succeeded, {} failed",
            self.processed, self.total, self.success, self.failed
        );
        let severity = if self.failed == 0 {
            Severity::Success
        } else {
            Severity::Warning
        };
        self.push_log(severity, message);
    }

    /// Transition to `error`, dropping the resumption-only fields.
    pub fn mark_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.state = JobState::Error;
        self.ended_at = Some(Utc::now());
        self.cursor = None;
        self.carry_over = None;
        self.push_log(Severity::Error, message.clone());
        self.last_error = Some(message);
    }
}

// =============================================================================
// Snapshots returned to callers
// =============================================================================

/// Body returned when no job exists: `{"state":"idle"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../bindings/")]
pub struct IdleSnapshot {
    pub state: JobState,
}

/// What the Reader and the Worker hand back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../bindings/")]
#[serde(untagged)]
pub enum Snapshot {
    Active(Box<JobStatus>),
    Idle(IdleSnapshot),
}

impl Snapshot {
    pub fn idle() -> Self {
        Snapshot::Idle(IdleSnapshot {
            state: JobState::Idle,
        })
    }

    pub fn state(&self) -> JobState {
        match self {
            Snapshot::Active(status) => status.state,
            Snapshot::Idle(idle) => idle.state,
        }
    }

    pub fn status(&self) -> Option<&JobStatus> {
        match self {
            Snapshot::Active(status) => Some(status),
            Snapshot::Idle(_) => None,
        }
    }
}

impl From<JobStatus> for Snapshot {
    fn from(status: JobStatus) -> Self {
        Snapshot::Active(Box::new(status))
    }
}

impl From<Option<JobStatus>> for Snapshot {
    fn from(status: Option<JobStatus>) -> Self {
        match status {
            Some(status) => status.into(),
            None => Snapshot::idle(),
        }
    }
}

/// Result of one Batch Worker call.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// Another caller holds the status lock. Nothing was touched; retry later.
    Busy,
    /// The lock was obtained and the (possibly unchanged) snapshot is returned.
    Snapshot(Snapshot),
}

/// Units one Worker call itself committed. Zero unless a batch was
/// committed by this call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub success: u64,
    pub failed: u64,
}

/// Result of a Clearer call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
    /// False when an in-flight batch held the lock and nothing was deleted.
    pub cleared: bool,
    #[ts(type = "number")]
    pub artifacts_removed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn running(total: u64) -> JobStatus {
        JobStatus::started(
            "job-1",
            JobType::Products,
            "products.csv",
            "job-1.csv",
            Cursor { offset: 24, row: 0 },
            total,
        )
    }

    #[test]
    fn test_job_type_round_trips_through_str() {
        for t in JobType::ALL {
            assert_eq!(t.as_str().parse::<JobType>().unwrap(), t);
        }
        assert_eq!(" Orders ".parse::<JobType>().unwrap(), JobType::Orders);
        let err = "invoices".parse::<JobType>().unwrap_err();
        assert!(err.to_string().contains("invoices"));
    }

    #[test]
    fn test_started_status_has_one_info_entry() {
        let status = running(4);
        assert_eq!(status.state, JobState::Running);
        assert_eq!(status.log.len(), 1);
        assert_eq!(status.log[0].severity, Severity::Info);
        assert!(status.log[0].message.contains("4 products queued"));
        assert_eq!(status.percent(), 0);
    }

    #[test]
    fn test_percent_is_clamped() {
        let mut status = running(3);
        status.processed = 2;
        assert_eq!(status.percent(), 66);
        status.processed = 5;
        assert_eq!(status.percent(), 100);
        assert_eq!(running(0).percent(), 100);
    }

    #[test]
    fn test_terminal_transitions_drop_resumption_fields() {
        let mut status = running(1);
        status.carry_over = Some(serde_json::json!({"orderRef": "A-1"}));
        status.mark_complete();
        assert_eq!(status.state, JobState::Complete);
        assert!(status.cursor.is_none());
        assert!(status.carry_over.is_none());
        assert!(status.ended_at.is_some());

        let mut status = running(1);
        status.mark_error("Staged file vanished");
        assert_eq!(status.state, JobState::Error);
        assert!(status.cursor.is_none());
        assert_eq!(status.last_error.as_deref(), Some("Staged file vanished"));
        assert_eq!(status.log.last().unwrap().severity, Severity::Error);
    }

    #[test]
    fn test_status_serializes_camel_case_and_skips_empty_fields() {
        let status = running(2);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["jobType"], "products");
        assert_eq!(json["state"], "running");
        assert_eq!(json["cursor"]["offset"], 24);
        assert!(json.get("carryOver").is_none());
        assert!(json.get("endedAt").is_none());
    }

    #[test]
    fn test_idle_snapshot_serializes_as_state_only() {
        let json = serde_json::to_string(&Snapshot::idle()).unwrap();
        assert_eq!(json, r#"{"state":"idle"}"#);

        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.state(), JobState::Idle);
    }

    #[test]
    fn test_active_snapshot_round_trips() {
        let snap: Snapshot = Some(running(2)).into();
        let json = serde_json::to_string(&snap).unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snap);
        assert_eq!(parsed.status().unwrap().total, 2);
    }
}
