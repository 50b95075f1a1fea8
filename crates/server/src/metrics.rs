//! Application metrics for Prometheus monitoring.
//!
//! This module provides:
//! - Prometheus metrics recorder initialization
//! - Metric definitions
//! - Helper functions for recording job activity

use batchwright_core::{Advance, BatchCounts, JobState};
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Call once at startup, before any metrics are recorded.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!(
        "batchwright_initiations_total",
        "Initiate calls by result (accepted, conflict, rejected, failed)"
    );
    describe_counter!(
        "batchwright_advance_total",
        "Worker calls by outcome (work, busy, terminal, idle)"
    );
    describe_histogram!(
        "batchwright_advance_duration_seconds",
        "Duration of Worker calls that processed a batch"
    );
    describe_counter!(
        "batchwright_units_total",
        "Units processed by outcome (success, failed)"
    );
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_initiate(result: &'static str) {
    counter!("batchwright_initiations_total", "result" => result).increment(1);
}

/// Label for a Worker call result.
///
/// `work` means a batch was attempted, even if it ended the job. A job that
/// ended before `called_at` was already terminal.
pub fn advance_outcome(advance: &Advance, called_at: DateTime<Utc>) -> &'static str {
    let Advance::Snapshot(snapshot) = advance else {
        return "busy";
    };
    match snapshot.status() {
        None => "idle",
        Some(status) if status.state == JobState::Running => "work",
        Some(status) => match status.ended_at {
            Some(ended) if ended < called_at => "terminal",
            _ => "work",
        },
    }
}

/// Record one Worker call and the units it committed.
pub fn record_advance(outcome: &'static str, duration: Duration, counts: BatchCounts) {
    counter!("batchwright_advance_total", "outcome" => outcome).increment(1);
    if outcome == "work" {
        histogram!("batchwright_advance_duration_seconds").record(duration.as_secs_f64());
    }
    if counts.success > 0 {
        counter!("batchwright_units_total", "outcome" => "success").increment(counts.success);
    }
    if counts.failed > 0 {
        counter!("batchwright_units_total", "outcome" => "failed").increment(counts.failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchwright_core::{Cursor, JobStatus, JobType, Snapshot};

    fn running() -> JobStatus {
        JobStatus::started("j", JobType::Products, "p.csv", "j.csv", Cursor::default(), 2)
    }

    #[test]
    fn test_advance_outcome_labels() {
        let called_at = Utc::now();
        assert_eq!(advance_outcome(&Advance::Busy, called_at), "busy");
        assert_eq!(
            advance_outcome(&Advance::Snapshot(Snapshot::idle()), called_at),
            "idle"
        );
        assert_eq!(
            advance_outcome(&Advance::Snapshot(running().into()), called_at),
            "work"
        );

        let mut done = running();
        done.mark_complete();
        let ended = done.ended_at.unwrap();
        assert_eq!(
            advance_outcome(&Advance::Snapshot(done.clone().into()), ended),
            "work"
        );
        assert_eq!(
            advance_outcome(
                &Advance::Snapshot(done.into()),
                ended + chrono::Duration::seconds(1)
            ),
            "terminal"
        );
    }

    #[test]
    fn test_recording_without_recorder_is_a_noop() {
        record_initiate("accepted");
        record_advance(
            "work",
            Duration::from_millis(3),
            BatchCounts {
                success: 2,
                failed: 1,
            },
        );
        let _ = render_metrics();
    }
}
