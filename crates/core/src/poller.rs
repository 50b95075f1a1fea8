//! Client-side driver that calls the Worker until the job is terminal.

use async_trait::async_trait;
use std::time::Duration;

use crate::engine::JobEngine;
use crate::error::StoreError;
use crate::types::{Advance, ClearReport, JobStatus};

/// Something that exposes the Worker and the Clearer: the in-process engine
/// or a remote server.
#[async_trait]
pub trait JobEndpoint: Send + Sync {
    type Error: std::fmt::Display + std::fmt::Debug + Send;

    async fn advance(&self) -> Result<Advance, Self::Error>;

    async fn clear(&self) -> Result<ClearReport, Self::Error>;
}

#[async_trait]
impl JobEndpoint for JobEngine {
    type Error = StoreError;

    async fn advance(&self) -> Result<Advance, StoreError> {
        JobEngine::advance(self).await
    }

    async fn clear(&self) -> Result<ClearReport, StoreError> {
        JobEngine::clear(self).await
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay between Worker calls while the job is running.
    pub tick: Duration,
    /// Delay after a busy answer.
    pub busy_retry: Duration,
    /// Consecutive transport failures tolerated before giving up.
    pub max_failures: u32,
    pub backoff_cap: Duration,
    /// Call the Clearer once the job reaches a terminal state.
    pub clear_on_finish: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(250),
            busy_retry: Duration::from_secs(1),
            max_failures: 5,
            backoff_cap: Duration::from_secs(30),
            clear_on_finish: false,
        }
    }
}

/// Progress notifications handed to the caller's callback.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Progress(JobStatus),
    Busy,
    Retrying {
        attempt: u32,
        delay: Duration,
        error: String,
    },
    Finished(JobStatus),
    Cleared(ClearReport),
}

#[derive(Debug, thiserror::Error)]
pub enum PollError<E: std::fmt::Display + std::fmt::Debug> {
    #[error("No job is active")]
    NoActiveJob,

    #[error("Giving up after {attempts} failed attempts: {last_error}")]
    GaveUp { attempts: u32, last_error: E },
}

pub struct Poller<E> {
    endpoint: E,
    config: PollerConfig,
}

impl<E: JobEndpoint> Poller<E> {
    pub fn new(endpoint: E, config: PollerConfig) -> Self {
        Self { endpoint, config }
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Backoff before retry number `attempt` (1-based).
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.config
            .tick
            .saturating_mul(factor)
            .min(self.config.backoff_cap)
    }

    /// Poll until the job is terminal and return its final status.
    pub async fn run<F>(&self, mut on_event: F) -> Result<JobStatus, PollError<E::Error>>
    where
        F: FnMut(&PollEvent) + Send,
    {
        let mut failures = 0u32;
        loop {
            let snapshot = match self.endpoint.advance().await {
                Ok(Advance::Busy) => {
                    failures = 0;
                    on_event(&PollEvent::Busy);
                    tokio::time::sleep(self.config.busy_retry).await;
                    continue;
                }
                Ok(Advance::Snapshot(snapshot)) => snapshot,
                Err(err) => {
                    failures += 1;
                    if failures >= self.config.max_failures {
                        return Err(PollError::GaveUp {
                            attempts: failures,
                            last_error: err,
                        });
                    }
                    let delay = self.backoff(failures);
                    tracing::warn!(attempt = failures, error = %err, ?delay, "Worker call failed, retrying");
                    on_event(&PollEvent::Retrying {
                        attempt: failures,
                        delay,
                        error: err.to_string(),
                    });
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };
            failures = 0;

            let Some(status) = snapshot.status() else {
                return Err(PollError::NoActiveJob);
            };
            if !status.state.is_terminal() {
                on_event(&PollEvent::Progress(status.clone()));
                tokio::time::sleep(self.config.tick).await;
                continue;
            }

            let status = status.clone();
            on_event(&PollEvent::Finished(status.clone()));
            if self.config.clear_on_finish {
                match self.endpoint.clear().await {
                    Ok(report) => on_event(&PollEvent::Cleared(report)),
                    Err(err) => tracing::warn!(error = %err, "Failed to clear finished job"),
                }
            }
            return Ok(status);
        }
    }
}
