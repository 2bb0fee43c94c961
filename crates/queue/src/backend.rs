// SPDX-License-Identifier: MIT

//! The uniform queue contract implemented by both substrates.

use crate::error::QueueError;
use crate::job::{Job, JobOptions, QueueCounts};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailDisposition {
    /// Attempt budget remains; the job will run again at `run_at`.
    Retried { run_at: DateTime<Utc> },
    /// Budget exhausted; the job is recorded as failed and never replayed.
    Exhausted,
}

/// Storage contract for a durable job queue.
///
/// Guarantees at-least-once execution when driven by [`crate::Worker`]:
/// a claimed job that is neither completed nor failed (process crash)
/// becomes claimable again once its backend-specific lock lapses.
#[async_trait]
pub trait QueueBackend: Send + Sync + 'static {
    /// Insert a job. When `opts.key` is set and a live job with the same
    /// key exists, that job is returned instead of inserting a new one.
    async fn enqueue(
        &self,
        queue: &str,
        name: &str,
        payload: Value,
        opts: JobOptions,
    ) -> Result<Job, QueueError>;

    /// Claim the next due job, marking it active. Returns `None` when
    /// nothing is runnable.
    async fn claim(&self, queue: &str) -> Result<Option<Job>, QueueError>;

    /// Acknowledge successful processing.
    async fn complete(&self, queue: &str, job: &Job) -> Result<(), QueueError>;

    /// Record a failed attempt. The backend decides between retry (with
    /// its own backoff) and terminal failure.
    async fn fail(&self, queue: &str, job: &Job, error: &str) -> Result<FailDisposition, QueueError>;

    /// Status counters for one queue.
    async fn counts(&self, queue: &str) -> Result<QueueCounts, QueueError>;

    /// Release underlying connections. Safe to call more than once.
    async fn close(&self) -> Result<(), QueueError>;
}
