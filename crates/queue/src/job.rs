// SPDX-License-Identifier: MIT

//! Job data model shared by all queue backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

tw_core::define_id! {
    /// Unique identifier for a queued job. Stable across retries.
    pub struct JobId("job-");
}

/// Default retry budget for a job.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Options accepted on enqueue.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Delay before the job becomes runnable.
    pub delay: Option<Duration>,
    /// Total attempt budget, including the first run.
    pub max_attempts: u32,
    /// Lower runs sooner. Ties break on run time.
    pub priority: i32,
    /// Deduplication key: at most one live job with this key per queue.
    pub key: Option<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            delay: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            priority: 0,
            key: None,
        }
    }
}

impl JobOptions {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self { key: Some(key.into()), ..Self::default() }
    }
}

/// A queued job. The payload is an opaque JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Queue this job belongs to.
    pub queue: String,
    /// Task identifier, dispatched on by processors.
    pub name: String,
    pub payload: Value,
    pub priority: i32,
    /// Earliest time the job may run.
    pub run_at: DateTime<Utc>,
    /// Failed attempts recorded so far.
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Build a fresh job from enqueue arguments.
    pub fn new(queue: &str, name: &str, payload: Value, opts: &JobOptions, now: DateTime<Utc>) -> Self {
        let delay = opts
            .delay
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .unwrap_or_else(chrono::Duration::zero);
        Self {
            id: JobId::generate(),
            queue: queue.to_string(),
            name: name.to_string(),
            payload,
            priority: opts.priority,
            run_at: now + delay,
            attempts: 0,
            max_attempts: opts.max_attempts.max(1),
            key: opts.key.clone(),
            created_at: now,
        }
    }

    /// Whether one more failure exhausts the attempt budget.
    pub fn on_last_attempt(&self) -> bool {
        self.attempts + 1 >= self.max_attempts
    }
}

/// Status counters shared by both backends.
///
/// The in-database backend always reports `completed = 0` because completed
/// rows are deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueCounts {
    pub fn merge(&self, other: &QueueCounts) -> QueueCounts {
        QueueCounts {
            waiting: self.waiting + other.waiting,
            active: self.active + other.active,
            completed: self.completed + other.completed,
            failed: self.failed + other.failed,
        }
    }
}

/// Exponential retry backoff: `2^attempts` seconds, capped at one hour.
pub fn retry_backoff(attempts_after_failure: u32) -> Duration {
    let secs = 2u64
        .checked_pow(attempts_after_failure.min(12))
        .unwrap_or(3600)
        .min(3600);
    Duration::from_secs(secs)
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
