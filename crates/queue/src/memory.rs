// SPDX-License-Identifier: MIT

//! In-memory queue backend for tests.
//!
//! Honors the full contract (priority, delay, dedupe keys, retry budget)
//! with a configurable retry backoff that defaults to zero so failure
//! paths run fast under test.

use crate::backend::{FailDisposition, QueueBackend};
use crate::error::QueueError;
use crate::job::{Job, JobOptions, QueueCounts};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Waiting,
    Active,
    Failed,
}

#[derive(Debug, Clone)]
struct Slot {
    job: Job,
    state: JobState,
}

#[derive(Default)]
struct QueueState {
    slots: Vec<Slot>,
    completed: u64,
}

/// Test backend keeping jobs in process memory.
#[derive(Default)]
pub struct MemoryBackend {
    queues: Mutex<HashMap<String, QueueState>>,
    retry_backoff: Option<Duration>,
    closed: Mutex<bool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the retry backoff (default: retry immediately).
    pub fn with_retry_backoff(backoff: Duration) -> Self {
        Self { retry_backoff: Some(backoff), ..Self::default() }
    }

    fn backoff(&self) -> chrono::Duration {
        self.retry_backoff
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .unwrap_or_else(chrono::Duration::zero)
    }

    fn ensure_open(&self) -> Result<(), QueueError> {
        if *self.closed.lock() {
            return Err(QueueError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    async fn enqueue(
        &self,
        queue: &str,
        name: &str,
        payload: Value,
        opts: JobOptions,
    ) -> Result<Job, QueueError> {
        self.ensure_open()?;
        let mut queues = self.queues.lock();
        let state = queues.entry(queue.to_string()).or_default();

        if let Some(key) = &opts.key {
            let live = state.slots.iter().find(|s| {
                s.job.key.as_deref() == Some(key)
                    && matches!(s.state, JobState::Waiting | JobState::Active)
            });
            if let Some(slot) = live {
                return Ok(slot.job.clone());
            }
        }

        let job = Job::new(queue, name, payload, &opts, Utc::now());
        state.slots.push(Slot { job: job.clone(), state: JobState::Waiting });
        Ok(job)
    }

    async fn claim(&self, queue: &str) -> Result<Option<Job>, QueueError> {
        self.ensure_open()?;
        let now = Utc::now();
        let mut queues = self.queues.lock();
        let Some(state) = queues.get_mut(queue) else {
            return Ok(None);
        };

        let next = state
            .slots
            .iter_mut()
            .filter(|s| s.state == JobState::Waiting && s.job.run_at <= now)
            .min_by_key(|s| (s.job.priority, s.job.run_at));
        match next {
            Some(slot) => {
                slot.state = JobState::Active;
                Ok(Some(slot.job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, queue: &str, job: &Job) -> Result<(), QueueError> {
        self.ensure_open()?;
        let mut queues = self.queues.lock();
        if let Some(state) = queues.get_mut(queue) {
            state.slots.retain(|s| s.job.id != job.id);
            state.completed += 1;
        }
        Ok(())
    }

    async fn fail(&self, queue: &str, job: &Job, _error: &str) -> Result<FailDisposition, QueueError> {
        self.ensure_open()?;
        let run_at: DateTime<Utc> = Utc::now() + self.backoff();
        let mut queues = self.queues.lock();
        let Some(state) = queues.get_mut(queue) else {
            return Ok(FailDisposition::Exhausted);
        };
        let Some(slot) = state.slots.iter_mut().find(|s| s.job.id == job.id) else {
            return Ok(FailDisposition::Exhausted);
        };

        slot.job.attempts += 1;
        if slot.job.attempts >= slot.job.max_attempts {
            slot.state = JobState::Failed;
            // Terminal jobs release their dedupe key.
            slot.job.key = None;
            Ok(FailDisposition::Exhausted)
        } else {
            slot.state = JobState::Waiting;
            slot.job.run_at = run_at;
            Ok(FailDisposition::Retried { run_at })
        }
    }

    async fn counts(&self, queue: &str) -> Result<QueueCounts, QueueError> {
        self.ensure_open()?;
        let now = Utc::now();
        let queues = self.queues.lock();
        let Some(state) = queues.get(queue) else {
            return Ok(QueueCounts::default());
        };
        let mut counts = QueueCounts { completed: state.completed, ..Default::default() };
        for slot in &state.slots {
            match slot.state {
                JobState::Waiting if slot.job.run_at <= now => counts.waiting += 1,
                JobState::Waiting => {}
                JobState::Active => counts.active += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn close(&self) -> Result<(), QueueError> {
        *self.closed.lock() = true;
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
