// SPDX-License-Identifier: MIT

//! Client handle for one named queue.

use crate::backend::QueueBackend;
use crate::error::QueueError;
use crate::job::{Job, JobOptions, QueueCounts};
use serde_json::Value;
use std::sync::Arc;

/// Cheap cloneable handle for enqueueing onto one queue.
#[derive(Clone)]
pub struct Queue {
    name: String,
    backend: Arc<dyn QueueBackend>,
}

impl Queue {
    pub fn new(name: impl Into<String>, backend: Arc<dyn QueueBackend>) -> Self {
        Self { name: name.into(), backend }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a job. See [`QueueBackend::enqueue`] for dedupe semantics.
    pub async fn add(
        &self,
        job_name: &str,
        payload: Value,
        opts: JobOptions,
    ) -> Result<Job, QueueError> {
        self.backend.enqueue(&self.name, job_name, payload, opts).await
    }

    /// Status counters for this queue.
    pub async fn counts(&self) -> Result<QueueCounts, QueueError> {
        self.backend.counts(&self.name).await
    }
}
