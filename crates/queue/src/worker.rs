// SPDX-License-Identifier: MIT

//! Generic polling worker driving any [`QueueBackend`].
//!
//! One worker serves one queue with bounded concurrency. Claimed jobs are
//! processed on spawned tasks; completion/failure is acknowledged back to
//! the backend, which owns retry scheduling. Observable events are
//! published on a broadcast channel: `Completed`, `Failed` (terminal only),
//! and `Error` for backend faults.

use crate::backend::{FailDisposition, QueueBackend};
use crate::job::Job;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Result of one processing attempt.
pub type ProcessResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Job processor: a single async callback per worker.
pub type Processor = Arc<dyn Fn(Job) -> BoxFuture<'static, ProcessResult> + Send + Sync>;

/// Observable worker events.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job finished successfully.
    Completed(Job),
    /// A job exhausted its attempt budget. Retried attempts do not emit.
    Failed { job: Job, error: String },
    /// A backend fault outside any single job.
    Error(String),
}

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Concurrent jobs in flight.
    pub concurrency: usize,
    /// Idle poll interval. The backend is polled at least this often.
    pub poll_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self { concurrency: 5, poll_interval: Duration::from_secs(1) }
    }
}

/// A running worker bound to one queue.
pub struct Worker {
    queue: String,
    events: broadcast::Sender<WorkerEvent>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Spawn the poll loop. Polling holds off until `gate` reads `true`,
    /// letting the supervisor start all workers at once.
    pub fn spawn(
        queue: impl Into<String>,
        backend: Arc<dyn QueueBackend>,
        processor: Processor,
        opts: WorkerOptions,
        gate: watch::Receiver<bool>,
    ) -> Self {
        let queue = queue.into();
        let (events, _) = broadcast::channel(256);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_loop(
            queue.clone(),
            backend,
            processor,
            opts,
            gate,
            events.clone(),
            cancel.clone(),
        ));

        Self { queue, events, cancel, handle: Mutex::new(Some(handle)) }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Subscribe to worker events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// Stop polling and wait for in-flight jobs to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!(queue = %self.queue, error = %err, "worker task panicked during shutdown");
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    queue: String,
    backend: Arc<dyn QueueBackend>,
    processor: Processor,
    opts: WorkerOptions,
    mut gate: watch::Receiver<bool>,
    events: broadcast::Sender<WorkerEvent>,
    cancel: CancellationToken,
) {
    // Hold until the supervisor releases the gate (or shutdown wins).
    tokio::select! {
        _ = cancel.cancelled() => return,
        result = gate.wait_for(|started| *started) => {
            if result.is_err() {
                return;
            }
        }
    }

    let concurrency = opts.concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut ticker = tokio::time::interval(opts.poll_interval.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tracing::info!(queue, concurrency, "worker started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Claim as long as permits and runnable jobs are available.
        loop {
            let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                break;
            };
            match backend.claim(&queue).await {
                Ok(Some(job)) => {
                    let backend = Arc::clone(&backend);
                    let processor = Arc::clone(&processor);
                    let events = events.clone();
                    let queue = queue.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        process_one(&queue, backend, processor, events, job).await;
                    });
                }
                Ok(None) => {
                    drop(permit);
                    break;
                }
                Err(err) => {
                    drop(permit);
                    tracing::warn!(queue, error = %err, "claim failed");
                    let _ = events.send(WorkerEvent::Error(err.to_string()));
                    break;
                }
            }
        }
    }

    // Drain: wait for all in-flight jobs before returning.
    let _ = semaphore.acquire_many(concurrency as u32).await;
    tracing::info!(queue, "worker stopped");
}

async fn process_one(
    queue: &str,
    backend: Arc<dyn QueueBackend>,
    processor: Processor,
    events: broadcast::Sender<WorkerEvent>,
    job: Job,
) {
    match processor(job.clone()).await {
        Ok(()) => {
            if let Err(err) = backend.complete(queue, &job).await {
                tracing::warn!(queue, job_id = %job.id, error = %err, "completion ack failed");
                let _ = events.send(WorkerEvent::Error(err.to_string()));
                return;
            }
            let _ = events.send(WorkerEvent::Completed(job));
        }
        Err(process_err) => {
            let message = process_err.to_string();
            match backend.fail(queue, &job, &message).await {
                Ok(FailDisposition::Retried { .. }) => {}
                Ok(FailDisposition::Exhausted) => {
                    let _ = events.send(WorkerEvent::Failed { job, error: message });
                }
                Err(err) => {
                    tracing::warn!(queue, job_id = %job.id, error = %err, "failure ack failed");
                    let _ = events.send(WorkerEvent::Error(err.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
