// SPDX-License-Identifier: MIT

//! Process-wide queue lifecycle: backend selection, instance caching,
//! ordered shutdown.

use crate::backend::QueueBackend;
use crate::error::QueueError;
use crate::job::QueueCounts;
use crate::kv::KvBackend;
use crate::postgres::PgBackend;
use crate::queue::Queue;
use crate::worker::{Processor, Worker, WorkerOptions};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Which substrate backs the job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Jobs table in the primary Postgres store.
    #[default]
    InDb,
    /// External Redis store.
    KvStore,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-db" => Ok(BackendKind::InDb),
            "kv-store" => Ok(BackendKind::KvStore),
            other => Err(format!("unknown queue backend: {other:?}")),
        }
    }
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: BackendKind,
    pub db_url: String,
    /// Required when `backend` is `KvStore`.
    pub kv_url: Option<String>,
    pub worker_concurrency: usize,
    pub poll_interval: Duration,
}

impl QueueConfig {
    pub fn in_db(db_url: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::InDb,
            db_url: db_url.into(),
            kv_url: None,
            worker_concurrency: 5,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Owns the backend plus caches of constructed queues and workers.
///
/// Requesting the same name twice returns the cached instance; the
/// processor argument on a repeated worker request is ignored.
pub struct QueueSupervisor {
    backend: Arc<dyn QueueBackend>,
    worker_options: WorkerOptions,
    queues: Mutex<HashMap<String, Queue>>,
    workers: Mutex<HashMap<String, Arc<Worker>>>,
    start_gate: watch::Sender<bool>,
    shut_down: Mutex<bool>,
}

impl QueueSupervisor {
    /// Construct the configured backend and wrap it.
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let backend: Arc<dyn QueueBackend> = match config.backend {
            BackendKind::InDb => Arc::new(PgBackend::connect(&config.db_url).await?),
            BackendKind::KvStore => {
                let kv_url = config.kv_url.as_deref().ok_or(QueueError::MissingKvUrl)?;
                Arc::new(KvBackend::connect(kv_url).await?)
            }
        };
        tracing::info!(backend = ?config.backend, "queue supervisor connected");
        Ok(Self::with_backend(backend, WorkerOptions {
            concurrency: config.worker_concurrency.max(1),
            poll_interval: config.poll_interval,
        }))
    }

    /// Wrap an already-constructed backend (tests, embedded use).
    pub fn with_backend(backend: Arc<dyn QueueBackend>, worker_options: WorkerOptions) -> Self {
        let (start_gate, _) = watch::channel(false);
        Self {
            backend,
            worker_options,
            queues: Mutex::new(HashMap::new()),
            workers: Mutex::new(HashMap::new()),
            start_gate,
            shut_down: Mutex::new(false),
        }
    }

    /// Get or create the queue handle for `name`.
    pub fn queue(&self, name: &str) -> Queue {
        let mut queues = self.queues.lock();
        queues
            .entry(name.to_string())
            .or_insert_with(|| Queue::new(name, Arc::clone(&self.backend)))
            .clone()
    }

    /// Get or create the worker for `name`. The processor is bound on
    /// first creation only.
    pub fn worker(&self, name: &str, processor: Processor) -> Arc<Worker> {
        let mut workers = self.workers.lock();
        Arc::clone(workers.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Worker::spawn(
                name,
                Arc::clone(&self.backend),
                processor,
                self.worker_options.clone(),
                self.start_gate.subscribe(),
            ))
        }))
    }

    /// Release all workers to begin polling. Idempotent.
    pub fn start(&self) {
        if self.start_gate.send_replace(true) {
            return;
        }
        tracing::info!("queue supervisor started");
    }

    /// Aggregate counters across all cached queues.
    pub async fn status(&self) -> Result<HashMap<String, QueueCounts>, QueueError> {
        let queues: Vec<Queue> = self.queues.lock().values().cloned().collect();
        let mut status = HashMap::new();
        for queue in queues {
            let counts = queue.counts().await?;
            status.insert(queue.name().to_string(), counts);
        }
        Ok(status)
    }

    /// Stop workers, drop queues, close the backend. Safe to call
    /// repeatedly; a second call is a no-op.
    pub async fn shutdown(&self) {
        {
            let mut done = self.shut_down.lock();
            if *done {
                return;
            }
            *done = true;
        }

        let workers: Vec<Arc<Worker>> = self.workers.lock().drain().map(|(_, w)| w).collect();
        for worker in workers {
            worker.shutdown().await;
        }
        self.queues.lock().clear();
        if let Err(err) = self.backend.close().await {
            tracing::warn!(error = %err, "queue backend close failed");
        }
        tracing::info!("queue supervisor shut down");
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
