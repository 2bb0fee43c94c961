// SPDX-License-Identifier: MIT

//! The ingestion surface: validated batch write plus best-effort
//! post-commit side effects (channel publish, detection-scan enqueue).
//!
//! Side effects run on a bounded single-consumer pool and are never
//! awaited by the ingest response; overflow drops the work and counts it.

use crate::scan::{ScanPayload, SCAN_JOB_NAME};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tw_core::{Clock, LogId, NewLogRecord, ProjectId, TenantId, ValidationError};
use tw_queue::{JobOptions, Queue};
use tw_storage::{LogWriter, StorageError};
use tw_stream::NotificationSink;

/// Bound on queued-but-unprocessed side-effect batches.
const SIDE_EFFECT_CAPACITY: usize = 256;

/// Bounded overall timeout for publish + enqueue of one batch.
const SIDE_EFFECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Successful ingest result.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub ids: Vec<LogId>,
}

/// Ingestion failure, mapped onto the wire contract.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IngestError {
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Storage(err) => err.code(),
        }
    }

    /// HTTP status the transport layer maps this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            IngestError::Storage(StorageError::Validation(ValidationError::BatchTooLarge(_))) => 413,
            IngestError::Storage(StorageError::Validation(_)) => 400,
            IngestError::Storage(_) => 500,
        }
    }

    /// Structured `{error, code}` body.
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string(), "code": self.code() })
    }
}

enum SideEffect {
    Batch {
        tenant: TenantId,
        project: ProjectId,
        ids: Vec<LogId>,
    },
    Flush(oneshot::Sender<()>),
}

/// Bounded pool running post-commit side effects.
pub struct SideEffects {
    tx: mpsc::Sender<SideEffect>,
    dropped: Arc<AtomicU64>,
}

impl SideEffects {
    /// Spawn the consumer task.
    pub fn spawn(sink: Arc<dyn NotificationSink>, scan_queue: Queue) -> Self {
        let (tx, mut rx) = mpsc::channel::<SideEffect>(SIDE_EFFECT_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));

        tokio::spawn(async move {
            while let Some(effect) = rx.recv().await {
                match effect {
                    SideEffect::Batch { tenant, project, ids } => {
                        run_side_effects(&sink, &scan_queue, &tenant, &project, &ids).await;
                    }
                    SideEffect::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self { tx, dropped }
    }

    /// Submit one batch. Drops (with a counter bump) when the pool is full.
    pub fn submit(&self, tenant: TenantId, project: ProjectId, ids: Vec<LogId>) {
        let effect = SideEffect::Batch { tenant, project, ids };
        if let Err(err) = self.tx.try_send(effect) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                dropped_total = self.dropped.load(Ordering::Relaxed),
                error = %err,
                "side-effect pool full, batch dropped"
            );
        }
    }

    /// Batches dropped on overflow since startup.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait until everything submitted so far has been processed.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(SideEffect::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

async fn run_side_effects(
    sink: &Arc<dyn NotificationSink>,
    scan_queue: &Queue,
    tenant: &TenantId,
    project: &ProjectId,
    ids: &[LogId],
) {
    let work = async {
        // Publisher logs its own failures and never errors out.
        sink.publish(project, ids).await;

        let payload = ScanPayload {
            tenant_id: tenant.as_str().to_string(),
            project_id: project.as_str().to_string(),
            log_ids: ids.iter().map(|id| id.as_str().to_string()).collect(),
        };
        match serde_json::to_value(&payload) {
            Ok(payload) => {
                if let Err(err) =
                    scan_queue.add(SCAN_JOB_NAME, payload, JobOptions::default()).await
                {
                    tracing::warn!(tenant = %tenant, error = %err, "scan enqueue failed");
                }
            }
            Err(err) => {
                tracing::warn!(tenant = %tenant, error = %err, "scan payload serialization failed");
            }
        }
    };

    if tokio::time::timeout(SIDE_EFFECT_TIMEOUT, work).await.is_err() {
        tracing::warn!(tenant = %tenant, project = %project, "side effects timed out");
    }
}

/// The ingestion service: one validated batch in, assigned ids out.
/// Streaming and detection are eventually consistent; their failures never
/// fail the ingest.
pub struct IngestService<C: Clock> {
    writer: LogWriter<C>,
    side_effects: SideEffects,
}

impl<C: Clock> IngestService<C> {
    pub fn new(writer: LogWriter<C>, side_effects: SideEffects) -> Self {
        Self { writer, side_effects }
    }

    pub async fn ingest(
        &self,
        tenant: &TenantId,
        project: &ProjectId,
        batch: Vec<NewLogRecord>,
    ) -> Result<IngestResponse, IngestError> {
        let ids = self.writer.write_batch(tenant, project, batch).await?;
        self.side_effects.submit(tenant.clone(), project.clone(), ids.clone());
        Ok(IngestResponse { accepted: ids.len(), ids })
    }

    /// Test hook: wait for submitted side effects to finish.
    pub async fn flush_side_effects(&self) {
        self.side_effects.flush().await;
    }
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
