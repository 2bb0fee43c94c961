// SPDX-License-Identifier: MIT

//! Post-commit channel publisher.
//!
//! Streaming is best-effort: every failure here is logged and swallowed so
//! ingestion latency and outcome are never affected.

use crate::message::{chunk_ids, LogNotification, CHANNEL};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use tw_core::{LogId, ProjectId};

/// Sink for new-log notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Publish the assigned ids of one committed batch. Never fails:
    /// errors are logged by the implementation.
    async fn publish(&self, project: &ProjectId, ids: &[LogId]);
}

/// Publishes chunked messages on the `logs_new` channel via `pg_notify`.
pub struct NotificationPublisher {
    pool: PgPool,
}

impl NotificationPublisher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for NotificationPublisher {
    async fn publish(&self, project: &ProjectId, ids: &[LogId]) {
        if ids.is_empty() {
            return;
        }
        let id_strings: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let chunks = chunk_ids(&id_strings);
        let chunk_count = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let notification = LogNotification {
                project_id: project.as_str().to_string(),
                log_ids: chunk,
                timestamp: Utc::now(),
            };
            let payload = match serde_json::to_string(&notification) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!(project = %project, error = %err, "notification serialization failed");
                    return;
                }
            };

            let sent = sqlx::query("SELECT pg_notify($1, $2)")
                .bind(CHANNEL)
                .bind(&payload)
                .execute(&self.pool)
                .await;
            if let Err(err) = sent {
                tracing::warn!(
                    project = %project,
                    chunk = index + 1,
                    chunks = chunk_count,
                    error = %err,
                    "notify publish failed"
                );
                // Remaining chunks would arrive out of order; stop here.
                return;
            }
        }
        tracing::debug!(project = %project, ids = ids.len(), chunks = chunk_count, "notifications published");
    }
}

/// Recording sink for tests.
#[cfg(any(test, feature = "test-support"))]
pub struct RecordingSink {
    published: parking_lot::Mutex<Vec<LogNotification>>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingSink {
    pub fn new() -> Self {
        Self { published: parking_lot::Mutex::new(Vec::new()) }
    }

    pub fn published(&self) -> Vec<LogNotification> {
        self.published.lock().clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl NotificationSink for RecordingSink {
    async fn publish(&self, project: &ProjectId, ids: &[LogId]) {
        let id_strings: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        for chunk in chunk_ids(&id_strings) {
            self.published.lock().push(LogNotification {
                project_id: project.as_str().to_string(),
                log_ids: chunk,
                timestamp: Utc::now(),
            });
        }
    }
}
