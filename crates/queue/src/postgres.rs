// SPDX-License-Identifier: MIT

//! In-database queue backed by a jobs table in a dedicated schema.
//!
//! Enqueue is an insert; claiming is a `FOR UPDATE SKIP LOCKED` pick of the
//! next runnable row ordered by `(priority, run_at)`. Completion deletes
//! the row, failure clears the lock and pushes `run_at` by exponential
//! backoff. Terminally failed rows are kept (with their dedupe key cleared)
//! so operators can inspect them; they are excluded from claiming.

use crate::backend::{FailDisposition, QueueBackend};
use crate::error::QueueError;
use crate::job::{retry_backoff, Job, JobId, JobOptions, QueueCounts};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::sync::atomic::{AtomicBool, Ordering};

/// Connection-pool size reserved for queue traffic.
const DEFAULT_POOL_SIZE: u32 = 10;

const SCHEMA_DDL: &str = r#"
CREATE SCHEMA IF NOT EXISTS tw_queue;
CREATE TABLE IF NOT EXISTS tw_queue.jobs (
    id           TEXT PRIMARY KEY,
    queue        TEXT NOT NULL,
    name         TEXT NOT NULL,
    payload      JSONB NOT NULL,
    priority     INTEGER NOT NULL DEFAULT 0,
    run_at       TIMESTAMPTZ NOT NULL,
    attempts     INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL DEFAULT 3,
    locked_at    TIMESTAMPTZ,
    key          TEXT,
    last_error   TEXT,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS jobs_claim_idx
    ON tw_queue.jobs (queue, priority, run_at)
    WHERE locked_at IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS jobs_live_key_idx
    ON tw_queue.jobs (queue, key)
    WHERE key IS NOT NULL AND attempts < max_attempts;
"#;

/// Postgres-backed queue.
pub struct PgBackend {
    pool: PgPool,
    closed: AtomicBool,
}

impl PgBackend {
    /// Connect a dedicated pool and bootstrap the queue schema.
    pub async fn connect(db_url: &str) -> Result<Self, QueueError> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_POOL_SIZE)
            .connect(db_url)
            .await?;
        Self::with_pool(pool).await
    }

    /// Use an existing pool (shared with other components in tests).
    pub async fn with_pool(pool: PgPool) -> Result<Self, QueueError> {
        let mut tx = pool.begin().await?;
        for statement in SCHEMA_DDL.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(Self { pool, closed: AtomicBool::new(false) })
    }

    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    fn job_from_row(row: &PgRow) -> Result<Job, QueueError> {
        Ok(Job {
            id: JobId::from_string(row.try_get::<String, _>("id")?),
            queue: row.try_get("queue")?,
            name: row.try_get("name")?,
            payload: row.try_get::<Value, _>("payload")?,
            priority: row.try_get::<i32, _>("priority")?,
            run_at: row.try_get::<DateTime<Utc>, _>("run_at")?,
            attempts: row.try_get::<i32, _>("attempts")?.max(0) as u32,
            max_attempts: row.try_get::<i32, _>("max_attempts")?.max(1) as u32,
            key: row.try_get::<Option<String>, _>("key")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    async fn find_live_by_key(&self, queue: &str, key: &str) -> Result<Option<Job>, QueueError> {
        let row = sqlx::query(
            r#"
            SELECT id, queue, name, payload, priority, run_at, attempts, max_attempts, key, created_at
            FROM tw_queue.jobs
            WHERE queue = $1 AND key = $2 AND attempts < max_attempts
            LIMIT 1
            "#,
        )
        .bind(queue)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::job_from_row).transpose()
    }
}

#[async_trait]
impl QueueBackend for PgBackend {
    async fn enqueue(
        &self,
        queue: &str,
        name: &str,
        payload: Value,
        opts: JobOptions,
    ) -> Result<Job, QueueError> {
        self.ensure_open()?;
        let job = Job::new(queue, name, payload, &opts, Utc::now());

        let inserted = sqlx::query(
            r#"
            INSERT INTO tw_queue.jobs
                (id, queue, name, payload, priority, run_at, attempts, max_attempts, key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, $9)
            ON CONFLICT (queue, key) WHERE key IS NOT NULL AND attempts < max_attempts
                DO NOTHING
            "#,
        )
        .bind(job.id.as_str())
        .bind(&job.queue)
        .bind(&job.name)
        .bind(&job.payload)
        .bind(job.priority)
        .bind(job.run_at)
        .bind(job.max_attempts as i32)
        .bind(&job.key)
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            // Dedupe hit: hand back the live job holding the key.
            if let Some(key) = &job.key {
                if let Some(existing) = self.find_live_by_key(queue, key).await? {
                    tracing::debug!(queue, key, job_id = %existing.id, "enqueue deduplicated");
                    return Ok(existing);
                }
            }
            // The holder vanished between insert and lookup; try again.
            return self.enqueue(queue, name, job.payload, opts).await;
        }

        tracing::debug!(queue, job_id = %job.id, name = %job.name, "job enqueued");
        Ok(job)
    }

    async fn claim(&self, queue: &str) -> Result<Option<Job>, QueueError> {
        self.ensure_open()?;
        let row = sqlx::query(
            r#"
            WITH next AS (
                SELECT id FROM tw_queue.jobs
                WHERE queue = $1
                  AND locked_at IS NULL
                  AND run_at <= now()
                  AND attempts < max_attempts
                ORDER BY priority ASC, run_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE tw_queue.jobs j
            SET locked_at = now()
            FROM next
            WHERE j.id = next.id
            RETURNING j.id, j.queue, j.name, j.payload, j.priority, j.run_at,
                      j.attempts, j.max_attempts, j.key, j.created_at
            "#,
        )
        .bind(queue)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::job_from_row).transpose()
    }

    async fn complete(&self, _queue: &str, job: &Job) -> Result<(), QueueError> {
        self.ensure_open()?;
        sqlx::query("DELETE FROM tw_queue.jobs WHERE id = $1")
            .bind(job.id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail(&self, queue: &str, job: &Job, error: &str) -> Result<FailDisposition, QueueError> {
        self.ensure_open()?;
        let attempts_after = job.attempts + 1;

        if attempts_after >= job.max_attempts {
            // Terminal: keep the row for inspection, release the dedupe key.
            sqlx::query(
                r#"
                UPDATE tw_queue.jobs
                SET locked_at = NULL, attempts = $2, key = NULL, last_error = $3
                WHERE id = $1
                "#,
            )
            .bind(job.id.as_str())
            .bind(attempts_after as i32)
            .bind(error)
            .execute(&self.pool)
            .await?;
            tracing::warn!(queue, job_id = %job.id, attempts = attempts_after, error, "job exhausted attempts");
            return Ok(FailDisposition::Exhausted);
        }

        let backoff = retry_backoff(attempts_after);
        let run_at = Utc::now()
            + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::seconds(2));
        sqlx::query(
            r#"
            UPDATE tw_queue.jobs
            SET locked_at = NULL, attempts = $2, run_at = $3, last_error = $4
            WHERE id = $1
            "#,
        )
        .bind(job.id.as_str())
        .bind(attempts_after as i32)
        .bind(run_at)
        .bind(error)
        .execute(&self.pool)
        .await?;
        tracing::debug!(queue, job_id = %job.id, attempts = attempts_after, %run_at, "job scheduled for retry");
        Ok(FailDisposition::Retried { run_at })
    }

    async fn counts(&self, queue: &str) -> Result<QueueCounts, QueueError> {
        self.ensure_open()?;
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE locked_at IS NULL AND run_at <= now()
                                   AND attempts < max_attempts) AS waiting,
                COUNT(*) FILTER (WHERE locked_at IS NOT NULL) AS active,
                COUNT(*) FILTER (WHERE attempts >= max_attempts) AS failed
            FROM tw_queue.jobs
            WHERE queue = $1
            "#,
        )
        .bind(queue)
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueCounts {
            waiting: row.try_get::<i64, _>("waiting")?.max(0) as u64,
            active: row.try_get::<i64, _>("active")?.max(0) as u64,
            // Completed rows are deleted; no counter is maintained.
            completed: 0,
            failed: row.try_get::<i64, _>("failed")?.max(0) as u64,
        })
    }

    async fn close(&self) -> Result<(), QueueError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.pool.close().await;
        }
        Ok(())
    }
}
