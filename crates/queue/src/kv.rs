// SPDX-License-Identifier: MIT

//! External key-value queue over Redis list/sorted-set primitives.
//!
//! Layout per queue `q`:
//! - `twq:{q}:waiting`: sorted set of job ids, score `priority*1e13 + enqueue_ms`
//! - `twq:{q}:delayed`: sorted set of job ids scored by `run_at` millis
//! - `twq:{q}:active`: set of claimed job ids
//! - `twq:{q}:completed` / `twq:{q}:failed`: recent-history lists, pruned
//!   by count (100 / 50); job bodies expire by age (1h / 24h)
//! - `twq:{q}:job:{id}`: job JSON
//! - `twq:{q}:key:{k}`: dedupe marker holding the live job id
//!
//! Commands run through a retry wrapper that reconnects on the known
//! transient error set with exponential backoff capped at 30s.

use crate::backend::{FailDisposition, QueueBackend};
use crate::error::{is_transient_kv_error, QueueError};
use crate::job::{retry_backoff, Job, JobOptions, QueueCounts};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Completed-history retention: one hour / last 100 jobs.
const COMPLETED_TTL_SECS: u64 = 3600;
const COMPLETED_KEEP: isize = 100;

/// Failed-history retention: 24 hours / last 50 jobs.
const FAILED_TTL_SECS: u64 = 86_400;
const FAILED_KEEP: isize = 50;

/// Transient-error retry: attempts and backoff ceiling.
const MAX_COMMAND_RETRIES: u32 = 5;
const RECONNECT_CAP: Duration = Duration::from_secs(30);

/// Redis-backed queue.
pub struct KvBackend {
    manager: ConnectionManager,
    closed: AtomicBool,
}

impl KvBackend {
    /// Open one managed connection per process.
    pub async fn connect(kv_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(kv_url).map_err(QueueError::Kv)?;
        let manager = client.get_connection_manager().await.map_err(QueueError::Kv)?;
        Ok(Self { manager, closed: AtomicBool::new(false) })
    }

    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    /// Run a command closure, retrying transient failures with exponential
    /// backoff `min(1s·2^(n-1), 30s)`. Non-transient errors fail fast.
    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, QueueError>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: Future<Output = Result<T, redis::RedisError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match f(self.manager.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient_kv_error(&err) && attempt < MAX_COMMAND_RETRIES => {
                    let backoff = Duration::from_secs(1 << (attempt - 1).min(5)).min(RECONNECT_CAP);
                    tracing::warn!(
                        op,
                        attempt,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient kv error, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) if is_transient_kv_error(&err) => {
                    return Err(QueueError::KvUnavailable { attempts: attempt, source: err });
                }
                Err(err) => return Err(QueueError::Kv(err)),
            }
        }
    }

    fn waiting_key(queue: &str) -> String {
        format!("twq:{queue}:waiting")
    }

    fn delayed_key(queue: &str) -> String {
        format!("twq:{queue}:delayed")
    }

    fn active_key(queue: &str) -> String {
        format!("twq:{queue}:active")
    }

    fn history_key(queue: &str, kind: &str) -> String {
        format!("twq:{queue}:{kind}")
    }

    fn job_key(queue: &str, id: &str) -> String {
        format!("twq:{queue}:job:{id}")
    }

    fn dedupe_key(queue: &str, key: &str) -> String {
        format!("twq:{queue}:key:{key}")
    }

    /// FIFO-within-priority score for the waiting set.
    fn waiting_score(priority: i32, enqueue_ms: i64) -> f64 {
        priority as f64 * 1e13 + enqueue_ms as f64
    }

    async fn load_job(&self, queue: &str, id: &str) -> Result<Option<Job>, QueueError> {
        let key = Self::job_key(queue, id);
        let raw: Option<String> = self
            .with_retry("load_job", |mut con| {
                let key = key.clone();
                async move { con.get(&key).await }
            })
            .await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn store_job(&self, job: &Job) -> Result<(), QueueError> {
        let key = Self::job_key(&job.queue, job.id.as_str());
        let json = serde_json::to_string(job)?;
        self.with_retry("store_job", |mut con| {
            let key = key.clone();
            let json = json.clone();
            async move { con.set(&key, &json).await }
        })
        .await
    }

    /// Move due delayed jobs into the waiting set.
    async fn promote_due(&self, queue: &str) -> Result<(), QueueError> {
        let delayed = Self::delayed_key(queue);
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<String> = self
            .with_retry("promote_due", |mut con| {
                let delayed = delayed.clone();
                async move {
                    con.zrangebyscore_limit(&delayed, f64::MIN, now_ms as f64, 0, 100).await
                }
            })
            .await?;
        for id in due {
            let Some(job) = self.load_job(queue, &id).await? else {
                // Body expired while delayed; drop the orphaned member.
                let _: () = self.with_retry("promote_drop", |mut con| {
                    let delayed = delayed.clone();
                    let id = id.clone();
                    async move { con.zrem(&delayed, &id).await }
                })
                .await?;
                continue;
            };
            let waiting = Self::waiting_key(queue);
            let score = Self::waiting_score(job.priority, job.created_at.timestamp_millis());
            let _: () = self.with_retry("promote_add", |mut con| {
                let waiting = waiting.clone();
                let id = id.clone();
                async move { con.zadd(&waiting, &id, score).await }
            })
            .await?;
            let _: () = self.with_retry("promote_rem", |mut con| {
                let delayed = delayed.clone();
                let id = id.clone();
                async move { con.zrem(&delayed, &id).await }
            })
            .await?;
        }
        Ok(())
    }

    async fn record_history(
        &self,
        queue: &str,
        kind: &str,
        keep: isize,
        ttl_secs: u64,
        job: &Job,
    ) -> Result<(), QueueError> {
        let history = Self::history_key(queue, kind);
        let id = job.id.as_str().to_string();
        let _: () = self.with_retry("history_push", |mut con| {
            let history = history.clone();
            let id = id.clone();
            async move {
                let _: () = con.lpush(&history, &id).await?;
                con.ltrim(&history, 0, keep - 1).await
            }
        })
        .await?;

        let job_key = Self::job_key(queue, job.id.as_str());
        self.with_retry("history_expire", |mut con| {
            let job_key = job_key.clone();
            async move { con.expire(&job_key, ttl_secs as i64).await }
        })
        .await
    }

    async fn clear_dedupe(&self, job: &Job) -> Result<(), QueueError> {
        if let Some(key) = &job.key {
            let marker = Self::dedupe_key(&job.queue, key);
            let _: () = self.with_retry("dedupe_clear", |mut con| {
                let marker = marker.clone();
                async move { con.del(&marker).await }
            })
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl QueueBackend for KvBackend {
    async fn enqueue(
        &self,
        queue: &str,
        name: &str,
        payload: Value,
        opts: JobOptions,
    ) -> Result<Job, QueueError> {
        self.ensure_open()?;
        let job = Job::new(queue, name, payload, &opts, Utc::now());

        if let Some(key) = &job.key {
            let marker = Self::dedupe_key(queue, key);
            let id = job.id.as_str().to_string();
            let claimed: bool = self
                .with_retry("dedupe_set", |mut con| {
                    let marker = marker.clone();
                    let id = id.clone();
                    async move { con.set_nx(&marker, &id).await }
                })
                .await?;
            if !claimed {
                let holder: Option<String> = self
                    .with_retry("dedupe_get", |mut con| {
                        let marker = marker.clone();
                        async move { con.get(&marker).await }
                    })
                    .await?;
                if let Some(existing_id) = holder {
                    if let Some(existing) = self.load_job(queue, &existing_id).await? {
                        tracing::debug!(queue, key = %key, job_id = %existing.id, "enqueue deduplicated");
                        return Ok(existing);
                    }
                }
                // Stale marker with no job body: replace it and fall through.
                let _: () = self.with_retry("dedupe_replace", |mut con| {
                    let marker = marker.clone();
                    let id = id.clone();
                    async move { con.set(&marker, &id).await }
                })
                .await?;
            }
        }

        self.store_job(&job).await?;

        let now_ms = Utc::now().timestamp_millis();
        if job.run_at.timestamp_millis() > now_ms {
            let delayed = Self::delayed_key(queue);
            let id = job.id.as_str().to_string();
            let score = job.run_at.timestamp_millis() as f64;
            let _: () = self.with_retry("enqueue_delayed", |mut con| {
                let delayed = delayed.clone();
                let id = id.clone();
                async move { con.zadd(&delayed, &id, score).await }
            })
            .await?;
        } else {
            let waiting = Self::waiting_key(queue);
            let id = job.id.as_str().to_string();
            let score = Self::waiting_score(job.priority, job.created_at.timestamp_millis());
            let _: () = self.with_retry("enqueue_waiting", |mut con| {
                let waiting = waiting.clone();
                let id = id.clone();
                async move { con.zadd(&waiting, &id, score).await }
            })
            .await?;
        }

        tracing::debug!(queue, job_id = %job.id, name = %job.name, "job enqueued");
        Ok(job)
    }

    async fn claim(&self, queue: &str) -> Result<Option<Job>, QueueError> {
        self.ensure_open()?;
        self.promote_due(queue).await?;

        let waiting = Self::waiting_key(queue);
        let popped: Vec<(String, f64)> = self
            .with_retry("claim_pop", |mut con| {
                let waiting = waiting.clone();
                async move { con.zpopmin(&waiting, 1).await }
            })
            .await?;
        let Some((id, _score)) = popped.into_iter().next() else {
            return Ok(None);
        };

        let Some(job) = self.load_job(queue, &id).await? else {
            tracing::warn!(queue, job_id = %id, "claimed id has no job body, skipping");
            return Ok(None);
        };

        let active = Self::active_key(queue);
        let _: () = self.with_retry("claim_active", |mut con| {
            let active = active.clone();
            let id = id.clone();
            async move { con.sadd(&active, &id).await }
        })
        .await?;
        Ok(Some(job))
    }

    async fn complete(&self, queue: &str, job: &Job) -> Result<(), QueueError> {
        self.ensure_open()?;
        let active = Self::active_key(queue);
        let id = job.id.as_str().to_string();
        let _: () = self.with_retry("complete_srem", |mut con| {
            let active = active.clone();
            let id = id.clone();
            async move { con.srem(&active, &id).await }
        })
        .await?;
        self.clear_dedupe(job).await?;
        self.record_history(queue, "completed", COMPLETED_KEEP, COMPLETED_TTL_SECS, job).await
    }

    async fn fail(&self, queue: &str, job: &Job, error: &str) -> Result<FailDisposition, QueueError> {
        self.ensure_open()?;
        let active = Self::active_key(queue);
        let id = job.id.as_str().to_string();
        let _: () = self.with_retry("fail_srem", |mut con| {
            let active = active.clone();
            let id = id.clone();
            async move { con.srem(&active, &id).await }
        })
        .await?;

        let mut updated = job.clone();
        updated.attempts = job.attempts + 1;

        if updated.attempts >= updated.max_attempts {
            self.store_job(&updated).await?;
            self.clear_dedupe(job).await?;
            self.record_history(queue, "failed", FAILED_KEEP, FAILED_TTL_SECS, &updated).await?;
            tracing::warn!(queue, job_id = %job.id, attempts = updated.attempts, error, "job exhausted attempts");
            return Ok(FailDisposition::Exhausted);
        }

        let backoff = retry_backoff(updated.attempts);
        let run_at = Utc::now()
            + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::seconds(2));
        updated.run_at = run_at;
        self.store_job(&updated).await?;

        let delayed = Self::delayed_key(queue);
        let score = run_at.timestamp_millis() as f64;
        let _: () = self.with_retry("fail_delay", |mut con| {
            let delayed = delayed.clone();
            let id = id.clone();
            async move { con.zadd(&delayed, &id, score).await }
        })
        .await?;
        tracing::debug!(queue, job_id = %job.id, attempts = updated.attempts, %run_at, "job scheduled for retry");
        Ok(FailDisposition::Retried { run_at })
    }

    async fn counts(&self, queue: &str) -> Result<QueueCounts, QueueError> {
        self.ensure_open()?;
        let waiting_key = Self::waiting_key(queue);
        let delayed_key = Self::delayed_key(queue);
        let active_key = Self::active_key(queue);
        let completed_key = Self::history_key(queue, "completed");
        let failed_key = Self::history_key(queue, "failed");
        let now_ms = Utc::now().timestamp_millis();

        let (waiting, due, active, completed, failed): (u64, u64, u64, u64, u64) = self
            .with_retry("counts", |mut con| {
                let waiting_key = waiting_key.clone();
                let delayed_key = delayed_key.clone();
                let active_key = active_key.clone();
                let completed_key = completed_key.clone();
                let failed_key = failed_key.clone();
                async move {
                    let waiting: u64 = con.zcard(&waiting_key).await?;
                    let due: u64 = con.zcount(&delayed_key, f64::MIN, now_ms as f64).await?;
                    let active: u64 = con.scard(&active_key).await?;
                    let completed: u64 = con.llen(&completed_key).await?;
                    let failed: u64 = con.llen(&failed_key).await?;
                    Ok((waiting, due, active, completed, failed))
                }
            })
            .await?;

        Ok(QueueCounts { waiting: waiting + due, active, completed, failed })
    }

    async fn close(&self) -> Result<(), QueueError> {
        // ConnectionManager has no explicit close; dropping the last clone
        // tears the connection down. Mark closed so later calls fail fast.
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
