// SPDX-License-Identifier: MIT

//! Queue error types.

use thiserror::Error;

/// Errors surfaced by queue backends and the supervisor.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("kv store error: {0}")]
    Kv(#[from] redis::RedisError),

    #[error("kv store unavailable after {attempts} attempts: {source}")]
    KvUnavailable {
        attempts: u32,
        source: redis::RedisError,
    },

    #[error("job payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("kv-store backend selected but no kv url configured")]
    MissingKvUrl,

    #[error("queue backend is closed")]
    Closed,
}

/// Whether a KV-store error is worth a reconnect attempt.
///
/// Matches the known-transient set: connection refused/reset/dropped,
/// timeouts, and writes rejected by a read-only replica during failover.
pub fn is_transient_kv_error(err: &redis::RedisError) -> bool {
    if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
        return true;
    }
    matches!(
        err.kind(),
        redis::ErrorKind::ReadOnly | redis::ErrorKind::TryAgain | redis::ErrorKind::MasterDown
    )
}
