// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the daemon crate.

use std::time::Duration;

/// `QUEUE_BACKEND`: `in-db` (default) or `kv-store`.
pub fn queue_backend() -> Option<String> {
    std::env::var("QUEUE_BACKEND").ok().filter(|s| !s.is_empty())
}

/// `DB_URL`: the primary Postgres store. Required.
pub fn db_url() -> Option<String> {
    std::env::var("DB_URL").ok().filter(|s| !s.is_empty())
}

/// `KV_URL`: the Redis store, required when the kv-store backend is chosen.
pub fn kv_url() -> Option<String> {
    std::env::var("KV_URL").ok().filter(|s| !s.is_empty())
}

/// `WORKER_CONCURRENCY` (default 5).
pub fn worker_concurrency() -> Option<usize> {
    std::env::var("WORKER_CONCURRENCY").ok().and_then(|s| s.parse().ok())
}

/// `POLL_INTERVAL_MS` (default 1000).
pub fn poll_interval() -> Option<Duration> {
    std::env::var("POLL_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// `LISTENER_MAX_RECONNECT_ATTEMPTS` (default 10).
pub fn listener_max_reconnect_attempts() -> Option<u32> {
    std::env::var("LISTENER_MAX_RECONNECT_ATTEMPTS").ok().and_then(|s| s.parse().ok())
}
