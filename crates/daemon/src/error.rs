// SPDX-License-Identifier: MIT

//! Daemon error types.

use thiserror::Error;

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DB_URL is required")]
    MissingDbUrl,

    #[error("KV_URL is required for the kv-store backend")]
    MissingKvUrl,

    #[error("unknown queue backend: {0:?}")]
    UnknownBackend(String),

    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Startup and shutdown failures of the composed daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] tw_storage::StorageError),

    #[error(transparent)]
    Queue(#[from] tw_queue::QueueError),
}
