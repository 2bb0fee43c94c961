// SPDX-License-Identifier: MIT

//! Daemon configuration: optional TOML file with environment overrides.

use crate::env;
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tw_queue::{BackendKind, QueueConfig};
use tw_stream::ListenerConfig;

/// Resolved daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// `in-db` or `kv-store`.
    pub queue_backend: String,
    pub db_url: Option<String>,
    pub kv_url: Option<String>,
    pub worker_concurrency: usize,
    pub poll_interval_ms: u64,
    pub listener_max_reconnect_attempts: u32,
    /// Optional log file; stdout only when unset.
    pub log_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_backend: "in-db".to_string(),
            db_url: None,
            kv_url: None,
            worker_concurrency: 5,
            poll_interval_ms: 1000,
            listener_max_reconnect_attempts: 10,
            log_file: None,
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Environment-only construction.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    fn apply_env(&mut self) {
        if let Some(backend) = env::queue_backend() {
            self.queue_backend = backend;
        }
        if let Some(db_url) = env::db_url() {
            self.db_url = Some(db_url);
        }
        if let Some(kv_url) = env::kv_url() {
            self.kv_url = Some(kv_url);
        }
        if let Some(concurrency) = env::worker_concurrency() {
            self.worker_concurrency = concurrency;
        }
        if let Some(interval) = env::poll_interval() {
            self.poll_interval_ms = interval.as_millis() as u64;
        }
        if let Some(attempts) = env::listener_max_reconnect_attempts() {
            self.listener_max_reconnect_attempts = attempts;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let backend = self.backend_kind()?;
        if self.db_url.is_none() {
            return Err(ConfigError::MissingDbUrl);
        }
        if backend == BackendKind::KvStore && self.kv_url.is_none() {
            return Err(ConfigError::MissingKvUrl);
        }
        Ok(())
    }

    pub fn backend_kind(&self) -> Result<BackendKind, ConfigError> {
        self.queue_backend
            .parse()
            .map_err(|_| ConfigError::UnknownBackend(self.queue_backend.clone()))
    }

    /// The database URL. Only valid after `load`/`from_env` succeeded.
    pub fn db_url(&self) -> &str {
        self.db_url.as_deref().unwrap_or_default()
    }

    pub fn queue_config(&self) -> Result<QueueConfig, ConfigError> {
        Ok(QueueConfig {
            backend: self.backend_kind()?,
            db_url: self.db_url().to_string(),
            kv_url: self.kv_url.clone(),
            worker_concurrency: self.worker_concurrency,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        })
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            max_reconnect_attempts: self.listener_max_reconnect_attempts,
            ..ListenerConfig::default()
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
