// SPDX-License-Identifier: MIT

use super::*;
use serial_test::serial;
use std::io::Write;

fn clear_env() {
    for key in [
        "QUEUE_BACKEND",
        "DB_URL",
        "KV_URL",
        "WORKER_CONCURRENCY",
        "POLL_INTERVAL_MS",
        "LISTENER_MAX_RECONNECT_ATTEMPTS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn db_url_is_required() {
    clear_env();
    assert!(matches!(Config::from_env(), Err(ConfigError::MissingDbUrl)));
}

#[test]
#[serial]
fn env_only_defaults() {
    clear_env();
    std::env::set_var("DB_URL", "postgres://localhost/tidewatch");
    let config = Config::from_env().unwrap();
    assert_eq!(config.backend_kind().unwrap(), BackendKind::InDb);
    assert_eq!(config.worker_concurrency, 5);
    assert_eq!(config.poll_interval_ms, 1000);
    assert_eq!(config.listener_max_reconnect_attempts, 10);
    clear_env();
}

#[test]
#[serial]
fn kv_backend_requires_kv_url() {
    clear_env();
    std::env::set_var("DB_URL", "postgres://localhost/tidewatch");
    std::env::set_var("QUEUE_BACKEND", "kv-store");
    assert!(matches!(Config::from_env(), Err(ConfigError::MissingKvUrl)));

    std::env::set_var("KV_URL", "redis://localhost:6379");
    let config = Config::from_env().unwrap();
    assert_eq!(config.backend_kind().unwrap(), BackendKind::KvStore);
    let queue = config.queue_config().unwrap();
    assert_eq!(queue.kv_url.as_deref(), Some("redis://localhost:6379"));
    clear_env();
}

#[test]
#[serial]
fn unknown_backend_is_rejected() {
    clear_env();
    std::env::set_var("DB_URL", "postgres://localhost/tidewatch");
    std::env::set_var("QUEUE_BACKEND", "rabbit");
    assert!(matches!(Config::from_env(), Err(ConfigError::UnknownBackend(_))));
    clear_env();
}

#[test]
#[serial]
fn file_values_are_overridden_by_env() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
db_url = "postgres://file-host/tidewatch"
worker_concurrency = 2
poll_interval_ms = 250
"#
    )
    .unwrap();

    std::env::set_var("WORKER_CONCURRENCY", "9");
    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.db_url(), "postgres://file-host/tidewatch");
    assert_eq!(config.worker_concurrency, 9, "env wins over file");
    assert_eq!(config.poll_interval_ms, 250, "file wins over default");
    clear_env();
}

#[test]
#[serial]
fn unknown_file_keys_are_rejected() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "db_url = \"postgres://x/y\"\nmystery_knob = 4").unwrap();
    assert!(matches!(Config::load(Some(file.path())), Err(ConfigError::Parse { .. })));
    clear_env();
}

#[test]
#[serial]
fn listener_config_carries_the_attempt_budget() {
    clear_env();
    std::env::set_var("DB_URL", "postgres://localhost/tidewatch");
    std::env::set_var("LISTENER_MAX_RECONNECT_ATTEMPTS", "4");
    let config = Config::from_env().unwrap();
    assert_eq!(config.listener_config().max_reconnect_attempts, 4);
    assert_eq!(config.listener_config().channel, "logs_new");
    clear_env();
}
