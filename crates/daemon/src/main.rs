// SPDX-License-Identifier: MIT

//! twd: the Tidewatch daemon binary.

use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tw_daemon::{Config, Context};

#[tokio::main]
async fn main() -> ExitCode {
    let config_path: Option<PathBuf> = std::env::args().nth(1).map(PathBuf::from);
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("twd: {err}");
            return ExitCode::FAILURE;
        }
    };

    // Log to the configured file when set, stdout otherwise.
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _guard = match &config.log_file {
        Some(path) => {
            let path = PathBuf::from(path);
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("twd.log"));
            let appender = tracing_appender::rolling::never(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter()).with_writer(writer).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter()).init();
            None
        }
    };

    let context = match Context::start(&config).await {
        Ok(context) => context,
        Err(err) => {
            tracing::error!(error = %err, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    wait_for_shutdown_signal().await;
    context.shutdown().await;
    ExitCode::SUCCESS
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT"),
            _ = term.recv() => tracing::info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received ctrl-c");
    }
}
