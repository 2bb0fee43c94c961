// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tw-daemon: composition root and ingestion surface for Tidewatch.

pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod ingest;
pub mod packs;
pub mod scan;

pub use config::Config;
pub use context::Context;
pub use error::{ConfigError, DaemonError};
pub use ingest::{IngestError, IngestResponse, IngestService, SideEffects};
pub use packs::{EnableOptions, PackError, PackService, PackStatus};
pub use scan::{ScanPayload, ScanProcessor, SCAN_JOB_NAME, SCAN_QUEUE};
