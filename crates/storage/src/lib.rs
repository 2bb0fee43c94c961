// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tw-storage: Postgres persistence for logs, activations, detection
//! events, and incidents.
//!
//! Each store is a trait with a Postgres implementation; in-memory
//! implementations live behind the `test-support` feature so the pipeline
//! can be exercised without a database.

pub mod activations;
pub mod detections;
pub mod error;
pub mod incidents;
pub mod logs;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod pool;

pub use activations::{ActivationStore, PgActivationStore};
pub use detections::{DetectionStore, PgDetectionStore};
pub use error::StorageError;
pub use incidents::{IncidentStore, PgIncidentStore};
pub use logs::{LogStore, LogWriter, PgLogStore};
#[cfg(any(test, feature = "test-support"))]
pub use memory::{
    MemoryActivationStore, MemoryDetectionStore, MemoryIncidentStore, MemoryLogStore,
};
pub use pool::{connect_pool, ensure_schema};
