// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tw-queue: Durable background-job queue over two substrates.
//!
//! The [`QueueBackend`] trait is the uniform contract; [`PgBackend`] stores
//! jobs in a dedicated Postgres schema and claims with
//! `FOR UPDATE SKIP LOCKED`, [`KvBackend`] keeps them in Redis sorted sets
//! and lists. A generic polling [`Worker`] drives either backend with
//! at-least-once semantics, and the [`QueueSupervisor`] owns process-wide
//! lifecycle and instance caching.

pub mod backend;
pub mod error;
pub mod job;
pub mod kv;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod postgres;
pub mod queue;
pub mod supervisor;
pub mod worker;

pub use backend::{FailDisposition, QueueBackend};
pub use error::QueueError;
pub use job::{Job, JobId, JobOptions, QueueCounts};
pub use kv::KvBackend;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryBackend;
pub use postgres::PgBackend;
pub use queue::Queue;
pub use supervisor::{BackendKind, QueueConfig, QueueSupervisor};
pub use worker::{Processor, Worker, WorkerEvent, WorkerOptions};
