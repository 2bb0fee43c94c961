// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tw-stream: live fan-out of newly ingested logs.
//!
//! The publisher emits chunked `pg_notify` messages on the `logs_new`
//! channel after each committed batch; the listener holds the process's
//! one `LISTEN` connection and survives reconnects without losing
//! subscribers; the registry routes notifications to per-connection
//! subscribers by project.

pub mod listener;
pub mod message;
pub mod publisher;
pub mod registry;

pub use listener::{
    reconnect_backoff, ListenerConfig, ListenerEvent, ListenerState, ListenerStatus,
    NotifyListener,
};
pub use message::{
    chunk_ids, LogNotification, CHANNEL, EST_BYTES_PER_ID, MAX_LOG_IDS_PER_CHUNK,
    MAX_PAYLOAD_BYTES,
};
pub use publisher::{NotificationPublisher, NotificationSink};
#[cfg(any(test, feature = "test-support"))]
pub use publisher::RecordingSink;
pub use registry::{
    Subscriber, SubscriberCallback, SubscriberFilter, SubscriberId, SubscriberRegistry,
    Unsubscribe,
};
