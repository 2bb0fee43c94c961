// SPDX-License-Identifier: MIT

//! Wire format of the `logs_new` channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel carrying new-log notifications.
pub const CHANNEL: &str = "logs_new";

/// Budget kept under the store's ~8KB notify payload cap.
pub const MAX_PAYLOAD_BYTES: usize = 7900;

/// Estimated serialized size of one log id, including JSON overhead.
pub const EST_BYTES_PER_ID: usize = 40;

/// Ids per chunk derived from the payload budget.
pub const MAX_LOG_IDS_PER_CHUNK: usize = MAX_PAYLOAD_BYTES / EST_BYTES_PER_ID;

/// Payload of one `logs_new` message.
///
/// UTF-8 JSON: `{"projectId": ..., "logIds": [...], "timestamp": ISO-8601}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogNotification {
    pub project_id: String,
    pub log_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Split a batch of ids into contiguous chunks that each fit the payload
/// budget. Order is preserved across chunks.
pub fn chunk_ids<T: Clone>(ids: &[T]) -> Vec<Vec<T>> {
    ids.chunks(MAX_LOG_IDS_PER_CHUNK).map(<[T]>::to_vec).collect()
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
