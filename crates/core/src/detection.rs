// SPDX-License-Identifier: MIT

//! Detection events: one rule-match occurrence tied to one log record.

use crate::id::{ProjectId, TenantId};
use crate::log::LogId;
use crate::severity::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a detection event.
    pub struct DetectionEventId("det-");
}

/// Maximum characters kept from the matched log message.
pub const EXCERPT_MAX_CHARS: usize = 200;

/// First `EXCERPT_MAX_CHARS` characters of a message, on a char boundary.
pub fn excerpt(message: &str) -> String {
    message.chars().take(EXCERPT_MAX_CHARS).collect()
}

/// Append-only record of a single rule match.
///
/// Always references a log record in the same tenant and project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub id: DetectionEventId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    /// Rule id as activated (may carry an instance suffix).
    pub rule_id: String,
    pub pack_id: String,
    pub log_id: LogId,
    /// Severity after applying any activation override.
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    /// Excerpt of the matched log message.
    pub excerpt: String,
}
