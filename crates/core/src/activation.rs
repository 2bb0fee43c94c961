// SPDX-License-Identifier: MIT

//! Per-tenant pack activation state with per-rule threshold overrides.

use crate::id::TenantId;
use crate::rule::DetectionRule;
use crate::severity::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-rule threshold override carried by an activation.
///
/// Overrides only relabel severity or gate downstream notifiers; they never
/// broaden a rule's audience. `email_enabled`/`webhook_enabled` do not
/// suppress detection events, only the notifiers outside the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_enabled: Option<bool>,
}

/// Activation state of one pack for one tenant. Exactly one per
/// (tenant, pack).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackActivation {
    pub tenant_id: TenantId,
    pub pack_id: String,
    pub enabled: bool,
    /// Rule id → override.
    #[serde(default)]
    pub thresholds: HashMap<String, RuleOverride>,
    #[serde(default)]
    pub email_recipients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub activated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PackActivation {
    pub fn new(tenant_id: TenantId, pack_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            pack_id: pack_id.into(),
            enabled: true,
            thresholds: HashMap::new(),
            email_recipients: Vec::new(),
            webhook_url: None,
            activated_at: now,
            updated_at: now,
        }
    }

    /// Severity a match of `rule` carries under this activation:
    /// the override level when present, the rule's own level otherwise.
    pub fn effective_severity(&self, rule: &DetectionRule) -> Severity {
        self.thresholds
            .get(&rule.id)
            .and_then(|o| o.level)
            .unwrap_or(rule.severity)
    }
}

#[cfg(test)]
#[path = "activation_tests.rs"]
mod tests;
