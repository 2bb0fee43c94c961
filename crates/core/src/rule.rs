// SPDX-License-Identifier: MIT

//! Detection rules: logsource selector plus a named-selection expression.

use crate::severity::Severity;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a rule. Deprecated and unsupported rules are loaded
/// but never evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Experimental,
    Test,
    Stable,
    Deprecated,
    Unsupported,
}

impl RuleStatus {
    /// Whether a rule with this status participates in evaluation.
    pub fn is_evaluable(&self) -> bool {
        !matches!(self, RuleStatus::Deprecated | RuleStatus::Unsupported)
    }
}

/// Coarse pre-filter applied before the detection expression.
///
/// A log matches iff every provided field equals the log's corresponding
/// attribute; missing fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl LogSource {
    pub fn service(service: impl Into<String>) -> Self {
        Self { service: Some(service.into()), ..Self::default() }
    }

    pub fn category(category: impl Into<String>) -> Self {
        Self { category: Some(category.into()), ..Self::default() }
    }

    pub fn is_wildcard(&self) -> bool {
        self.product.is_none() && self.service.is_none() && self.category.is_none()
    }
}

/// One named selection: a conjunction of field predicates.
///
/// Keys are field names, optionally carrying a `|contains`, `|startswith`
/// or `|endswith` modifier. Values are scalars (equality) or lists
/// (any-match). Declaration order is preserved.
pub type Selection = IndexMap<String, Value>;

/// The detection expression of a rule: named selections plus a textual
/// condition combining them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub selections: IndexMap<String, Selection>,
    pub condition: String,
}

impl Detection {
    /// Single-selection detection with the canonical `selection` name.
    pub fn single(selection: Selection) -> Self {
        let mut selections = IndexMap::new();
        selections.insert("selection".to_string(), selection);
        Self { selections, condition: "selection".to_string() }
    }
}

/// A pattern-based detection rule. Immutable; versioned by pack version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRule {
    /// Stable string id, unique within the catalog.
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub logsource: LogSource,
    pub detection: Detection,
    pub severity: Severity,
    pub status: RuleStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

impl DetectionRule {
    /// The rule family used as the incident correlation key component.
    pub fn family(&self) -> &str {
        rule_family(&self.id)
    }
}

/// Strip a trailing all-numeric `-N` instance suffix from a rule id.
///
/// `failed-login-attempts-2` → `failed-login-attempts`;
/// `critical-errors` is returned unchanged.
pub fn rule_family(rule_id: &str) -> &str {
    match rule_id.rsplit_once('-') {
        Some((family, suffix))
            if !family.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            family
        }
        _ => rule_id,
    }
}

#[cfg(test)]
#[path = "rule_tests.rs"]
mod tests;
