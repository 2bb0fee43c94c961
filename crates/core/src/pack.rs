// SPDX-License-Identifier: MIT

//! Detection packs: static bundles of rules shipped with the binary.

use crate::rule::DetectionRule;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad grouping used for catalog presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackCategory {
    Reliability,
    Security,
    Database,
    Business,
}

impl fmt::Display for PackCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PackCategory::Reliability => "reliability",
            PackCategory::Security => "security",
            PackCategory::Database => "database",
            PackCategory::Business => "business",
        };
        write!(f, "{s}")
    }
}

/// A named bundle of detection rules, activatable per tenant.
///
/// The rule sequence is ordered; evaluation and event emission follow
/// declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionPack {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: PackCategory,
    pub icon: String,
    pub author: String,
    pub version: String,
    pub rules: Vec<DetectionRule>,
}

impl DetectionPack {
    pub fn rule(&self, rule_id: &str) -> Option<&DetectionRule> {
        self.rules.iter().find(|r| r.id == rule_id)
    }
}
