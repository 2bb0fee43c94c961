// SPDX-License-Identifier: MIT

//! Incidents: groupings of related detection events with a lifecycle.

use crate::detection::DetectionEvent;
use crate::id::{ProjectId, TenantId};
use crate::severity::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

crate::define_id! {
    /// Unique identifier for an incident.
    pub struct IncidentId("inc-");
}

/// Incident lifecycle: `open → investigating → resolved | false_positive`.
/// Terminal states are never reopened by new events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Investigating,
    Resolved,
    FalsePositive,
}

impl IncidentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IncidentStatus::Resolved | IncidentStatus::FalsePositive)
    }

    /// Whether the state machine admits `self → next`.
    pub fn can_transition_to(&self, next: IncidentStatus) -> bool {
        match (self, next) {
            (IncidentStatus::Open, IncidentStatus::Investigating) => true,
            (IncidentStatus::Open, IncidentStatus::Resolved) => true,
            (IncidentStatus::Open, IncidentStatus::FalsePositive) => true,
            (IncidentStatus::Investigating, IncidentStatus::Resolved) => true,
            (IncidentStatus::Investigating, IncidentStatus::FalsePositive) => true,
            _ => false,
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Investigating => "investigating",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::FalsePositive => "false_positive",
        };
        write!(f, "{s}")
    }
}

/// Rejected incident state transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid incident transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: IncidentStatus,
    pub to: IncidentStatus,
}

/// A grouping of detection events sharing a correlation key.
///
/// `detection_count` always equals the number of detection events linked to
/// this incident; `severity` is the max of contributing event severities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    /// Rule id with any instance suffix stripped.
    pub rule_family: String,
    pub status: IncidentStatus,
    pub severity: Severity,
    pub detection_count: u32,
    pub affected_services: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Incident {
    /// Open a fresh incident for `event`, seeded with one detection.
    pub fn open_for(
        event: &DetectionEvent,
        rule_family: impl Into<String>,
        service: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut affected_services = BTreeSet::new();
        affected_services.insert(service.into());
        Self {
            id: IncidentId::generate(),
            tenant_id: event.tenant_id.clone(),
            project_id: event.project_id.clone(),
            rule_family: rule_family.into(),
            status: IncidentStatus::Open,
            severity: event.severity,
            detection_count: 1,
            affected_services,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    /// Fold another detection event into this incident: bump the count,
    /// union the service, lift severity to the max.
    pub fn absorb(&mut self, event: &DetectionEvent, service: impl Into<String>, now: DateTime<Utc>) {
        self.detection_count += 1;
        self.affected_services.insert(service.into());
        self.severity = self.severity.max(event.severity);
        self.updated_at = now;
    }

    /// Apply a status transition, enforcing the state machine.
    pub fn transition(
        &mut self,
        next: IncidentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError { from: self.status, to: next });
        }
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.resolved_at = Some(now);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "incident_tests.rs"]
mod tests;
