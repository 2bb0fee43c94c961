// SPDX-License-Identifier: MIT

use super::*;
use crate::detection::{excerpt, DetectionEvent, DetectionEventId};
use crate::log::LogId;
use yare::parameterized;

fn event(severity: Severity) -> DetectionEvent {
    DetectionEvent {
        id: DetectionEventId::generate(),
        tenant_id: "t1".into(),
        project_id: "p1".into(),
        rule_id: "critical-errors".to_string(),
        pack_id: "startup-reliability".to_string(),
        log_id: LogId::generate(),
        severity,
        timestamp: Utc::now(),
        excerpt: excerpt("boom"),
    }
}

#[test]
fn open_for_seeds_one_detection() {
    let now = Utc::now();
    let inc = Incident::open_for(&event(Severity::High), "critical-errors", "api", now);
    assert_eq!(inc.status, IncidentStatus::Open);
    assert_eq!(inc.detection_count, 1);
    assert_eq!(inc.severity, Severity::High);
    assert!(inc.affected_services.contains("api"));
    assert_eq!(inc.created_at, now);
}

#[test]
fn absorb_lifts_severity_and_unions_services() {
    let now = Utc::now();
    let mut inc = Incident::open_for(&event(Severity::Medium), "critical-errors", "api", now);
    inc.absorb(&event(Severity::Critical), "worker", now);
    inc.absorb(&event(Severity::Low), "api", now);

    assert_eq!(inc.detection_count, 3);
    assert_eq!(inc.severity, Severity::Critical);
    let services: Vec<_> = inc.affected_services.iter().cloned().collect();
    assert_eq!(services, ["api", "worker"]);
}

#[parameterized(
    open_to_investigating = { IncidentStatus::Open, IncidentStatus::Investigating, true },
    open_to_resolved = { IncidentStatus::Open, IncidentStatus::Resolved, true },
    open_to_false_positive = { IncidentStatus::Open, IncidentStatus::FalsePositive, true },
    investigating_to_resolved = { IncidentStatus::Investigating, IncidentStatus::Resolved, true },
    investigating_back_to_open = { IncidentStatus::Investigating, IncidentStatus::Open, false },
    resolved_is_terminal = { IncidentStatus::Resolved, IncidentStatus::Open, false },
    false_positive_is_terminal = { IncidentStatus::FalsePositive, IncidentStatus::Investigating, false },
)]
fn transition_table(from: IncidentStatus, to: IncidentStatus, allowed: bool) {
    assert_eq!(from.can_transition_to(to), allowed);
}

#[test]
fn terminal_transition_stamps_resolved_at() {
    let now = Utc::now();
    let mut inc = Incident::open_for(&event(Severity::High), "critical-errors", "api", now);
    inc.transition(IncidentStatus::Resolved, now).unwrap();
    assert_eq!(inc.resolved_at, Some(now));
    assert!(inc.status.is_terminal());
}

#[test]
fn invalid_transition_is_rejected() {
    let now = Utc::now();
    let mut inc = Incident::open_for(&event(Severity::High), "critical-errors", "api", now);
    inc.transition(IncidentStatus::Resolved, now).unwrap();
    let err = inc.transition(IncidentStatus::Open, now).unwrap_err();
    assert_eq!(err.from, IncidentStatus::Resolved);
    assert_eq!(err.to, IncidentStatus::Open);
}

#[test]
fn excerpt_truncates_to_200_chars() {
    let long = "x".repeat(450);
    assert_eq!(excerpt(&long).len(), 200);
    assert_eq!(excerpt("short"), "short");
}

#[test]
fn status_serde_is_snake_case() {
    assert_eq!(
        serde_json::to_string(&IncidentStatus::FalsePositive).unwrap(),
        "\"false_positive\""
    );
}
