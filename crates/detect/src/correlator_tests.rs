// SPDX-License-Identifier: MIT

use super::*;
use chrono::Utc;
use tw_core::{DetectionEventId, FakeClock, IncidentStatus, LogId, Severity};
use tw_storage::{MemoryDetectionStore, MemoryIncidentStore};

fn event(rule_id: &str, severity: Severity) -> DetectionEvent {
    DetectionEvent {
        id: DetectionEventId::generate(),
        tenant_id: "t1".into(),
        project_id: "p1".into(),
        rule_id: rule_id.to_string(),
        pack_id: "startup-reliability".to_string(),
        log_id: LogId::generate(),
        severity,
        timestamp: Utc::now(),
        excerpt: "boom".to_string(),
    }
}

struct Fixture {
    incidents: Arc<MemoryIncidentStore>,
    detections: Arc<MemoryDetectionStore>,
    clock: FakeClock,
    correlator: IncidentCorrelator<FakeClock>,
}

fn fixture() -> Fixture {
    let incidents = Arc::new(MemoryIncidentStore::new());
    let detections = Arc::new(MemoryDetectionStore::new());
    let clock = FakeClock::new();
    let correlator = IncidentCorrelator::new(
        Arc::clone(&incidents) as Arc<dyn tw_storage::IncidentStore>,
        Arc::clone(&detections) as Arc<dyn tw_storage::DetectionStore>,
        clock.clone(),
    );
    Fixture { incidents, detections, clock, correlator }
}

#[tokio::test]
async fn first_event_opens_an_incident() {
    let f = fixture();
    let e = event("critical-errors", Severity::Critical);
    let incident_id = f.correlator.record(&e, "api").await.unwrap();

    let incident = f.incidents.get(&incident_id).await.unwrap().unwrap();
    assert_eq!(incident.status, IncidentStatus::Open);
    assert_eq!(incident.severity, Severity::Critical);
    assert_eq!(incident.detection_count, 1);
    assert_eq!(incident.rule_family, "critical-errors");
    assert!(incident.affected_services.contains("api"));
    assert_eq!(f.detections.list_for_incident(&incident_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn same_family_within_window_appends() {
    let f = fixture();
    let first = f.correlator.record(&event("critical-errors", Severity::High), "api").await.unwrap();
    f.clock.advance(chrono::Duration::minutes(5));
    let second =
        f.correlator.record(&event("critical-errors", Severity::Critical), "worker").await.unwrap();

    assert_eq!(first, second, "appended to the same incident");
    let incident = f.incidents.get(&first).await.unwrap().unwrap();
    assert_eq!(incident.detection_count, 2);
    assert_eq!(incident.severity, Severity::Critical, "severity lifted to max");
    let services: Vec<_> = incident.affected_services.iter().cloned().collect();
    assert_eq!(services, ["api", "worker"]);
}

#[tokio::test]
async fn instance_suffix_folds_into_the_family() {
    let f = fixture();
    let first = f.correlator.record(&event("failed-login-attempts", Severity::Medium), "auth").await.unwrap();
    let second =
        f.correlator.record(&event("failed-login-attempts-2", Severity::Medium), "auth").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn stale_incident_gets_a_fresh_one() {
    let f = fixture();
    let first = f.correlator.record(&event("critical-errors", Severity::High), "api").await.unwrap();
    f.clock.advance(chrono::Duration::minutes(10));
    let second = f.correlator.record(&event("critical-errors", Severity::High), "api").await.unwrap();
    assert_eq!(first, second, "10 minutes: still inside the window");

    f.clock.advance(chrono::Duration::minutes(20));
    let third = f.correlator.record(&event("critical-errors", Severity::High), "api").await.unwrap();
    assert_ne!(first, third, "20 minutes after last update: new incident");

    let counts = (
        f.incidents.get(&first).await.unwrap().unwrap().detection_count,
        f.incidents.get(&third).await.unwrap().unwrap().detection_count,
    );
    assert_eq!(counts, (2, 1));
}

#[tokio::test]
async fn different_families_never_share_an_incident() {
    let f = fixture();
    let a = f.correlator.record(&event("critical-errors", Severity::Critical), "api").await.unwrap();
    let b = f.correlator.record(&event("oom-crashes", Severity::Critical), "api").await.unwrap();
    assert_ne!(a, b);
}

#[tokio::test]
async fn terminal_incident_is_not_reopened() {
    let f = fixture();
    let first = f.correlator.record(&event("critical-errors", Severity::High), "api").await.unwrap();

    let mut incident = f.incidents.get(&first).await.unwrap().unwrap();
    incident.transition(IncidentStatus::Resolved, f.clock.now()).unwrap();
    f.incidents.update(&incident).await.unwrap();

    let second = f.correlator.record(&event("critical-errors", Severity::High), "api").await.unwrap();
    assert_ne!(first, second, "resolved incident stays closed");
    let reopened = f.incidents.get(&first).await.unwrap().unwrap();
    assert_eq!(reopened.status, IncidentStatus::Resolved);
}

#[tokio::test]
async fn detection_count_matches_linked_events() {
    let f = fixture();
    let mut last = None;
    for _ in 0..3 {
        last = Some(f.correlator.record(&event("deadlock-detected", Severity::High), "db").await.unwrap());
        f.clock.advance(chrono::Duration::minutes(1));
    }
    let incident_id = last.unwrap();
    let incident = f.incidents.get(&incident_id).await.unwrap().unwrap();
    let linked = f.detections.list_for_incident(&incident_id).await.unwrap();
    assert_eq!(incident.detection_count as usize, linked.len());
}

#[tokio::test]
async fn record_all_preserves_emission_order() {
    let f = fixture();
    let batch = vec![
        (event("critical-errors", Severity::Critical), "api".to_string()),
        (event("oom-crashes", Severity::Critical), "api".to_string()),
    ];
    let ids = f.correlator.record_all(&batch).await.unwrap();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1], "distinct families open distinct incidents");
}
