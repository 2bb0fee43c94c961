// SPDX-License-Identifier: MIT

//! The incident correlator.
//!
//! Correlation key is `(tenant, project, rule_family)`. A detection event
//! lands on the open incident for its key when that incident was updated
//! inside the freshness window; otherwise a new incident opens. Terminal
//! incidents are never reopened.

use std::sync::Arc;
use std::time::Duration;
use tw_core::{rule_family, Clock, DetectionEvent, IncidentId, Incident};
use tw_storage::{DetectionStore, IncidentStore, StorageError};

/// Default append window for an existing incident.
pub const CORRELATION_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Groups detection events into incidents. The only writer of incidents.
pub struct IncidentCorrelator<C: Clock> {
    incidents: Arc<dyn IncidentStore>,
    detections: Arc<dyn DetectionStore>,
    clock: C,
    window: chrono::Duration,
}

impl<C: Clock> IncidentCorrelator<C> {
    pub fn new(
        incidents: Arc<dyn IncidentStore>,
        detections: Arc<dyn DetectionStore>,
        clock: C,
    ) -> Self {
        Self::with_window(incidents, detections, clock, CORRELATION_WINDOW)
    }

    /// Tuning constructor; the window is not exposed as configuration.
    pub fn with_window(
        incidents: Arc<dyn IncidentStore>,
        detections: Arc<dyn DetectionStore>,
        clock: C,
        window: Duration,
    ) -> Self {
        let window = chrono::Duration::from_std(window)
            .unwrap_or_else(|_| chrono::Duration::minutes(15));
        Self { incidents, detections, clock, window }
    }

    /// Correlate one detection event, persisting both the event and the
    /// incident change. `service` is the service of the matched log.
    pub async fn record(
        &self,
        event: &DetectionEvent,
        service: &str,
    ) -> Result<IncidentId, StorageError> {
        let family = rule_family(&event.rule_id);
        let now = self.clock.now();

        if let Some(mut incident) = self
            .incidents
            .find_active(&event.tenant_id, &event.project_id, family)
            .await?
        {
            if now - incident.updated_at <= self.window {
                incident.absorb(event, service, now);
                self.incidents.update(&incident).await?;
                self.detections.insert(event, &incident.id).await?;
                tracing::debug!(
                    incident = %incident.id,
                    rule = %event.rule_id,
                    count = incident.detection_count,
                    "detection appended to incident"
                );
                return Ok(incident.id);
            }
        }

        let incident = Incident::open_for(event, family, service, now);
        self.incidents.insert(&incident).await?;
        self.detections.insert(event, &incident.id).await?;
        tracing::info!(
            incident = %incident.id,
            tenant = %event.tenant_id,
            project = %event.project_id,
            rule_family = family,
            severity = %incident.severity,
            "incident opened"
        );
        Ok(incident.id)
    }

    /// Correlate a batch in emission order. Returns the incident id each
    /// event landed on.
    pub async fn record_all(
        &self,
        events: &[(DetectionEvent, String)],
    ) -> Result<Vec<IncidentId>, StorageError> {
        let mut incident_ids = Vec::with_capacity(events.len());
        for (event, service) in events {
            incident_ids.push(self.record(event, service).await?);
        }
        Ok(incident_ids)
    }
}

#[cfg(test)]
#[path = "correlator_tests.rs"]
mod tests;
