// SPDX-License-Identifier: MIT

//! The detection-scan job: load the batch, evaluate rules, correlate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tw_core::{Clock, LogId, ProjectId, TenantId};
use tw_detect::{IncidentCorrelator, RuleEvaluator};
use tw_queue::Processor;
use tw_storage::LogStore;

/// Queue carrying detection-scan jobs.
pub const SCAN_QUEUE: &str = "detections";

/// Task identifier of the scan job.
pub const SCAN_JOB_NAME: &str = "detection-scan";

/// Payload enqueued by ingestion for each committed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPayload {
    pub tenant_id: String,
    pub project_id: String,
    pub log_ids: Vec<String>,
}

/// Processes detection-scan jobs. Execution is at-least-once: a retried
/// scan re-emits detection events, which correlate onto the same incident.
pub struct ScanProcessor<C: Clock> {
    logs: Arc<dyn LogStore>,
    evaluator: Arc<RuleEvaluator<C>>,
    correlator: Arc<IncidentCorrelator<C>>,
}

impl<C: Clock> ScanProcessor<C> {
    pub fn new(
        logs: Arc<dyn LogStore>,
        evaluator: Arc<RuleEvaluator<C>>,
        correlator: Arc<IncidentCorrelator<C>>,
    ) -> Self {
        Self { logs, evaluator, correlator }
    }

    /// Run one scan job.
    pub async fn scan(
        &self,
        payload: &ScanPayload,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let tenant = TenantId::new(payload.tenant_id.clone());
        let project = ProjectId::new(payload.project_id.clone());
        let ids: Vec<LogId> =
            payload.log_ids.iter().map(|id| LogId::from_string(id.clone())).collect();

        let logs = self.logs.fetch_by_ids(&tenant, &project, &ids).await?;
        if logs.is_empty() {
            tracing::debug!(tenant = %tenant, project = %project, "scan found no logs");
            return Ok(0);
        }

        let events = self.evaluator.evaluate(&tenant, &logs).await?;
        if events.is_empty() {
            return Ok(0);
        }

        let service_by_log: HashMap<&str, &str> =
            logs.iter().map(|l| (l.id.as_str(), l.service.as_str())).collect();
        for event in &events {
            let service = service_by_log.get(event.log_id.as_str()).copied().unwrap_or("unknown");
            self.correlator.record(event, service).await?;
        }

        tracing::info!(
            tenant = %tenant,
            project = %project,
            logs = logs.len(),
            detections = events.len(),
            "scan completed"
        );
        Ok(events.len())
    }

    /// Adapt into a queue processor callback.
    pub fn into_processor(self: Arc<Self>) -> Processor {
        Arc::new(move |job| {
            let this = Arc::clone(&self);
            Box::pin(async move {
                let payload: ScanPayload = serde_json::from_value(job.payload.clone())?;
                this.scan(&payload).await?;
                Ok(())
            })
        })
    }
}

#[cfg(test)]
#[path = "scan_tests.rs"]
mod tests;
