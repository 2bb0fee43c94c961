// SPDX-License-Identifier: MIT

//! In-memory store implementations for tests.

use crate::activations::ActivationStore;
use crate::detections::DetectionStore;
use crate::error::StorageError;
use crate::incidents::IncidentStore;
use crate::logs::LogStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tw_core::{
    DetectionEvent, Incident, IncidentId, LogId, LogRecord, PackActivation, ProjectId, TenantId,
};

/// Log rows in a Vec, insertion-ordered.
#[derive(Default)]
pub struct MemoryLogStore {
    records: Mutex<Vec<LogRecord>>,
    /// When set, the next `insert_batch` fails with this error once.
    fail_next: Mutex<Option<sqlx::Error>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Arrange for the next insert to fail (transient-retry tests).
    pub fn fail_next_insert(&self, err: sqlx::Error) {
        *self.fail_next.lock() = Some(err);
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn insert_batch(&self, records: &[LogRecord]) -> Result<(), StorageError> {
        if let Some(err) = self.fail_next.lock().take() {
            return Err(StorageError::Database(err));
        }
        self.records.lock().extend_from_slice(records);
        Ok(())
    }

    async fn fetch_by_ids(
        &self,
        tenant: &TenantId,
        project: &ProjectId,
        ids: &[LogId],
    ) -> Result<Vec<LogRecord>, StorageError> {
        let records = self.records.lock();
        let by_id: HashMap<&str, &LogRecord> = records
            .iter()
            .filter(|r| &r.tenant_id == tenant && &r.project_id == project)
            .map(|r| (r.id.as_str(), r))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.get(id.as_str()).map(|r| (*r).clone())).collect())
    }
}

/// Activations keyed by (tenant, pack).
#[derive(Default)]
pub struct MemoryActivationStore {
    activations: Mutex<HashMap<(String, String), PackActivation>>,
}

impl MemoryActivationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActivationStore for MemoryActivationStore {
    async fn upsert(&self, activation: &PackActivation) -> Result<(), StorageError> {
        let key = (
            activation.tenant_id.as_str().to_string(),
            activation.pack_id.clone(),
        );
        self.activations.lock().insert(key, activation.clone());
        Ok(())
    }

    async fn get(
        &self,
        tenant: &TenantId,
        pack_id: &str,
    ) -> Result<Option<PackActivation>, StorageError> {
        let key = (tenant.as_str().to_string(), pack_id.to_string());
        Ok(self.activations.lock().get(&key).cloned())
    }

    async fn list_enabled(&self, tenant: &TenantId) -> Result<Vec<PackActivation>, StorageError> {
        let mut enabled: Vec<PackActivation> = self
            .activations
            .lock()
            .values()
            .filter(|a| &a.tenant_id == tenant && a.enabled)
            .cloned()
            .collect();
        enabled.sort_by(|a, b| a.pack_id.cmp(&b.pack_id));
        Ok(enabled)
    }
}

/// Detection events plus their incident links.
#[derive(Default)]
pub struct MemoryDetectionStore {
    events: Mutex<Vec<(DetectionEvent, IncidentId)>>,
}

impl MemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<DetectionEvent> {
        self.events.lock().iter().map(|(e, _)| e.clone()).collect()
    }
}

#[async_trait]
impl DetectionStore for MemoryDetectionStore {
    async fn insert(
        &self,
        event: &DetectionEvent,
        incident_id: &IncidentId,
    ) -> Result<(), StorageError> {
        self.events.lock().push((event.clone(), incident_id.clone()));
        Ok(())
    }

    async fn list_for_incident(
        &self,
        incident_id: &IncidentId,
    ) -> Result<Vec<DetectionEvent>, StorageError> {
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|(_, id)| id == incident_id)
            .map(|(e, _)| e.clone())
            .collect())
    }
}

/// Incidents keyed by id.
#[derive(Default)]
pub struct MemoryIncidentStore {
    incidents: Mutex<HashMap<String, Incident>>,
}

impl MemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Incident> {
        self.incidents.lock().values().cloned().collect()
    }
}

#[async_trait]
impl IncidentStore for MemoryIncidentStore {
    async fn insert(&self, incident: &Incident) -> Result<(), StorageError> {
        self.incidents
            .lock()
            .insert(incident.id.as_str().to_string(), incident.clone());
        Ok(())
    }

    async fn update(&self, incident: &Incident) -> Result<(), StorageError> {
        let mut incidents = self.incidents.lock();
        if !incidents.contains_key(incident.id.as_str()) {
            return Err(StorageError::IncidentNotFound(incident.id.as_str().to_string()));
        }
        incidents.insert(incident.id.as_str().to_string(), incident.clone());
        Ok(())
    }

    async fn get(&self, id: &IncidentId) -> Result<Option<Incident>, StorageError> {
        Ok(self.incidents.lock().get(id.as_str()).cloned())
    }

    async fn find_active(
        &self,
        tenant: &TenantId,
        project: &ProjectId,
        rule_family: &str,
    ) -> Result<Option<Incident>, StorageError> {
        Ok(self
            .incidents
            .lock()
            .values()
            .filter(|i| {
                &i.tenant_id == tenant
                    && &i.project_id == project
                    && i.rule_family == rule_family
                    && !i.status.is_terminal()
            })
            .max_by_key(|i| i.updated_at)
            .cloned())
    }

    async fn list_open(&self, tenant: &TenantId) -> Result<Vec<Incident>, StorageError> {
        let mut open: Vec<Incident> = self
            .incidents
            .lock()
            .values()
            .filter(|i| &i.tenant_id == tenant && !i.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(open)
    }
}
