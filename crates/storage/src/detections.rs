// SPDX-License-Identifier: MIT

//! Detection-event persistence. Append-only.

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::str::FromStr;
use tw_core::{
    DetectionEvent, DetectionEventId, IncidentId, LogId, ProjectId, Severity, TenantId,
};

/// Storage contract for detection events.
#[async_trait]
pub trait DetectionStore: Send + Sync {
    /// Append one event, linked to the incident it was correlated into.
    async fn insert(
        &self,
        event: &DetectionEvent,
        incident_id: &IncidentId,
    ) -> Result<(), StorageError>;

    async fn list_for_incident(
        &self,
        incident_id: &IncidentId,
    ) -> Result<Vec<DetectionEvent>, StorageError>;
}

/// Postgres implementation.
pub struct PgDetectionStore {
    pool: PgPool,
}

impl PgDetectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn event_from_row(row: &PgRow) -> Result<DetectionEvent, StorageError> {
        let severity_raw: String = row.try_get("severity")?;
        Ok(DetectionEvent {
            id: DetectionEventId::from_string(row.try_get::<String, _>("id")?),
            tenant_id: TenantId::new(row.try_get::<String, _>("tenant_id")?),
            project_id: ProjectId::new(row.try_get::<String, _>("project_id")?),
            rule_id: row.try_get("rule_id")?,
            pack_id: row.try_get("pack_id")?,
            log_id: LogId::from_string(row.try_get::<String, _>("log_id")?),
            severity: Severity::from_str(&severity_raw)
                .map_err(|e| StorageError::Corrupt(e.to_string()))?,
            timestamp: row.try_get::<DateTime<Utc>, _>("ts")?,
            excerpt: row.try_get("excerpt")?,
        })
    }
}

#[async_trait]
impl DetectionStore for PgDetectionStore {
    async fn insert(
        &self,
        event: &DetectionEvent,
        incident_id: &IncidentId,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO detection_events
                (id, tenant_id, project_id, rule_id, pack_id, log_id, severity, ts, excerpt,
                 incident_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.id.as_str())
        .bind(event.tenant_id.as_str())
        .bind(event.project_id.as_str())
        .bind(&event.rule_id)
        .bind(&event.pack_id)
        .bind(event.log_id.as_str())
        .bind(event.severity.as_str())
        .bind(event.timestamp)
        .bind(&event.excerpt)
        .bind(incident_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_incident(
        &self,
        incident_id: &IncidentId,
    ) -> Result<Vec<DetectionEvent>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, project_id, rule_id, pack_id, log_id, severity, ts, excerpt
            FROM detection_events
            WHERE incident_id = $1
            ORDER BY ts, id
            "#,
        )
        .bind(incident_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::event_from_row).collect()
    }
}
