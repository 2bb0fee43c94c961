// SPDX-License-Identifier: MIT

//! Incident persistence.

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::collections::BTreeSet;
use std::str::FromStr;
use tw_core::{Incident, IncidentId, IncidentStatus, ProjectId, Severity, TenantId};

/// Storage contract for incidents.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn insert(&self, incident: &Incident) -> Result<(), StorageError>;

    /// Persist count/severity/services/status changes.
    async fn update(&self, incident: &Incident) -> Result<(), StorageError>;

    async fn get(&self, id: &IncidentId) -> Result<Option<Incident>, StorageError>;

    /// The most recently updated non-terminal incident for a correlation
    /// key, if any. The caller applies the freshness window.
    async fn find_active(
        &self,
        tenant: &TenantId,
        project: &ProjectId,
        rule_family: &str,
    ) -> Result<Option<Incident>, StorageError>;

    /// Non-terminal incidents for a tenant, newest first.
    async fn list_open(&self, tenant: &TenantId) -> Result<Vec<Incident>, StorageError>;
}

fn status_from_str(raw: &str) -> Result<IncidentStatus, StorageError> {
    match raw {
        "open" => Ok(IncidentStatus::Open),
        "investigating" => Ok(IncidentStatus::Investigating),
        "resolved" => Ok(IncidentStatus::Resolved),
        "false_positive" => Ok(IncidentStatus::FalsePositive),
        other => Err(StorageError::Corrupt(format!("unknown incident status {other:?}"))),
    }
}

/// Postgres implementation.
pub struct PgIncidentStore {
    pool: PgPool,
}

impl PgIncidentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn incident_from_row(row: &PgRow) -> Result<Incident, StorageError> {
        let status = status_from_str(&row.try_get::<String, _>("status")?)?;
        let severity_raw: String = row.try_get("severity")?;
        let services: serde_json::Value = row.try_get("affected_services")?;
        let affected_services: BTreeSet<String> = serde_json::from_value(services)
            .map_err(|e| StorageError::Corrupt(format!("affected_services: {e}")))?;
        Ok(Incident {
            id: IncidentId::from_string(row.try_get::<String, _>("id")?),
            tenant_id: TenantId::new(row.try_get::<String, _>("tenant_id")?),
            project_id: ProjectId::new(row.try_get::<String, _>("project_id")?),
            rule_family: row.try_get("rule_family")?,
            status,
            severity: Severity::from_str(&severity_raw)
                .map_err(|e| StorageError::Corrupt(e.to_string()))?,
            detection_count: row.try_get::<i32, _>("detection_count")?.max(0) as u32,
            affected_services,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            resolved_at: row.try_get::<Option<DateTime<Utc>>, _>("resolved_at")?,
        })
    }

    fn services_json(incident: &Incident) -> Result<serde_json::Value, StorageError> {
        serde_json::to_value(&incident.affected_services)
            .map_err(|e| StorageError::Corrupt(e.to_string()))
    }
}

const INCIDENT_COLUMNS: &str = "id, tenant_id, project_id, rule_family, status, severity, \
     detection_count, affected_services, created_at, updated_at, resolved_at";

#[async_trait]
impl IncidentStore for PgIncidentStore {
    async fn insert(&self, incident: &Incident) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO incidents
                (id, tenant_id, project_id, rule_family, status, severity, detection_count,
                 affected_services, created_at, updated_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(incident.id.as_str())
        .bind(incident.tenant_id.as_str())
        .bind(incident.project_id.as_str())
        .bind(&incident.rule_family)
        .bind(incident.status.to_string())
        .bind(incident.severity.as_str())
        .bind(incident.detection_count as i32)
        .bind(Self::services_json(incident)?)
        .bind(incident.created_at)
        .bind(incident.updated_at)
        .bind(incident.resolved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, incident: &Incident) -> Result<(), StorageError> {
        let done = sqlx::query(
            r#"
            UPDATE incidents
            SET status = $2, severity = $3, detection_count = $4, affected_services = $5,
                updated_at = $6, resolved_at = $7
            WHERE id = $1
            "#,
        )
        .bind(incident.id.as_str())
        .bind(incident.status.to_string())
        .bind(incident.severity.as_str())
        .bind(incident.detection_count as i32)
        .bind(Self::services_json(incident)?)
        .bind(incident.updated_at)
        .bind(incident.resolved_at)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(StorageError::IncidentNotFound(incident.id.as_str().to_string()));
        }
        Ok(())
    }

    async fn get(&self, id: &IncidentId) -> Result<Option<Incident>, StorageError> {
        let sql = format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = $1");
        let row = sqlx::query(&sql).bind(id.as_str()).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::incident_from_row).transpose()
    }

    async fn find_active(
        &self,
        tenant: &TenantId,
        project: &ProjectId,
        rule_family: &str,
    ) -> Result<Option<Incident>, StorageError> {
        let sql = format!(
            r#"
            SELECT {INCIDENT_COLUMNS} FROM incidents
            WHERE tenant_id = $1 AND project_id = $2 AND rule_family = $3
              AND status IN ('open', 'investigating')
            ORDER BY updated_at DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query(&sql)
            .bind(tenant.as_str())
            .bind(project.as_str())
            .bind(rule_family)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::incident_from_row).transpose()
    }

    async fn list_open(&self, tenant: &TenantId) -> Result<Vec<Incident>, StorageError> {
        let sql = format!(
            r#"
            SELECT {INCIDENT_COLUMNS} FROM incidents
            WHERE tenant_id = $1 AND status IN ('open', 'investigating')
            ORDER BY updated_at DESC
            "#
        );
        let rows = sqlx::query(&sql).bind(tenant.as_str()).fetch_all(&self.pool).await?;
        rows.iter().map(Self::incident_from_row).collect()
    }
}
