// SPDX-License-Identifier: MIT

//! Pack activation persistence.

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tw_core::{PackActivation, TenantId};

/// Storage contract for per-tenant pack activations.
#[async_trait]
pub trait ActivationStore: Send + Sync {
    /// Insert or replace the activation row for (tenant, pack).
    async fn upsert(&self, activation: &PackActivation) -> Result<(), StorageError>;

    async fn get(
        &self,
        tenant: &TenantId,
        pack_id: &str,
    ) -> Result<Option<PackActivation>, StorageError>;

    /// All enabled activations for a tenant, used by the rule evaluator.
    async fn list_enabled(&self, tenant: &TenantId) -> Result<Vec<PackActivation>, StorageError>;
}

/// Postgres implementation.
pub struct PgActivationStore {
    pool: PgPool,
}

impl PgActivationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn activation_from_row(row: &PgRow) -> Result<PackActivation, StorageError> {
        let thresholds: serde_json::Value = row.try_get("thresholds")?;
        let email_recipients: serde_json::Value = row.try_get("email_recipients")?;
        Ok(PackActivation {
            tenant_id: TenantId::new(row.try_get::<String, _>("tenant_id")?),
            pack_id: row.try_get("pack_id")?,
            enabled: row.try_get("enabled")?,
            thresholds: serde_json::from_value(thresholds)
                .map_err(|e| StorageError::Corrupt(format!("thresholds: {e}")))?,
            email_recipients: serde_json::from_value(email_recipients)
                .map_err(|e| StorageError::Corrupt(format!("email_recipients: {e}")))?,
            webhook_url: row.try_get::<Option<String>, _>("webhook_url")?,
            activated_at: row.try_get::<DateTime<Utc>, _>("activated_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }
}

#[async_trait]
impl ActivationStore for PgActivationStore {
    async fn upsert(&self, activation: &PackActivation) -> Result<(), StorageError> {
        let thresholds = serde_json::to_value(&activation.thresholds)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let email_recipients = serde_json::to_value(&activation.email_recipients)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO pack_activations
                (tenant_id, pack_id, enabled, thresholds, email_recipients, webhook_url,
                 activated_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tenant_id, pack_id) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                thresholds = EXCLUDED.thresholds,
                email_recipients = EXCLUDED.email_recipients,
                webhook_url = EXCLUDED.webhook_url,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(activation.tenant_id.as_str())
        .bind(&activation.pack_id)
        .bind(activation.enabled)
        .bind(thresholds)
        .bind(email_recipients)
        .bind(&activation.webhook_url)
        .bind(activation.activated_at)
        .bind(activation.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(
        &self,
        tenant: &TenantId,
        pack_id: &str,
    ) -> Result<Option<PackActivation>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT tenant_id, pack_id, enabled, thresholds, email_recipients, webhook_url,
                   activated_at, updated_at
            FROM pack_activations
            WHERE tenant_id = $1 AND pack_id = $2
            "#,
        )
        .bind(tenant.as_str())
        .bind(pack_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::activation_from_row).transpose()
    }

    async fn list_enabled(&self, tenant: &TenantId) -> Result<Vec<PackActivation>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, pack_id, enabled, thresholds, email_recipients, webhook_url,
                   activated_at, updated_at
            FROM pack_activations
            WHERE tenant_id = $1 AND enabled
            ORDER BY pack_id
            "#,
        )
        .bind(tenant.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::activation_from_row).collect()
    }
}
