// SPDX-License-Identifier: MIT

//! Log persistence and the ingestion writer.

use crate::error::{is_transient_db_error, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;
use tw_core::{
    validate_batch, Clock, LogId, LogLevel, LogRecord, NewLogRecord, ProjectId, TenantId,
};

/// Storage contract for log rows.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Persist a batch atomically, preserving slice order.
    async fn insert_batch(&self, records: &[LogRecord]) -> Result<(), StorageError>;

    /// Fetch records by id within one (tenant, project), in the order the
    /// ids are given. Unknown ids are skipped.
    async fn fetch_by_ids(
        &self,
        tenant: &TenantId,
        project: &ProjectId,
        ids: &[LogId],
    ) -> Result<Vec<LogRecord>, StorageError>;
}

/// The ingestion writer: validates a batch, assigns ids, persists
/// atomically, and returns the assigned ids in input order.
///
/// Log records are created here and nowhere else.
pub struct LogWriter<C: Clock> {
    store: Arc<dyn LogStore>,
    clock: C,
}

impl<C: Clock> LogWriter<C> {
    pub fn new(store: Arc<dyn LogStore>, clock: C) -> Self {
        Self { store, clock }
    }

    /// Write one validated batch for a single (tenant, project).
    ///
    /// Transient storage errors get one immediate retry before surfacing.
    pub async fn write_batch(
        &self,
        tenant: &TenantId,
        project: &ProjectId,
        batch: Vec<NewLogRecord>,
    ) -> Result<Vec<LogId>, StorageError> {
        validate_batch(&batch)?;

        let now = self.clock.now();
        let records: Vec<LogRecord> = batch
            .into_iter()
            .map(|input| input.into_record(tenant.clone(), project.clone(), now))
            .collect();

        if let Err(err) = self.store.insert_batch(&records).await {
            match err {
                StorageError::Database(db) if is_transient_db_error(&db) => {
                    tracing::warn!(error = %db, "transient insert failure, retrying once");
                    self.store.insert_batch(&records).await?;
                }
                other => return Err(other),
            }
        }

        let ids: Vec<LogId> = records.iter().map(|r| r.id.clone()).collect();
        tracing::debug!(
            tenant = %tenant,
            project = %project,
            count = ids.len(),
            "log batch written"
        );
        Ok(ids)
    }
}

/// Postgres implementation.
pub struct PgLogStore {
    pool: PgPool,
}

impl PgLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn record_from_row(row: &PgRow) -> Result<LogRecord, StorageError> {
        let level_raw: String = row.try_get("level")?;
        let level = LogLevel::from_str(&level_raw)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        Ok(LogRecord {
            id: LogId::from_string(row.try_get::<String, _>("id")?),
            tenant_id: TenantId::new(row.try_get::<String, _>("tenant_id")?),
            project_id: ProjectId::new(row.try_get::<String, _>("project_id")?),
            timestamp: row.try_get::<DateTime<Utc>, _>("ts")?,
            service: row.try_get("service")?,
            level,
            message: row.try_get("message")?,
            attributes: row.try_get("attributes")?,
            span_id: row.try_get::<Option<String>, _>("span_id")?,
        })
    }
}

#[async_trait]
impl LogStore for PgLogStore {
    async fn insert_batch(&self, records: &[LogRecord]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        // One statement per row inside the transaction keeps insertion
        // order identical to input order (seq is assigned monotonically).
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO logs
                    (id, tenant_id, project_id, ts, service, level, message, attributes, span_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(record.id.as_str())
            .bind(record.tenant_id.as_str())
            .bind(record.project_id.as_str())
            .bind(record.timestamp)
            .bind(&record.service)
            .bind(record.level.as_str())
            .bind(&record.message)
            .bind(&record.attributes)
            .bind(&record.span_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_by_ids(
        &self,
        tenant: &TenantId,
        project: &ProjectId,
        ids: &[LogId],
    ) -> Result<Vec<LogRecord>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_strings: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, project_id, ts, service, level, message, attributes, span_id
            FROM logs
            WHERE tenant_id = $1 AND project_id = $2 AND id = ANY($3)
            "#,
        )
        .bind(tenant.as_str())
        .bind(project.as_str())
        .bind(&id_strings)
        .fetch_all(&self.pool)
        .await?;

        let mut by_id = std::collections::HashMap::with_capacity(rows.len());
        for row in &rows {
            let record = Self::record_from_row(row)?;
            by_id.insert(record.id.as_str().to_string(), record);
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id.as_str())).collect())
    }
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;
