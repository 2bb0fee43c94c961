// SPDX-License-Identifier: MIT

//! Pool construction and idempotent schema bootstrap.

use crate::error::StorageError;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Default size of the primary-store pool.
const DEFAULT_POOL_SIZE: u32 = 10;

const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS logs (
    id         TEXT PRIMARY KEY,
    tenant_id  TEXT NOT NULL,
    project_id TEXT NOT NULL,
    ts         TIMESTAMPTZ NOT NULL,
    service    TEXT NOT NULL,
    level      TEXT NOT NULL,
    message    TEXT NOT NULL,
    attributes JSONB NOT NULL DEFAULT '{}'::jsonb,
    span_id    TEXT,
    seq        BIGSERIAL
);
CREATE INDEX IF NOT EXISTS logs_tenant_project_ts_idx
    ON logs (tenant_id, project_id, ts);

CREATE TABLE IF NOT EXISTS pack_activations (
    tenant_id        TEXT NOT NULL,
    pack_id          TEXT NOT NULL,
    enabled          BOOLEAN NOT NULL DEFAULT TRUE,
    thresholds       JSONB NOT NULL DEFAULT '{}'::jsonb,
    email_recipients JSONB NOT NULL DEFAULT '[]'::jsonb,
    webhook_url      TEXT,
    activated_at     TIMESTAMPTZ NOT NULL,
    updated_at       TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (tenant_id, pack_id)
);

CREATE TABLE IF NOT EXISTS detection_events (
    id          TEXT PRIMARY KEY,
    tenant_id   TEXT NOT NULL,
    project_id  TEXT NOT NULL,
    rule_id     TEXT NOT NULL,
    pack_id     TEXT NOT NULL,
    log_id      TEXT NOT NULL,
    severity    TEXT NOT NULL,
    ts          TIMESTAMPTZ NOT NULL,
    excerpt     TEXT NOT NULL,
    incident_id TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS detection_events_incident_idx
    ON detection_events (incident_id);
CREATE INDEX IF NOT EXISTS detection_events_tenant_ts_idx
    ON detection_events (tenant_id, project_id, ts);

CREATE TABLE IF NOT EXISTS incidents (
    id                TEXT PRIMARY KEY,
    tenant_id         TEXT NOT NULL,
    project_id        TEXT NOT NULL,
    rule_family       TEXT NOT NULL,
    status            TEXT NOT NULL,
    severity          TEXT NOT NULL,
    detection_count   INTEGER NOT NULL,
    affected_services JSONB NOT NULL DEFAULT '[]'::jsonb,
    created_at        TIMESTAMPTZ NOT NULL,
    updated_at        TIMESTAMPTZ NOT NULL,
    resolved_at       TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS incidents_key_idx
    ON incidents (tenant_id, project_id, rule_family, updated_at);
"#;

/// Open the primary-store pool.
pub async fn connect_pool(db_url: &str) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(DEFAULT_POOL_SIZE)
        .connect(db_url)
        .await?;
    Ok(pool)
}

/// Create core tables if missing. Safe to run on every startup.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;
    for statement in SCHEMA_DDL.split(';').filter(|s| !s.trim().is_empty()) {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    tracing::debug!("storage schema ensured");
    Ok(())
}
