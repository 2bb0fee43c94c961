// SPDX-License-Identifier: MIT

//! Log records and ingestion-batch validation.

use crate::id::{ProjectId, TenantId};
use crate::level::LogLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

crate::define_id! {
    /// Unique identifier for a stored log record.
    pub struct LogId("log-");
}

/// Maximum records accepted in one ingestion batch.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Maximum service-name length in characters.
pub const MAX_SERVICE_LEN: usize = 100;

/// A stored log record. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: LogId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub level: LogLevel,
    pub message: String,
    /// Free-form structured attributes. Always a JSON object.
    #[serde(default = "empty_object")]
    pub attributes: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl LogRecord {
    /// Look up a named field on this record.
    ///
    /// Resolves the well-known fields (`service`, `level`, `message`,
    /// `span_id`) first, then falls through to the attributes object.
    /// Used by detection-rule predicates and logsource selectors.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "service" => Some(Value::String(self.service.clone())),
            "level" => Some(Value::String(self.level.as_str().to_string())),
            "message" => Some(Value::String(self.message.clone())),
            "span_id" => self.span_id.clone().map(Value::String),
            other => self.attributes.get(other).cloned(),
        }
    }
}

/// A log record as submitted for ingestion, before an ID is assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLogRecord {
    /// Ingest time is used when the producer supplies no timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub service: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(default = "empty_object")]
    pub attributes: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

impl NewLogRecord {
    pub fn new(service: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            service: service.into(),
            level,
            message: message.into(),
            attributes: empty_object(),
            span_id: None,
        }
    }

    /// Validate one record against the ingestion contract.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let service_chars = self.service.chars().count();
        if service_chars == 0 || service_chars > MAX_SERVICE_LEN {
            return Err(ValidationError::ServiceLength(service_chars));
        }
        if self.message.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        if let Some(span_id) = &self.span_id {
            if !is_valid_span_id(span_id) {
                return Err(ValidationError::BadSpanId(span_id.clone()));
            }
        }
        if !self.attributes.is_object() {
            return Err(ValidationError::AttributesNotObject);
        }
        Ok(())
    }

    /// Materialise a stored record with a freshly assigned id.
    pub fn into_record(
        self,
        tenant_id: TenantId,
        project_id: ProjectId,
        now: DateTime<Utc>,
    ) -> LogRecord {
        LogRecord {
            id: LogId::generate(),
            tenant_id,
            project_id,
            timestamp: self.timestamp.unwrap_or(now),
            service: self.service,
            level: self.level,
            message: self.message,
            attributes: self.attributes,
            span_id: self.span_id,
        }
    }
}

/// `span_id` format: exactly 16 lowercase hex characters.
fn is_valid_span_id(s: &str) -> bool {
    s.len() == 16 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Validate a whole ingestion batch: size bounds plus per-record checks.
pub fn validate_batch(batch: &[NewLogRecord]) -> Result<(), ValidationError> {
    if batch.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    if batch.len() > MAX_BATCH_SIZE {
        return Err(ValidationError::BatchTooLarge(batch.len()));
    }
    for (index, record) in batch.iter().enumerate() {
        record.validate().map_err(|source| ValidationError::Record {
            index,
            source: Box::new(source),
        })?;
    }
    Ok(())
}

/// Ingestion validation failures. Surfaced to the caller, never retried.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("service name must be 1-{MAX_SERVICE_LEN} characters, got {0}")]
    ServiceLength(usize),
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("span_id must be 16 lowercase hex characters, got {0:?}")]
    BadSpanId(String),
    #[error("attributes must be a JSON object")]
    AttributesNotObject,
    #[error("batch must contain at least one record")]
    EmptyBatch,
    #[error("batch exceeds {MAX_BATCH_SIZE} records, got {0}")]
    BatchTooLarge(usize),
    #[error("record {index}: {source}")]
    Record {
        index: usize,
        source: Box<ValidationError>,
    },
}

impl ValidationError {
    /// Machine-readable error code per the ingestion contract.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::BatchTooLarge(_) => "batch_too_large",
            ValidationError::Record { source, .. } => source.code(),
            ValidationError::ServiceLength(_) => "invalid_service",
            ValidationError::EmptyMessage => "empty_message",
            ValidationError::BadSpanId(_) => "invalid_span_id",
            ValidationError::AttributesNotObject => "invalid_attributes",
            ValidationError::EmptyBatch => "empty_batch",
        }
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
