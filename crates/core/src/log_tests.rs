// SPDX-License-Identifier: MIT

use super::*;
use serde_json::json;
use yare::parameterized;

fn record(service: &str, message: &str) -> NewLogRecord {
    NewLogRecord::new(service, LogLevel::Info, message)
}

#[test]
fn valid_record_passes() {
    assert!(record("api", "listening on :8080").validate().is_ok());
}

#[parameterized(
    empty = { "" },
    too_long = { &"x".repeat(101) },
)]
fn service_length_is_enforced(service: &str) {
    let err = record(service, "msg").validate().unwrap_err();
    assert!(matches!(err, ValidationError::ServiceLength(_)));
}

#[test]
fn service_length_counts_chars_not_bytes() {
    // 100 two-byte characters is exactly at the limit
    let service = "é".repeat(100);
    assert!(record(&service, "msg").validate().is_ok());
}

#[test]
fn empty_message_is_rejected() {
    let err = record("api", "").validate().unwrap_err();
    assert!(matches!(err, ValidationError::EmptyMessage));
}

#[parameterized(
    valid = { "0123456789abcdef", true },
    uppercase = { "0123456789ABCDEF", false },
    short = { "abc", false },
    long = { "0123456789abcdef0", false },
    non_hex = { "0123456789abcdeg", false },
)]
fn span_id_format(span_id: &str, ok: bool) {
    let mut rec = record("api", "msg");
    rec.span_id = Some(span_id.to_string());
    assert_eq!(rec.validate().is_ok(), ok, "span_id {span_id:?}");
}

#[test]
fn non_object_attributes_are_rejected() {
    let mut rec = record("api", "msg");
    rec.attributes = json!([1, 2, 3]);
    let err = rec.validate().unwrap_err();
    assert!(matches!(err, ValidationError::AttributesNotObject));
}

#[test]
fn batch_bounds() {
    assert!(matches!(
        validate_batch(&[]).unwrap_err(),
        ValidationError::EmptyBatch
    ));

    let batch: Vec<_> = (0..1001).map(|_| record("api", "m")).collect();
    let err = validate_batch(&batch).unwrap_err();
    assert!(matches!(err, ValidationError::BatchTooLarge(1001)));
    assert_eq!(err.code(), "batch_too_large");
}

#[test]
fn batch_error_reports_offending_index() {
    let batch = vec![record("api", "ok"), record("api", "")];
    let err = validate_batch(&batch).unwrap_err();
    match err {
        ValidationError::Record { index, .. } => assert_eq!(index, 1),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn into_record_defaults_timestamp_to_now() {
    let now = chrono::Utc::now();
    let rec = record("api", "msg").into_record("t1".into(), "p1".into(), now);
    assert_eq!(rec.timestamp, now);
    assert!(rec.id.as_str().starts_with("log-"));
    assert_eq!(rec.tenant_id.as_str(), "t1");
}

#[test]
fn field_resolves_known_then_attributes() {
    let mut input = record("auth", "failed login");
    input.attributes = json!({"product": "gateway", "count": 3});
    let rec = input.into_record("t1".into(), "p1".into(), chrono::Utc::now());

    assert_eq!(rec.field("service"), Some(json!("auth")));
    assert_eq!(rec.field("level"), Some(json!("info")));
    assert_eq!(rec.field("message"), Some(json!("failed login")));
    assert_eq!(rec.field("product"), Some(json!("gateway")));
    assert_eq!(rec.field("count"), Some(json!(3)));
    assert_eq!(rec.field("missing"), None);
}
