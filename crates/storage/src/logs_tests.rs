// SPDX-License-Identifier: MIT

use super::*;
use crate::memory::MemoryLogStore;
use tw_core::{FakeClock, NewLogRecord, ValidationError};

fn writer(store: Arc<MemoryLogStore>) -> LogWriter<FakeClock> {
    LogWriter::new(store, FakeClock::new())
}

fn batch(n: usize) -> Vec<NewLogRecord> {
    (0..n)
        .map(|i| NewLogRecord::new("api", tw_core::LogLevel::Info, format!("message {i}")))
        .collect()
}

#[tokio::test]
async fn write_batch_returns_ids_in_input_order() {
    let store = Arc::new(MemoryLogStore::new());
    let writer = writer(Arc::clone(&store));

    let ids = writer
        .write_batch(&"t1".into(), &"p1".into(), batch(5))
        .await
        .unwrap();
    assert_eq!(ids.len(), 5);

    let stored = store.all();
    assert_eq!(stored.len(), 5);
    for (i, (id, record)) in ids.iter().zip(&stored).enumerate() {
        assert_eq!(id, &record.id, "order preserved");
        assert_eq!(record.message, format!("message {i}"));
        assert_eq!(record.tenant_id.as_str(), "t1");
        assert_eq!(record.project_id.as_str(), "p1");
    }
}

#[tokio::test]
async fn invalid_batch_never_touches_the_store() {
    let store = Arc::new(MemoryLogStore::new());
    let writer = writer(Arc::clone(&store));

    let mut bad = batch(2);
    bad[1].message.clear();
    let err = writer.write_batch(&"t1".into(), &"p1".into(), bad).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Validation(ValidationError::Record { index: 1, .. })
    ));
    assert!(store.all().is_empty());
}

#[tokio::test]
async fn oversize_batch_is_rejected() {
    let store = Arc::new(MemoryLogStore::new());
    let writer = writer(Arc::clone(&store));
    let err = writer
        .write_batch(&"t1".into(), &"p1".into(), batch(1001))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "batch_too_large");
}

#[tokio::test]
async fn transient_insert_failure_is_retried_once() {
    let store = Arc::new(MemoryLogStore::new());
    store.fail_next_insert(sqlx::Error::PoolTimedOut);
    let writer = writer(Arc::clone(&store));

    let ids = writer
        .write_batch(&"t1".into(), &"p1".into(), batch(3))
        .await
        .unwrap();
    assert_eq!(ids.len(), 3);
    assert_eq!(store.all().len(), 3, "retry succeeded");
}

#[tokio::test]
async fn fetch_by_ids_preserves_requested_order_and_scope() {
    let store = Arc::new(MemoryLogStore::new());
    let writer = writer(Arc::clone(&store));
    let ids = writer
        .write_batch(&"t1".into(), &"p1".into(), batch(3))
        .await
        .unwrap();
    writer.write_batch(&"t1".into(), &"p2".into(), batch(1)).await.unwrap();

    let reversed: Vec<_> = ids.iter().rev().cloned().collect();
    let fetched = store.fetch_by_ids(&"t1".into(), &"p1".into(), &reversed).await.unwrap();
    let fetched_ids: Vec<_> = fetched.iter().map(|r| r.id.clone()).collect();
    assert_eq!(fetched_ids, reversed);

    // Wrong project: nothing leaks across scope.
    let cross = store.fetch_by_ids(&"t1".into(), &"p2".into(), &ids).await.unwrap();
    assert!(cross.is_empty());
}
