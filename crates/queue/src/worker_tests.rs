// SPDX-License-Identifier: MIT

use super::*;
use crate::job::JobOptions;
use crate::memory::MemoryBackend;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::watch;

fn started_gate() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(true);
    // Keep the sender alive for the test's duration.
    std::mem::forget(tx);
    rx
}

fn fast_options() -> WorkerOptions {
    WorkerOptions { concurrency: 2, poll_interval: Duration::from_millis(10) }
}

async fn wait_for_event(
    rx: &mut tokio::sync::broadcast::Receiver<WorkerEvent>,
) -> WorkerEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for worker event")
        .expect("event channel closed")
}

#[tokio::test]
async fn processes_and_completes_a_job() {
    let backend = Arc::new(MemoryBackend::new());
    let calls = Arc::new(AtomicU32::new(0));
    let calls_in = Arc::clone(&calls);
    let processor: Processor = Arc::new(move |_job| {
        let calls = Arc::clone(&calls_in);
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    });

    let worker = Worker::spawn("scan", backend.clone(), processor, fast_options(), started_gate());
    let mut rx = worker.subscribe();

    backend.enqueue("scan", "detection-scan", json!({"n": 1}), JobOptions::default()).await.unwrap();

    match wait_for_event(&mut rx).await {
        WorkerEvent::Completed(job) => assert_eq!(job.name, "detection-scan"),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    worker.shutdown().await;
}

#[tokio::test]
async fn retries_then_completes_without_failed_event() {
    let backend = Arc::new(MemoryBackend::new());
    let calls = Arc::new(AtomicU32::new(0));
    let calls_in = Arc::clone(&calls);
    let processor: Processor = Arc::new(move |_job| {
        let calls = Arc::clone(&calls_in);
        Box::pin(async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("first attempt fails".into())
            } else {
                Ok(())
            }
        })
    });

    let worker = Worker::spawn("scan", backend.clone(), processor, fast_options(), started_gate());
    let mut rx = worker.subscribe();
    backend.enqueue("scan", "flaky", json!({}), JobOptions::default()).await.unwrap();

    match wait_for_event(&mut rx).await {
        WorkerEvent::Completed(job) => assert_eq!(job.name, "flaky"),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2, "one failed + one successful attempt");
    worker.shutdown().await;
}

#[tokio::test]
async fn exhausted_job_emits_exactly_one_failed_event() {
    let backend = Arc::new(MemoryBackend::new());
    let calls = Arc::new(AtomicU32::new(0));
    let calls_in = Arc::clone(&calls);
    let processor: Processor = Arc::new(move |_job| {
        let calls = Arc::clone(&calls_in);
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("always fails".into())
        })
    });

    let worker = Worker::spawn("scan", backend.clone(), processor, fast_options(), started_gate());
    let mut rx = worker.subscribe();
    backend
        .enqueue("scan", "doomed", json!({}), JobOptions { max_attempts: 3, ..Default::default() })
        .await
        .unwrap();

    match wait_for_event(&mut rx).await {
        WorkerEvent::Failed { job, error } => {
            assert_eq!(job.name, "doomed");
            assert_eq!(error, "always fails");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3, "maxAttempts invocations");

    let counts = backend.counts("scan").await.unwrap();
    assert_eq!(counts.failed, 1);
    worker.shutdown().await;
}

#[tokio::test]
async fn gate_defers_polling_until_started() {
    let backend = Arc::new(MemoryBackend::new());
    let (gate_tx, gate_rx) = watch::channel(false);
    let processor: Processor = Arc::new(|_job| Box::pin(async { Ok(()) }));

    let worker = Worker::spawn("scan", backend.clone(), processor, fast_options(), gate_rx);
    let mut rx = worker.subscribe();
    backend.enqueue("scan", "waiting", json!({}), JobOptions::default()).await.unwrap();

    // Not started: the job must stay unclaimed.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.counts("scan").await.unwrap().waiting, 1);

    gate_tx.send(true).unwrap();
    match wait_for_event(&mut rx).await {
        WorkerEvent::Completed(job) => assert_eq!(job.name, "waiting"),
        other => panic!("unexpected event: {other:?}"),
    }
    worker.shutdown().await;
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_job() {
    let backend = Arc::new(MemoryBackend::new());
    let finished = Arc::new(AtomicU32::new(0));
    let finished_in = Arc::clone(&finished);
    let processor: Processor = Arc::new(move |_job| {
        let finished = Arc::clone(&finished_in);
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    });

    let worker = Worker::spawn("scan", backend.clone(), processor, fast_options(), started_gate());
    backend.enqueue("scan", "slow", json!({}), JobOptions::default()).await.unwrap();

    // Give the worker a moment to claim, then shut down mid-flight.
    tokio::time::sleep(Duration::from_millis(40)).await;
    worker.shutdown().await;
    assert_eq!(finished.load(Ordering::SeqCst), 1, "in-flight job allowed to finish");
}
