// SPDX-License-Identifier: MIT

//! Workspace-level pipeline tests: ingestion through detection and
//! correlation over the in-memory substrates.

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tw_core::{
    Clock, FakeClock, LogLevel, NewLogRecord, PackActivation, RuleOverride, Severity, TenantId,
};
use tw_daemon::{
    EnableOptions, IngestService, PackService, ScanPayload, ScanProcessor, SideEffects,
    SCAN_JOB_NAME, SCAN_QUEUE,
};
use tw_detect::{IncidentCorrelator, PackCatalog, RuleEvaluator};
use tw_queue::{
    JobOptions, MemoryBackend, Processor, Queue, QueueBackend, QueueSupervisor, Worker,
    WorkerEvent, WorkerOptions,
};
use tw_storage::{
    ActivationStore, LogStore, LogWriter, MemoryActivationStore, MemoryDetectionStore,
    MemoryIncidentStore, MemoryLogStore,
};
use tw_stream::{
    chunk_ids, LogNotification, NotificationSink, RecordingSink, Subscriber, SubscriberCallback,
    SubscriberFilter, SubscriberId, SubscriberRegistry, MAX_LOG_IDS_PER_CHUNK,
};

/// A fully wired in-memory pipeline.
struct Pipeline {
    clock: FakeClock,
    activations: Arc<MemoryActivationStore>,
    detections: Arc<MemoryDetectionStore>,
    incidents: Arc<MemoryIncidentStore>,
    backend: Arc<MemoryBackend>,
    sink: Arc<RecordingSink>,
    registry: Arc<SubscriberRegistry>,
    ingest: IngestService<FakeClock>,
    scan: Arc<ScanProcessor<FakeClock>>,
    packs: PackService<FakeClock>,
}

fn pipeline() -> Pipeline {
    let clock = FakeClock::new();
    let logs = Arc::new(MemoryLogStore::new());
    let activations = Arc::new(MemoryActivationStore::new());
    let detections = Arc::new(MemoryDetectionStore::new());
    let incidents = Arc::new(MemoryIncidentStore::new());
    let backend = Arc::new(MemoryBackend::new());
    let sink = Arc::new(RecordingSink::new());
    let registry = Arc::new(SubscriberRegistry::new());
    let catalog = Arc::new(PackCatalog::new());

    let evaluator = Arc::new(RuleEvaluator::new(
        Arc::clone(&catalog),
        Arc::clone(&activations) as Arc<dyn ActivationStore>,
        clock.clone(),
    ));
    let correlator = Arc::new(IncidentCorrelator::new(
        Arc::clone(&incidents) as _,
        Arc::clone(&detections) as _,
        clock.clone(),
    ));
    let scan = Arc::new(ScanProcessor::new(
        Arc::clone(&logs) as Arc<dyn LogStore>,
        Arc::clone(&evaluator),
        correlator,
    ));

    let queue = Queue::new(SCAN_QUEUE, Arc::clone(&backend) as Arc<dyn QueueBackend>);
    let side_effects =
        SideEffects::spawn(Arc::clone(&sink) as Arc<dyn NotificationSink>, queue);
    let ingest = IngestService::new(
        LogWriter::new(Arc::clone(&logs) as Arc<dyn LogStore>, clock.clone()),
        side_effects,
    );
    let packs = PackService::new(
        catalog,
        Arc::clone(&activations) as _,
        evaluator,
        clock.clone(),
    );

    Pipeline {
        clock,
        activations,
        detections,
        incidents,
        backend,
        sink,
        registry,
        ingest,
        scan,
        packs,
    }
}

impl Pipeline {
    async fn enable(&self, pack: &str) {
        self.activations
            .upsert(&PackActivation::new(tenant(), pack, self.clock.now()))
            .await
            .unwrap();
    }

    /// Drain the scan queue the way a worker would, synchronously.
    async fn run_scans(&self) {
        while let Some(job) = self.backend.claim(SCAN_QUEUE).await.unwrap() {
            assert_eq!(job.name, SCAN_JOB_NAME);
            let payload: ScanPayload = serde_json::from_value(job.payload.clone()).unwrap();
            self.scan.scan(&payload).await.unwrap();
            self.backend.complete(SCAN_QUEUE, &job).await.unwrap();
        }
    }

    async fn ingest_and_scan(&self, batch: Vec<NewLogRecord>) -> Vec<tw_core::LogId> {
        let response = self.ingest.ingest(&tenant(), &"p1".into(), batch).await.unwrap();
        self.ingest.flush_side_effects().await;
        self.run_scans().await;
        response.ids
    }
}

fn tenant() -> TenantId {
    "t1".into()
}

fn log(service: &str, level: LogLevel, message: &str) -> NewLogRecord {
    NewLogRecord::new(service, level, message)
}

// --- Scenario: one critical OOM log through the whole pipeline ---

#[tokio::test]
async fn critical_oom_ingest_detects_and_opens_incidents() {
    let p = pipeline();
    p.enable("startup-reliability").await;

    let ids = p
        .ingest_and_scan(vec![log("api", LogLevel::Critical, "OOM: heap space exhausted")])
        .await;
    assert_eq!(ids.len(), 1);

    // One notification carrying that id.
    let published = p.sink.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].log_ids, vec![ids[0].as_str().to_string()]);

    // Detection events from both critical-errors and oom-crashes.
    let events = p.detections.all();
    let rules: Vec<_> = events.iter().map(|e| e.rule_id.as_str()).collect();
    assert_eq!(rules, ["critical-errors", "oom-crashes"]);
    assert!(events.iter().all(|e| e.severity == Severity::Critical));
    assert!(events.iter().all(|e| e.log_id == ids[0]));

    // Each rule family owns its incident; both critical, affecting {api}.
    let incidents = p.incidents.all();
    assert_eq!(incidents.len(), 2);
    let total: u32 = incidents.iter().map(|i| i.detection_count).sum();
    assert_eq!(total, 2);
    for incident in incidents {
        assert_eq!(incident.severity, Severity::Critical);
        let services: Vec<_> = incident.affected_services.iter().cloned().collect();
        assert_eq!(services, ["api"]);
    }
}

// --- Scenario: 250 info logs, zero detections ---

#[tokio::test]
async fn quiet_batch_produces_notifications_but_no_detections() {
    let p = pipeline();
    p.enable("startup-reliability").await;
    p.enable("auth-security").await;

    let batch: Vec<_> =
        (0..250).map(|i| log("api", LogLevel::Info, &format!("request {i} ok"))).collect();
    let ids = p.ingest_and_scan(batch).await;
    assert_eq!(ids.len(), 250);

    let published = p.sink.published();
    assert_eq!(published.len(), 2, "250 ids split at 197 per chunk");
    assert!(p.detections.all().is_empty());
    assert!(p.incidents.all().is_empty());
}

// --- Scenario: 500 logs chunk into 3 ordered notifications ---

#[tokio::test]
async fn five_hundred_logs_chunk_into_three_ordered_notifications() {
    let p = pipeline();
    let batch: Vec<_> =
        (0..500).map(|i| log("api", LogLevel::Info, &format!("request {i}"))).collect();
    let ids = p.ingest_and_scan(batch).await;

    let published = p.sink.published();
    assert_eq!(published.len(), 3);
    let rejoined: Vec<String> =
        published.iter().flat_map(|n| n.log_ids.iter().cloned()).collect();
    let expected: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
    similar_asserts::assert_eq!(rejoined, expected);
}

// --- Scenario: severity override via activation threshold ---

#[tokio::test]
async fn threshold_override_lifts_failed_login_to_high() {
    let p = pipeline();
    let mut options = EnableOptions::default();
    options.thresholds.insert(
        "failed-login-attempts".to_string(),
        RuleOverride { level: Some(Severity::High), ..Default::default() },
    );
    p.packs.enable_pack(&tenant(), "auth-security", options).await.unwrap();

    p.ingest_and_scan(vec![log("auth", LogLevel::Warn, "failed login for user=x")]).await;

    let events = p.detections.all();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].rule_id, "failed-login-attempts");
    assert_eq!(events[0].severity, Severity::High, "medium relabelled to high");
}

// --- Scenario: subscribers only see their own project ---

#[tokio::test]
async fn subscriber_for_another_project_gets_no_callbacks() {
    let p = pipeline();

    let seen = Arc::new(parking_lot::Mutex::new(Vec::<LogNotification>::new()));
    let sink = Arc::clone(&seen);
    let callback: SubscriberCallback = Arc::new(move |n| {
        let sink = Arc::clone(&sink);
        Box::pin(async move {
            sink.lock().push(n);
            Ok(())
        })
    });
    p.registry.subscribe(Subscriber {
        id: SubscriberId::generate(),
        filter: SubscriberFilter::project("p1"),
        callback,
    });

    // A batch lands in p2: the p1 subscriber must stay silent.
    p.ingest.ingest(&tenant(), &"p2".into(), vec![log("api", LogLevel::Info, "hello")])
        .await
        .unwrap();
    p.ingest.flush_side_effects().await;
    for notification in p.sink.published() {
        p.registry.dispatch(&notification).await;
    }
    assert!(seen.lock().is_empty());

    // And a p1 batch reaches it.
    p.ingest.ingest(&tenant(), &"p1".into(), vec![log("api", LogLevel::Info, "hello")])
        .await
        .unwrap();
    p.ingest.flush_side_effects().await;
    for notification in p.sink.published() {
        p.registry.dispatch(&notification).await;
    }
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].project_id, "p1");
}

// --- Incident correlation window across batches ---

#[tokio::test]
async fn correlation_window_appends_then_reopens() {
    let p = pipeline();
    p.enable("startup-reliability").await;

    p.ingest_and_scan(vec![log("api", LogLevel::Error, "boom 1")]).await;
    p.clock.advance(chrono::Duration::minutes(5));
    p.ingest_and_scan(vec![log("api", LogLevel::Error, "boom 2")]).await;

    let incidents = p.incidents.all();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].detection_count, 2, "second event appended within 15m");

    p.clock.advance(chrono::Duration::minutes(20));
    p.ingest_and_scan(vec![log("api", LogLevel::Error, "boom 3")]).await;
    let incidents = p.incidents.all();
    assert_eq!(incidents.len(), 2, "stale incident leaves room for a fresh one");
}

// --- Queue behavior through the supervisor, end to end ---

#[tokio::test]
async fn worker_retries_flaky_scan_jobs_to_completion() {
    use std::sync::atomic::{AtomicU32, Ordering};

    let backend = Arc::new(MemoryBackend::new());
    let supervisor = QueueSupervisor::with_backend(
        Arc::clone(&backend) as Arc<dyn QueueBackend>,
        WorkerOptions { concurrency: 2, poll_interval: Duration::from_millis(10) },
    );

    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_in = Arc::clone(&attempts);
    let processor: Processor = Arc::new(move |_job| {
        let attempts = Arc::clone(&attempts_in);
        Box::pin(async move {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("transient".into())
            } else {
                Ok(())
            }
        })
    });

    let worker: Arc<Worker> = supervisor.worker(SCAN_QUEUE, processor);
    let mut events = worker.subscribe();
    supervisor.start();

    supervisor
        .queue(SCAN_QUEUE)
        .add(SCAN_JOB_NAME, serde_json::json!({"n": 1}), JobOptions::default())
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, WorkerEvent::Completed(_)), "retry then success, no failed event");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    supervisor.shutdown().await;
}

#[tokio::test]
async fn duplicate_scan_enqueues_collapse_on_the_dedupe_key() {
    let backend = Arc::new(MemoryBackend::new());
    let queue = Queue::new(SCAN_QUEUE, Arc::clone(&backend) as Arc<dyn QueueBackend>);

    let opts = || JobOptions::with_key("tenant-t1-batch-9");
    let first = queue.add(SCAN_JOB_NAME, serde_json::json!({"b": 9}), opts()).await.unwrap();
    let second = queue.add(SCAN_JOB_NAME, serde_json::json!({"b": 9}), opts()).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(queue.counts().await.unwrap().waiting, 1, "at most one live job per key");
}

// --- Chunking property ---

proptest! {
    #[test]
    fn chunks_always_concatenate_back(ids in proptest::collection::vec(any::<u64>(), 0..1200)) {
        let chunks = chunk_ids(&ids);
        for chunk in &chunks {
            prop_assert!(chunk.len() <= MAX_LOG_IDS_PER_CHUNK);
            prop_assert!(!chunk.is_empty() || ids.is_empty());
        }
        let rejoined: Vec<u64> = chunks.into_iter().flatten().collect();
        prop_assert_eq!(rejoined, ids);
    }
}
