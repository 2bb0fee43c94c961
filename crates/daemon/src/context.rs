// SPDX-License-Identifier: MIT

//! The composition root: one `Context` per process wires every component
//! together and owns ordered shutdown. Process-wide uniqueness of the
//! supervisor, listener, publisher, and catalog is enforced here rather
//! than through global state.

use crate::config::Config;
use crate::error::DaemonError;
use crate::ingest::{IngestService, SideEffects};
use crate::packs::PackService;
use crate::scan::{ScanProcessor, SCAN_QUEUE};
use sqlx::postgres::PgPool;
use std::sync::Arc;
use tw_core::SystemClock;
use tw_detect::{IncidentCorrelator, PackCatalog, RuleEvaluator};
use tw_queue::QueueSupervisor;
use tw_storage::{
    connect_pool, ensure_schema, LogWriter, PgActivationStore, PgDetectionStore,
    PgIncidentStore, PgLogStore,
};
use tw_stream::{NotificationPublisher, NotifyListener, SubscriberRegistry};

/// Everything a running daemon holds.
pub struct Context {
    pub pool: PgPool,
    pub supervisor: Arc<QueueSupervisor>,
    pub registry: Arc<SubscriberRegistry>,
    pub listener: NotifyListener,
    pub catalog: Arc<PackCatalog>,
    pub ingest: Arc<IngestService<SystemClock>>,
    pub packs: Arc<PackService<SystemClock>>,
}

impl Context {
    /// Connect, bootstrap schema, wire components, start workers and the
    /// listener.
    pub async fn start(config: &Config) -> Result<Self, DaemonError> {
        let clock = SystemClock;
        let pool = connect_pool(config.db_url()).await?;
        ensure_schema(&pool).await?;

        let logs = Arc::new(PgLogStore::new(pool.clone()));
        let activations = Arc::new(PgActivationStore::new(pool.clone()));
        let detections = Arc::new(PgDetectionStore::new(pool.clone()));
        let incidents = Arc::new(PgIncidentStore::new(pool.clone()));

        let catalog = Arc::new(PackCatalog::new());
        let evaluator = Arc::new(RuleEvaluator::new(
            Arc::clone(&catalog),
            Arc::clone(&activations) as _,
            clock,
        ));
        let correlator = Arc::new(IncidentCorrelator::new(
            Arc::clone(&incidents) as _,
            Arc::clone(&detections) as _,
            clock,
        ));

        let supervisor = Arc::new(QueueSupervisor::connect(&config.queue_config()?).await?);
        let scan_processor = Arc::new(ScanProcessor::new(
            Arc::clone(&logs) as _,
            Arc::clone(&evaluator),
            Arc::clone(&correlator),
        ));
        let _scan_worker = supervisor.worker(SCAN_QUEUE, scan_processor.into_processor());
        supervisor.start();

        let publisher = Arc::new(NotificationPublisher::new(pool.clone()));
        let side_effects = SideEffects::spawn(publisher, supervisor.queue(SCAN_QUEUE));
        let writer = LogWriter::new(Arc::clone(&logs) as _, clock);
        let ingest = Arc::new(IngestService::new(writer, side_effects));

        let packs = Arc::new(PackService::new(
            Arc::clone(&catalog),
            Arc::clone(&activations) as _,
            Arc::clone(&evaluator),
            clock,
        ));

        let registry = Arc::new(SubscriberRegistry::new());
        let listener = NotifyListener::initialize_with_config(
            config.db_url(),
            Arc::clone(&registry),
            config.listener_config(),
        );

        tracing::info!("tidewatch daemon started");
        Ok(Self { pool, supervisor, registry, listener, catalog, ingest, packs })
    }

    /// Ordered shutdown: listener first (stop inbound notifications), then
    /// queue workers, then the pool. Safe to call once per context.
    pub async fn shutdown(&self) {
        self.listener.shutdown().await;
        self.supervisor.shutdown().await;
        self.pool.close().await;
        tracing::info!("tidewatch daemon stopped");
    }
}
