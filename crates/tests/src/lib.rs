//! # Integration Tests
//!
//! Cross-crate scenarios for the radar node.
//!
//! Covers:
//! - Capture path end to end (edges to queue)
//! - Crash and restart of the local queue
//! - Interrupted and disconnected sync cycles
//! - Idempotent delivery against the central aggregator over HTTP

#[cfg(test)]
mod support {
    use std::net::SocketAddr;
    use std::path::Path;
    use std::sync::Arc;

    use central::{IngestResponse, IngestionService, MemoryRecordStore, RecordStore};
    use chrono::Utc;
    use contracts::{
        DeliveryError, Direction, IngestAck, IngestClient, Measurement, MeasurementId,
        MeasurementSubmission,
    };
    use local_queue::SharedQueue;
    use tokio::net::TcpListener;
    use tokio::sync::watch;

    pub const CENTRAL_TOKEN: &str = "central-secret";

    pub fn measurement(speed_kmh: f64) -> Measurement {
        Measurement::new("gate-north", Utc::now(), speed_kmh, Direction::AToB, speed_kmh > 20.0)
    }

    pub async fn queue_with(path: &Path, count: usize) -> (SharedQueue, Vec<MeasurementId>) {
        let queue = SharedQueue::open(path).await.unwrap();
        let mut ids = Vec::new();
        for i in 0..count {
            let m = measurement(10.0 + i as f64);
            ids.push(m.id);
            queue.append(m).await.unwrap();
        }
        (queue, ids)
    }

    pub fn idle_shutdown() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    /// Running central server on an ephemeral port
    pub struct CentralServer {
        pub addr: SocketAddr,
        pub service: Arc<IngestionService<MemoryRecordStore>>,
        shutdown: watch::Sender<bool>,
        handle: tokio::task::JoinHandle<std::io::Result<()>>,
    }

    impl CentralServer {
        pub async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let service = Arc::new(IngestionService::new(MemoryRecordStore::new(), CENTRAL_TOKEN));
            let (shutdown, rx) = watch::channel(false);
            let handle = tokio::spawn(central::serve(listener, Arc::clone(&service), rx));
            Self {
                addr,
                service,
                shutdown,
                handle,
            }
        }

        pub fn url(&self) -> String {
            format!("http://{}", self.addr)
        }

        pub async fn count(&self) -> usize {
            self.service.store().count().await.unwrap()
        }

        pub async fn stop(self) {
            self.shutdown.send(true).unwrap();
            self.handle.await.unwrap().unwrap();
        }
    }

    /// An address nothing listens on
    pub async fn dead_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    /// In-process client that calls the ingestion service directly
    ///
    /// `lose_acks` drops the acknowledgment of the first N stored submissions
    /// (the record is kept, the node sees a transport failure). `stop_after`
    /// raises the shutdown flag once N submissions have been answered.
    pub struct LoopbackClient {
        pub service: Arc<IngestionService<MemoryRecordStore>>,
        lose_acks: std::sync::atomic::AtomicUsize,
        stop_after: Option<(usize, watch::Sender<bool>)>,
        answered: std::sync::atomic::AtomicUsize,
    }

    impl LoopbackClient {
        pub fn new(service: Arc<IngestionService<MemoryRecordStore>>) -> Self {
            Self {
                service,
                lose_acks: Default::default(),
                stop_after: None,
                answered: Default::default(),
            }
        }

        pub fn losing_acks(mut self, count: usize) -> Self {
            self.lose_acks = count.into();
            self
        }

        pub fn stopping_after(mut self, count: usize, shutdown: watch::Sender<bool>) -> Self {
            self.stop_after = Some((count, shutdown));
            self
        }
    }

    impl IngestClient for LoopbackClient {
        fn endpoint(&self) -> &str {
            "loopback"
        }

        async fn submit(
            &self,
            submission: &MeasurementSubmission,
        ) -> Result<IngestAck, DeliveryError> {
            use std::sync::atomic::Ordering;

            let body = serde_json::to_vec(submission).unwrap();
            let response = self.service.ingest(Some(CENTRAL_TOKEN), &body).await;

            let answered = self.answered.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((limit, shutdown)) = &self.stop_after {
                if answered >= *limit {
                    let _ = shutdown.send(true);
                }
            }

            if self
                .lose_acks
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(DeliveryError::transport("connection reset before response"));
            }

            match response {
                IngestResponse::Created(_) => Ok(IngestAck::Accepted),
                IngestResponse::Duplicate(_) => Ok(IngestAck::Duplicate),
                IngestResponse::Invalid { errors } => Err(DeliveryError::Rejected {
                    status: 400,
                    reason: format!("{errors:?}"),
                }),
                IngestResponse::Unauthorized => Err(DeliveryError::Unauthorized { status: 401 }),
                IngestResponse::StoreFailure { message } => {
                    Err(DeliveryError::Server { status: 500, message })
                }
            }
        }
    }
}

#[cfg(test)]
mod capture_tests {
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{Channel, Direction, SensorEdge};
    use local_queue::SharedQueue;
    use timing_engine::{CaptureClock, CapturePipeline, ReplayConfig, ReplayEdgeSource};
    use tokio::sync::watch;

    fn settings_toml(queue_path: &std::path::Path) -> String {
        format!(
            r#"
[node]
radar_id = "gate-north"
name = "North Gate"
api_token = "node-secret"

[sensors]
distance_m = 1.0
speed_limit_kmh = 30.0
pairing_timeout_ms = 2000

[storage]
queue_path = "{}"
compact_on_start = false
"#,
            queue_path.display()
        )
    }

    /// Edges enter through a source, measurements land in the durable queue
    #[tokio::test]
    async fn test_e2e_replay_to_queue() {
        let dir = tempfile::tempdir().unwrap();
        let queue_path = dir.path().join("queue.journal");
        let settings =
            ConfigLoader::load_from_str(&settings_toml(&queue_path), ConfigFormat::Toml).unwrap();

        let queue = SharedQueue::open(&queue_path).await.unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let clock = CaptureClock::start();
        let mut pipeline = CapturePipeline::start(&settings, clock, queue.clone(), shutdown_rx);

        let ms = Duration::from_millis;
        // 100ms over 1m = 36 km/h (over the limit), then 400ms B->A = 9 km/h
        let edges = vec![
            SensorEdge::falling(Channel::A, ms(1_000)),
            SensorEdge::falling(Channel::B, ms(1_100)),
            SensorEdge::falling(Channel::B, ms(1_500)),
            SensorEdge::falling(Channel::A, ms(1_900)),
        ];
        pipeline.register_source(Box::new(ReplayEdgeSource::from_edges(
            edges,
            clock,
            ReplayConfig {
                speed_multiplier: 4.0,
            },
        )));
        pipeline.start_all();

        tokio::time::timeout(Duration::from_secs(5), async {
            while pipeline.any_listening() {
                tokio::time::sleep(ms(20)).await;
            }
        })
        .await
        .unwrap();

        let report = pipeline.shutdown().await;
        assert_eq!(report.timing.emitted, 2);
        assert_eq!(report.recorder.persisted, 2);
        assert_eq!(report.edges_dropped, 0);

        let recorded = queue.pending().await.unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].direction, Direction::AToB);
        assert!((recorded[0].speed_kmh - 36.0).abs() < 1e-6);
        assert!(recorded[0].over_limit);
        assert_eq!(recorded[1].direction, Direction::BToA);
        assert!((recorded[1].speed_kmh - 9.0).abs() < 1e-6);
        assert!(!recorded[1].over_limit);
        assert!(recorded.iter().all(|m| m.radar_id == "gate-north"));
    }

    /// Edges fed straight into the channel pair the same way
    #[tokio::test]
    async fn test_e2e_direct_edges() {
        let dir = tempfile::tempdir().unwrap();
        let queue_path = dir.path().join("queue.journal");
        let settings =
            ConfigLoader::load_from_str(&settings_toml(&queue_path), ConfigFormat::Toml).unwrap();

        let queue = SharedQueue::open(&queue_path).await.unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let clock = CaptureClock::start();
        let pipeline = CapturePipeline::start(&settings, clock, queue.clone(), shutdown_rx);

        let tx = pipeline.edge_sender();
        let base = clock.now();
        tx.send(SensorEdge::falling(Channel::A, base)).await.unwrap();
        tx.send(SensorEdge::falling(Channel::B, base + Duration::from_millis(200)))
            .await
            .unwrap();
        drop(tx);

        let report = pipeline.shutdown().await;
        assert_eq!(report.recorder.persisted, 1);
        assert_eq!(queue.stats().await.unwrap().pending, 1);
    }
}

#[cfg(test)]
mod restart_tests {
    use std::io::Write;

    use local_queue::SharedQueue;

    use crate::support::{measurement, queue_with};

    /// A crash mid-append leaves a torn tail; everything before it survives
    #[tokio::test]
    async fn test_queue_survives_crash_with_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.journal");

        let (queue, ids) = queue_with(&path, 3).await;
        assert!(queue.mark_synced(ids[0]).await.unwrap());
        drop(queue);

        // Half-written frame header
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0x20, 0x00, 0x00]).unwrap();
        drop(file);

        let queue = SharedQueue::open(&path).await.unwrap();
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.synced, 1);

        let pending: Vec<_> = queue.pending().await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(pending, ids[1..].to_vec());

        // Appends continue cleanly after recovery
        queue.append(measurement(55.0)).await.unwrap();
        drop(queue);
        let queue = SharedQueue::open(&path).await.unwrap();
        assert_eq!(queue.stats().await.unwrap().total, 4);
    }

    #[tokio::test]
    async fn test_compaction_preserves_state_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.journal");

        let (queue, ids) = queue_with(&path, 4).await;
        queue.mark_synced(ids[0]).await.unwrap();
        queue.mark_synced(ids[1]).await.unwrap();
        queue.flag_rejected(ids[2], "bad payload").await.unwrap();
        let before = queue.stats().await.unwrap();
        queue.compact().await.unwrap();
        drop(queue);

        let queue = SharedQueue::open(&path).await.unwrap();
        assert_eq!(queue.stats().await.unwrap(), before);
        assert_eq!(queue.rejected().await.unwrap()[0].id, ids[2]);
    }
}

#[cfg(test)]
mod sync_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use central::{IngestionService, MemoryRecordStore, RecordStore};
    use contracts::{CycleOutcome, IngestAck, IngestClient};
    use local_queue::SharedQueue;
    use sync_engine::{HttpIngestClient, SyncConfig, SyncEngine};

    use crate::support::{
        dead_url, idle_shutdown, measurement, queue_with, CentralServer, LoopbackClient,
        CENTRAL_TOKEN,
    };

    fn config() -> SyncConfig {
        SyncConfig {
            interval: Duration::from_millis(50),
            request_timeout: Duration::from_secs(2),
            batch_size: 100,
            radar_name: Some("North Gate".into()),
        }
    }

    fn http_client(url: &str, token: &str) -> HttpIngestClient {
        HttpIngestClient::new(url, token, Duration::from_secs(2)).unwrap()
    }

    /// Shutdown after k of n entries: exactly k synced, the rest resume later
    #[tokio::test]
    async fn test_interrupted_cycle_resumes_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.journal");
        let (queue, ids) = queue_with(&path, 5).await;
        let service = Arc::new(IngestionService::new(MemoryRecordStore::new(), CENTRAL_TOKEN));

        let (shutdown_tx, shutdown_rx) = idle_shutdown();
        let client = LoopbackClient::new(Arc::clone(&service)).stopping_after(2, shutdown_tx);
        let mut engine = SyncEngine::new(queue.clone(), Some(client), config());

        let report = engine.run_cycle(&shutdown_rx).await;
        assert_eq!(report.outcome, CycleOutcome::Interrupted);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.synced(), 2);
        drop(engine);
        drop(queue);

        // Restart: remaining three are delivered, nothing is stored twice
        let queue = SharedQueue::open(&path).await.unwrap();
        let pending: Vec<_> = queue.pending().await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(pending, ids[2..].to_vec());

        let (_tx, rx) = idle_shutdown();
        let mut engine = SyncEngine::new(
            queue.clone(),
            Some(LoopbackClient::new(Arc::clone(&service))),
            config(),
        );
        let report = engine.run_cycle(&rx).await;
        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.accepted, 3);
        assert_eq!(service.store().count().await.unwrap(), 5);
        assert_eq!(queue.stats().await.unwrap().pending, 0);
    }

    /// A lost acknowledgment is resent and absorbed as a duplicate
    #[tokio::test]
    async fn test_lost_ack_is_absorbed_as_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, _) = queue_with(&dir.path().join("queue.journal"), 1).await;
        let service = Arc::new(IngestionService::new(MemoryRecordStore::new(), CENTRAL_TOKEN));

        let client = LoopbackClient::new(Arc::clone(&service)).losing_acks(1);
        let mut engine = SyncEngine::new(queue.clone(), Some(client), config());
        let (_tx, rx) = idle_shutdown();

        let report = engine.run_cycle(&rx).await;
        assert_eq!(report.outcome, CycleOutcome::TransportFailure);
        assert_eq!(service.store().count().await.unwrap(), 1);
        assert_eq!(queue.stats().await.unwrap().pending, 1);

        let report = engine.run_cycle(&rx).await;
        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.duplicates, 1);
        assert_eq!(service.store().count().await.unwrap(), 1);
        assert_eq!(queue.stats().await.unwrap().synced, 1);
    }

    /// Disconnected node: one attempt per cycle, full delivery once the link is back
    #[tokio::test]
    async fn test_disconnect_round_trip_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, ids) = queue_with(&dir.path().join("queue.journal"), 4).await;
        let (_tx, rx) = idle_shutdown();

        let mut offline = SyncEngine::new(
            queue.clone(),
            Some(http_client(&dead_url().await, CENTRAL_TOKEN)),
            config(),
        );
        for _ in 0..2 {
            let report = offline.run_cycle(&rx).await;
            assert_eq!(report.outcome, CycleOutcome::TransportFailure);
            assert_eq!(report.attempted, 1);
        }
        assert_eq!(offline.status().consecutive_failures, 2);
        assert_eq!(queue.stats().await.unwrap().pending, 4);

        let server = CentralServer::start().await;
        let mut online =
            SyncEngine::new(queue.clone(), Some(http_client(&server.url(), CENTRAL_TOKEN)), config());
        let report = online.run_cycle(&rx).await;
        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.accepted, 4);
        assert_eq!(server.count().await, 4);

        let stored = server.service.store().get(ids[0]).await.unwrap().unwrap();
        assert_eq!(stored.measurement.radar_name.as_deref(), Some("North Gate"));

        // Resending an acknowledged measurement is a duplicate, not a second record
        let resend = queue.get(ids[0]).await.unwrap().unwrap();
        let ack = http_client(&server.url(), CENTRAL_TOKEN)
            .submit(&resend.to_submission(None))
            .await
            .unwrap();
        assert_eq!(ack, IngestAck::Duplicate);
        assert_eq!(server.count().await, 4);

        server.stop().await;
    }

    /// Wrong credentials halt delivery without touching the backlog
    #[tokio::test]
    async fn test_bad_token_halts_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, _) = queue_with(&dir.path().join("queue.journal"), 2).await;
        let server = CentralServer::start().await;
        let (_tx, rx) = idle_shutdown();

        let mut engine =
            SyncEngine::new(queue.clone(), Some(http_client(&server.url(), "wrong")), config());
        let report = engine.run_cycle(&rx).await;
        assert_eq!(report.outcome, CycleOutcome::AuthRejected);
        assert!(engine.status().halted.is_some());

        let report = engine.run_cycle(&rx).await;
        assert_eq!(report.outcome, CycleOutcome::Skipped);
        assert_eq!(server.count().await, 0);
        assert_eq!(queue.stats().await.unwrap().pending, 2);

        server.stop().await;
    }

    /// Malformed payloads are flagged, the rest of the cycle proceeds
    #[tokio::test]
    async fn test_rejected_payload_is_flagged_and_requeueable() {
        let dir = tempfile::tempdir().unwrap();
        let queue = SharedQueue::open(dir.path().join("queue.journal")).await.unwrap();
        let bad = measurement(-5.0);
        let good = measurement(25.0);
        queue.append(bad.clone()).await.unwrap();
        queue.append(good.clone()).await.unwrap();

        let server = CentralServer::start().await;
        let (_tx, rx) = idle_shutdown();
        let mut engine =
            SyncEngine::new(queue.clone(), Some(http_client(&server.url(), CENTRAL_TOKEN)), config());

        let report = engine.run_cycle(&rx).await;
        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.accepted, 1);

        let rejected = queue.rejected().await.unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].id, bad.id);
        assert!(rejected[0].reason.contains("speed_kmh"));

        // Operator releases it; it is attempted (and refused) again
        assert_eq!(queue.release_all().await.unwrap(), 1);
        let report = engine.run_cycle(&rx).await;
        assert_eq!(report.attempted, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(server.count().await, 1);

        server.stop().await;
    }

    /// The background loop delivers new measurements as they arrive
    #[tokio::test]
    async fn test_background_engine_delivers_new_measurements() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, _) = queue_with(&dir.path().join("queue.journal"), 1).await;
        let server = CentralServer::start().await;

        let engine =
            SyncEngine::new(queue.clone(), Some(http_client(&server.url(), CENTRAL_TOKEN)), config());
        let mut status = engine.subscribe();
        let (shutdown_tx, shutdown_rx) = idle_shutdown();
        let handle = tokio::spawn(engine.run(shutdown_rx));

        queue.append(measurement(33.0)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                status.changed().await.unwrap();
                if status.borrow().total_synced == 2 {
                    break;
                }
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(true).unwrap();
        let final_status = handle.await.unwrap();
        assert_eq!(final_status.total_synced, 2);
        assert_eq!(server.count().await, 2);

        server.stop().await;
    }
}
