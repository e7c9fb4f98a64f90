//! Store-and-forward delivery loop

use std::time::{Duration, Instant};

use chrono::Utc;
use contracts::{
    CycleOutcome, CycleReport, DeliveryError, FailureClass, IngestAck, IngestClient, Measurement,
    MeasurementId, NodeSettings, SyncStatus,
};
use local_queue::{QueueError, SharedQueue};
use tokio::sync::watch;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/// Sync engine configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Time between cycle starts
    pub interval: Duration,
    /// Bound on each delivery attempt
    pub request_timeout: Duration,
    /// Maximum entries attempted per cycle
    pub batch_size: usize,
    /// Node name attached to submissions
    pub radar_name: Option<String>,
}

impl SyncConfig {
    pub fn from_settings(settings: &NodeSettings) -> Self {
        Self {
            interval: settings.sync.interval(),
            request_timeout: settings.sync.request_timeout(),
            batch_size: settings.sync.batch_size,
            radar_name: settings.node.name.clone(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
            batch_size: 100,
            radar_name: None,
        }
    }
}

/// Delivers Pending measurements to the central aggregator
///
/// A `None` client means delivery is disabled; cycles are reported as
/// skipped and measurements stay Pending.
pub struct SyncEngine<C> {
    queue: SharedQueue,
    client: Option<C>,
    config: SyncConfig,
    status: watch::Sender<SyncStatus>,
    halted: Option<String>,
}

impl<C: IngestClient> SyncEngine<C> {
    pub fn new(queue: SharedQueue, client: Option<C>, config: SyncConfig) -> Self {
        let (status, _) = watch::channel(SyncStatus {
            enabled: client.is_some(),
            ..Default::default()
        });

        Self {
            queue,
            client,
            config,
            status,
            halted: None,
        }
    }

    /// Status receiver for observers
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Set once credentials are refused; cleared only by a restart
    pub fn halted_reason(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run cycles on the configured interval until shutdown
    ///
    /// The first cycle starts immediately.
    #[instrument(name = "sync_engine_run", skip_all)]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SyncStatus {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            enabled = self.client.is_some(),
            endpoint = self.client.as_ref().map(|c| c.endpoint()).unwrap_or("-"),
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "Sync engine started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle(&shutdown).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let status = self.status();
        info!(
            cycles = status.cycles,
            total_synced = status.total_synced,
            total_rejected = status.total_rejected,
            "Sync engine stopped"
        );
        status
    }

    /// Run one delivery cycle and publish its report
    #[instrument(name = "sync_engine_cycle", skip_all)]
    pub async fn run_cycle(&mut self, shutdown: &watch::Receiver<bool>) -> CycleReport {
        let mut report = CycleReport {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        self.deliver(&mut report, shutdown).await;

        report.finished_at = Some(Utc::now());
        self.publish(&report);
        report
    }

    async fn deliver(&mut self, report: &mut CycleReport, shutdown: &watch::Receiver<bool>) {
        let Some(client) = self.client.as_ref() else {
            report.outcome = CycleOutcome::Skipped;
            return;
        };
        if let Some(reason) = &self.halted {
            debug!(reason = %reason, "Delivery halted, skipping cycle");
            report.outcome = CycleOutcome::Skipped;
            report.last_error = Some(reason.clone());
            return;
        }

        let batch = match self.queue.deliverable(self.config.batch_size).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "Failed to read pending measurements");
                report.outcome = CycleOutcome::QueueError;
                report.last_error = Some(e.to_string());
                return;
            }
        };

        report.eligible = batch.len();
        if batch.is_empty() {
            report.outcome = CycleOutcome::Idle;
            return;
        }
        debug!(eligible = batch.len(), "Sync cycle started");

        report.outcome = CycleOutcome::Completed;
        for measurement in &batch {
            if *shutdown.borrow() {
                info!(attempted = report.attempted, "Shutdown requested, ending cycle");
                report.outcome = CycleOutcome::Interrupted;
                break;
            }

            report.attempted += 1;
            match self.attempt(client, measurement).await {
                Ok(ack) => {
                    let marked = self.queue.mark_synced(measurement.id).await;
                    if !settle_ack(report, measurement.id, ack, marked) {
                        break;
                    }
                }
                Err(e) => match e.class() {
                    FailureClass::Transient => {
                        warn!(id = %measurement.id, error = %e, "Delivery failed, ending cycle");
                        report.failed += 1;
                        report.outcome = CycleOutcome::TransportFailure;
                        report.last_error = Some(e.to_string());
                        break;
                    }
                    FailureClass::Rejection => {
                        error!(id = %measurement.id, error = %e, "Measurement rejected by central");
                        report.rejected += 1;
                        report.last_error = Some(e.to_string());
                        if let Err(qe) = self.queue.flag_rejected(measurement.id, e.to_string()).await {
                            warn!(id = %measurement.id, error = %qe, "Failed to flag rejected measurement");
                        }
                    }
                    FailureClass::Authentication => {
                        error!(
                            error = %e,
                            "Central refused credentials; delivery halted until restart"
                        );
                        report.failed += 1;
                        report.outcome = CycleOutcome::AuthRejected;
                        report.last_error = Some(e.to_string());
                        self.halted = Some(e.to_string());
                        break;
                    }
                },
            }
        }
    }

    async fn attempt(&self, client: &C, measurement: &Measurement) -> Result<IngestAck, DeliveryError> {
        let submission = measurement.to_submission(self.config.radar_name.as_deref());
        let started = Instant::now();

        let result = match timeout(self.config.request_timeout, client.submit(&submission)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout {
                after_ms: self.config.request_timeout.as_millis() as u64,
            }),
        };

        observability::record_delivery_latency_ms(started.elapsed().as_secs_f64() * 1000.0);
        result
    }

    fn publish(&self, report: &CycleReport) {
        let halted = self.halted.clone();
        self.status.send_modify(|status| {
            status.cycles += 1;
            status.total_synced += report.synced() as u64;
            status.total_rejected += report.rejected as u64;

            if report.is_failure() {
                status.consecutive_failures = status.consecutive_failures.saturating_add(1);
            } else if matches!(report.outcome, CycleOutcome::Completed | CycleOutcome::Idle) {
                status.consecutive_failures = 0;
            }
            if report.synced() > 0 {
                status.last_success_at = report.finished_at;
            }

            status.halted = halted;
            status.last_cycle = Some(report.clone());
        });

        let status = self.status.borrow();
        observability::record_sync_cycle(report);
        observability::record_sync_health(status.consecutive_failures, status.halted.is_some());

        if report.attempted > 0 {
            info!(
                outcome = observability::outcome_label(report.outcome),
                attempted = report.attempted,
                synced = report.synced(),
                rejected = report.rejected,
                consecutive_failures = status.consecutive_failures,
                "Sync cycle finished"
            );
        }
    }
}

/// Count an acknowledged entry once its Synced transition is on disk
///
/// When the queue cannot record it the entry stays Pending and is resent
/// next cycle (the central side answers with a duplicate). The cycle ends
/// there, since later marks would hit the same queue. Returns whether the
/// cycle may continue.
fn settle_ack(
    report: &mut CycleReport,
    id: MeasurementId,
    ack: IngestAck,
    marked: Result<bool, QueueError>,
) -> bool {
    match marked {
        Ok(_) => {
            match ack {
                IngestAck::Accepted => report.accepted += 1,
                IngestAck::Duplicate => report.duplicates += 1,
            }
            true
        }
        Err(e) => {
            error!(id = %id, error = %e, "Delivered but failed to mark synced, ending cycle");
            report.failed += 1;
            report.outcome = CycleOutcome::QueueError;
            report.last_error = Some(e.to_string());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Direction, MeasurementSubmission};
    use std::collections::{HashSet, VecDeque};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    /// Answers submissions from a script, then accepts everything
    #[derive(Clone, Default)]
    struct ScriptedClient {
        script: Arc<Mutex<VecDeque<Result<IngestAck, DeliveryError>>>>,
        seen: Arc<Mutex<Vec<MeasurementId>>>,
        delay: Option<Duration>,
    }

    impl ScriptedClient {
        fn with_script(script: Vec<Result<IngestAck, DeliveryError>>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                ..Default::default()
            }
        }

        fn seen(&self) -> Vec<MeasurementId> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl IngestClient for ScriptedClient {
        fn endpoint(&self) -> &str {
            "scripted"
        }

        async fn submit(
            &self,
            submission: &MeasurementSubmission,
        ) -> Result<IngestAck, DeliveryError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.seen.lock().unwrap().push(submission.id);
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or(Ok(IngestAck::Accepted))
        }
    }

    fn sample(speed_kmh: f64) -> Measurement {
        Measurement::new("radar-1", Utc::now(), speed_kmh, Direction::AToB, false)
    }

    async fn queue_with(dir: &std::path::Path, count: usize) -> (SharedQueue, Vec<MeasurementId>) {
        let queue = SharedQueue::open(dir.join("queue.journal")).await.unwrap();
        let mut ids = Vec::new();
        for i in 0..count {
            let m = sample(10.0 + i as f64);
            ids.push(m.id);
            queue.append(m).await.unwrap();
        }
        (queue, ids)
    }

    fn config() -> SyncConfig {
        SyncConfig {
            interval: Duration::from_millis(20),
            request_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    fn idle_shutdown() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn test_cycle_syncs_in_creation_order() {
        let dir = tempdir().unwrap();
        let (queue, ids) = queue_with(dir.path(), 3).await;
        let client = ScriptedClient::with_script(vec![Ok(IngestAck::Accepted), Ok(IngestAck::Duplicate)]);

        let mut engine = SyncEngine::new(queue.clone(), Some(client.clone()), config());
        let report = engine.run_cycle(&idle_shutdown()).await;

        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(client.seen(), ids);
        assert_eq!(queue.stats().await.unwrap().pending, 0);

        let status = engine.status();
        assert_eq!(status.total_synced, 3);
        assert!(status.last_success_at.is_some());
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_transport_failure_stops_cycle() {
        let dir = tempdir().unwrap();
        let (queue, ids) = queue_with(dir.path(), 4).await;
        let client = ScriptedClient::with_script(vec![
            Ok(IngestAck::Accepted),
            Err(DeliveryError::transport("connection refused")),
        ]);

        let mut engine = SyncEngine::new(queue.clone(), Some(client.clone()), config());
        let report = engine.run_cycle(&idle_shutdown()).await;

        assert_eq!(report.outcome, CycleOutcome::TransportFailure);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(client.seen(), ids[..2].to_vec());

        let pending: Vec<_> = queue.pending().await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(pending, ids[1..].to_vec());
        assert_eq!(engine.status().consecutive_failures, 1);

        // Link back: next cycle resumes from the oldest pending entry
        let report = engine.run_cycle(&idle_shutdown()).await;
        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.accepted, 3);
        assert_eq!(engine.status().consecutive_failures, 0);
        assert_eq!(queue.stats().await.unwrap().synced, 4);
    }

    #[tokio::test]
    async fn test_server_error_counts_consecutive_failures() {
        let dir = tempdir().unwrap();
        let (queue, _) = queue_with(dir.path(), 1).await;
        let busy = || {
            Err(DeliveryError::Server {
                status: 503,
                message: "busy".into(),
            })
        };
        let client = ScriptedClient::with_script(vec![busy(), busy(), busy()]);

        let mut engine = SyncEngine::new(queue.clone(), Some(client), config());
        for _ in 0..3 {
            engine.run_cycle(&idle_shutdown()).await;
        }

        let status = engine.status();
        assert_eq!(status.consecutive_failures, 3);
        assert_eq!(status.cycles, 3);
        assert!(status.last_success_at.is_none());
        assert_eq!(queue.stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_rejection_flags_entry_and_continues() {
        let dir = tempdir().unwrap();
        let (queue, ids) = queue_with(dir.path(), 3).await;
        let client = ScriptedClient::with_script(vec![
            Ok(IngestAck::Accepted),
            Err(DeliveryError::Rejected {
                status: 422,
                reason: "speed_kmh: out of range".into(),
            }),
        ]);

        let mut engine = SyncEngine::new(queue.clone(), Some(client.clone()), config());
        let report = engine.run_cycle(&idle_shutdown()).await;

        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.synced(), 2);

        let rejected = queue.rejected().await.unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].id, ids[1]);

        // Flagged entries are not retried
        let report = engine.run_cycle(&idle_shutdown()).await;
        assert_eq!(report.outcome, CycleOutcome::Idle);
        assert_eq!(client.seen().len(), 3);
    }

    #[tokio::test]
    async fn test_unauthorized_halts_delivery() {
        let dir = tempdir().unwrap();
        let (queue, _) = queue_with(dir.path(), 2).await;
        let client = ScriptedClient::with_script(vec![Err(DeliveryError::Unauthorized { status: 401 })]);

        let mut engine = SyncEngine::new(queue.clone(), Some(client.clone()), config());
        let report = engine.run_cycle(&idle_shutdown()).await;
        assert_eq!(report.outcome, CycleOutcome::AuthRejected);
        assert!(engine.halted_reason().is_some());

        let report = engine.run_cycle(&idle_shutdown()).await;
        assert_eq!(report.outcome, CycleOutcome::Skipped);
        assert_eq!(client.seen().len(), 1);

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.rejected, 0);
        assert!(engine.status().halted.is_some());
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let dir = tempdir().unwrap();
        let (queue, _) = queue_with(dir.path(), 2).await;
        let client = ScriptedClient {
            delay: Some(Duration::from_secs(2)),
            ..Default::default()
        };

        let mut engine = SyncEngine::new(queue.clone(), Some(client), config());
        let report = engine.run_cycle(&idle_shutdown()).await;

        assert_eq!(report.outcome, CycleOutcome::TransportFailure);
        assert_eq!(report.attempted, 1);
        assert!(report.last_error.unwrap().contains("timed out"));
        assert_eq!(queue.stats().await.unwrap().pending, 2);
    }

    #[test]
    fn test_unrecorded_ack_is_not_counted_synced() {
        let mut report = CycleReport {
            outcome: CycleOutcome::Completed,
            ..Default::default()
        };
        let id = MeasurementId::new();

        assert!(settle_ack(&mut report, id, IngestAck::Accepted, Ok(true)));
        assert!(settle_ack(&mut report, id, IngestAck::Duplicate, Ok(false)));
        assert_eq!(report.synced(), 2);

        let carry_on = settle_ack(&mut report, id, IngestAck::Accepted, Err(QueueError::Poisoned));
        assert!(!carry_on);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.synced(), 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.outcome, CycleOutcome::QueueError);
        assert!(report.is_failure());
    }

    #[tokio::test]
    async fn test_batch_size_limits_cycle() {
        let dir = tempdir().unwrap();
        let (queue, _) = queue_with(dir.path(), 5).await;
        let config = SyncConfig {
            batch_size: 2,
            ..config()
        };

        let mut engine = SyncEngine::new(queue.clone(), Some(ScriptedClient::default()), config);
        let report = engine.run_cycle(&idle_shutdown()).await;

        assert_eq!(report.eligible, 2);
        assert_eq!(queue.stats().await.unwrap().pending, 3);
    }

    #[tokio::test]
    async fn test_disabled_engine_skips() {
        let dir = tempdir().unwrap();
        let (queue, _) = queue_with(dir.path(), 1).await;

        let mut engine = SyncEngine::<ScriptedClient>::new(queue.clone(), None, config());
        let report = engine.run_cycle(&idle_shutdown()).await;

        assert_eq!(report.outcome, CycleOutcome::Skipped);
        assert!(!engine.status().enabled);
        assert_eq!(queue.stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_between_entries() {
        let dir = tempdir().unwrap();
        let (queue, _) = queue_with(dir.path(), 3).await;
        let (tx, rx) = watch::channel(true);

        let mut engine = SyncEngine::new(queue.clone(), Some(ScriptedClient::default()), config());
        let report = engine.run_cycle(&rx).await;

        assert_eq!(report.outcome, CycleOutcome::Interrupted);
        assert_eq!(report.attempted, 0);
        assert_eq!(queue.stats().await.unwrap().pending, 3);
        drop(tx);
    }

    #[tokio::test]
    async fn test_run_publishes_status_until_shutdown() {
        let dir = tempdir().unwrap();
        let (queue, ids) = queue_with(dir.path(), 2).await;
        let client = ScriptedClient::default();

        let engine = SyncEngine::new(queue.clone(), Some(client.clone()), config());
        let mut status_rx = engine.subscribe();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(engine.run(rx));

        timeout(Duration::from_secs(2), async {
            loop {
                status_rx.changed().await.unwrap();
                if status_rx.borrow().total_synced == 2 {
                    break;
                }
            }
        })
        .await
        .unwrap();

        tx.send(true).unwrap();
        let status = timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert!(status.cycles >= 1);

        let seen: HashSet<_> = client.seen().into_iter().collect();
        assert_eq!(seen, ids.into_iter().collect());
    }
}
