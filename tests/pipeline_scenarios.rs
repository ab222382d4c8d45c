//! End-to-end pipeline scenarios
//!
//! Each test wires a full `GhostNetService` over the in-memory store with a
//! scripted oracle and drives it through the public operations or a
//! `FleetScheduler` sweep.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use seaguard::config::MonitorConfig;
use seaguard::oracle::{DriftRequest, DriftResponse, OracleRequest, OracleResponse};
use seaguard::scheduler::{FleetScheduler, NetResult};
use seaguard::service::{ClassificationOutcome, NetRegistration, PingSubmission};
use seaguard::storage::CasOutcome;
use seaguard::{
    Alert, AppendOutcome, ClassificationError, CoreError, GeoPoint, GhostNetService,
    HorizonForecast, InMemoryStore, Net, NetStatus, OracleError, Ping, Prediction,
    PredictionOracle, RecoveryRecord, StoreError, TelemetryStore, TransitionOutcome,
};

// ============================================================================
// Scripted oracle
// ============================================================================

#[derive(Clone)]
enum Reply {
    Confidence(f64),
    Fail(OracleError),
    /// Never answers (exercises the per-attempt timeout)
    Hang,
    /// Waits for `release` to be notified, then answers
    Gated(f64),
}

#[derive(Default)]
struct ScriptedOracle {
    replies: Mutex<HashMap<String, Reply>>,
    calls: AtomicU32,
    release: Notify,
    entered: Notify,
}

impl ScriptedOracle {
    fn set(&self, net_id: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(net_id.to_string(), reply);
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PredictionOracle for ScriptedOracle {
    async fn predict(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&request.net_id)
            .cloned()
            .unwrap_or(Reply::Confidence(0.1));

        let confidence = match reply {
            Reply::Confidence(c) => c,
            Reply::Fail(e) => return Err(e),
            Reply::Hang => return std::future::pending().await,
            Reply::Gated(c) => {
                self.entered.notify_one();
                self.release.notified().await;
                c
            }
        };
        Ok(OracleResponse {
            confidence,
            label: if confidence >= 0.5 { "ghost" } else { "fishing" }.into(),
            horizon_forecasts: Vec::new(),
        })
    }

    async fn forecast_drift(&self, request: &DriftRequest) -> Result<DriftResponse, OracleError> {
        Ok(DriftResponse {
            forecasts: request
                .horizons_hours
                .iter()
                .map(|h| HorizonForecast {
                    horizon_hours: *h,
                    predicted_location: GeoPoint::new(
                        request.current_location.latitude - 0.02 * f64::from(*h),
                        request.current_location.longitude,
                    ),
                })
                .collect(),
        })
    }

    async fn health(&self) -> Result<(), OracleError> {
        Ok(())
    }
}

// ============================================================================
// Store that stalls after committing a chosen status
// ============================================================================

/// In-memory store whose `set_net_status` can be made to pause after the
/// write has landed, holding the caller between commit and return.
#[derive(Default)]
struct SlowCommitStore {
    inner: InMemoryStore,
    hold: Mutex<Option<NetStatus>>,
    committed: Notify,
    release: Notify,
}

impl SlowCommitStore {
    fn hold_next(&self, status: NetStatus) {
        *self.hold.lock().unwrap() = Some(status);
    }
}

#[async_trait]
impl TelemetryStore for SlowCommitStore {
    async fn append_ping(&self, ping: &Ping) -> Result<AppendOutcome, StoreError> {
        self.inner.append_ping(ping).await
    }

    async fn pings_in_window(
        &self,
        net_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Ping>, StoreError> {
        self.inner.pings_in_window(net_id, from, to).await
    }

    async fn recent_pings(&self, net_id: &str, limit: usize) -> Result<Vec<Ping>, StoreError> {
        self.inner.recent_pings(net_id, limit).await
    }

    async fn insert_net(&self, net: &Net) -> Result<(), StoreError> {
        self.inner.insert_net(net).await
    }

    async fn get_net(&self, net_id: &str) -> Result<Option<Net>, StoreError> {
        self.inner.get_net(net_id).await
    }

    async fn get_net_by_qr_code(&self, qr_code_id: &str) -> Result<Option<Net>, StoreError> {
        self.inner.get_net_by_qr_code(qr_code_id).await
    }

    async fn list_nets(&self) -> Result<Vec<Net>, StoreError> {
        self.inner.list_nets().await
    }

    async fn set_net_status(
        &self,
        net_id: &str,
        expected: NetStatus,
        new: NetStatus,
    ) -> Result<CasOutcome, StoreError> {
        let outcome = self.inner.set_net_status(net_id, expected, new).await?;
        let held = {
            let mut hold = self.hold.lock().unwrap();
            if *hold == Some(new) && outcome == CasOutcome::Applied {
                hold.take()
            } else {
                None
            }
        };
        if held.is_some() {
            self.committed.notify_one();
            self.release.notified().await;
        }
        Ok(outcome)
    }

    async fn set_net_owner(&self, net_id: &str, owner_id: &str) -> Result<Net, StoreError> {
        self.inner.set_net_owner(net_id, owner_id).await
    }

    async fn save_prediction(&self, prediction: &Prediction) -> Result<(), StoreError> {
        self.inner.save_prediction(prediction).await
    }

    async fn latest_prediction(&self, net_id: &str) -> Result<Option<Prediction>, StoreError> {
        self.inner.latest_prediction(net_id).await
    }

    async fn attach_forecasts(
        &self,
        prediction_id: &str,
        forecasts: &[HorizonForecast],
    ) -> Result<(), StoreError> {
        self.inner.attach_forecasts(prediction_id, forecasts).await
    }

    async fn save_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        self.inner.save_alert(alert).await
    }

    async fn get_alert(&self, alert_id: &str) -> Result<Option<Alert>, StoreError> {
        self.inner.get_alert(alert_id).await
    }

    async fn open_alert(&self, net_id: &str) -> Result<Option<Alert>, StoreError> {
        self.inner.open_alert(net_id).await
    }

    async fn alerts_for_net(&self, net_id: &str) -> Result<Vec<Alert>, StoreError> {
        self.inner.alerts_for_net(net_id).await
    }

    async fn save_recovery(&self, record: &RecoveryRecord) -> Result<(), StoreError> {
        self.inner.save_recovery(record).await
    }

    async fn recovery_for_net(&self, net_id: &str) -> Result<Option<RecoveryRecord>, StoreError> {
        self.inner.recovery_for_net(net_id).await
    }

    fn backend_name(&self) -> &'static str {
        "SlowCommit"
    }
}

// ============================================================================
// Fixtures
// ============================================================================

struct Harness {
    service: Arc<GhostNetService>,
    store: Arc<dyn TelemetryStore>,
    oracle: Arc<ScriptedOracle>,
    cancel: CancellationToken,
}

fn harness() -> Harness {
    harness_over(Arc::new(InMemoryStore::new()))
}

fn harness_over(store: Arc<dyn TelemetryStore>) -> Harness {
    let mut config = MonitorConfig::default();
    config.oracle.backoff_jitter = 0.0;

    let oracle = Arc::new(ScriptedOracle::default());
    let cancel = CancellationToken::new();
    let service = Arc::new(GhostNetService::new(
        &config,
        store.clone(),
        oracle.clone(),
        cancel.clone(),
    ));
    Harness { service, store, oracle, cancel }
}

impl Harness {
    async fn net(&self, net_id: &str, status: NetStatus, pings: u32) {
        self.service
            .register_net(NetRegistration {
                net_id: net_id.into(),
                qr_code_id: format!("QR-{net_id}"),
                owner_id: "owner-1".into(),
                deployment_location: GeoPoint::new(-34.0, 18.0),
                deployment_time: Some(Utc::now() - ChronoDuration::days(3)),
            })
            .await
            .unwrap();

        // Evenly spread over the last hour, drifting south-east
        let now = Utc::now();
        for i in 0..pings {
            self.service
                .submit_ping(PingSubmission {
                    net_id: net_id.into(),
                    latitude: -34.0 - 0.002 * f64::from(i),
                    longitude: 18.0 + 0.002 * f64::from(i),
                    timestamp: Some(now - ChronoDuration::minutes(60 - i64::from(i) * 10)),
                    source: None,
                })
                .await
                .unwrap();
        }

        let current = self.store.get_net(net_id).await.unwrap().unwrap().status;
        if status != current {
            self.store.set_net_status(net_id, current, status).await.unwrap();
        }
    }

    async fn status(&self, net_id: &str) -> NetStatus {
        self.service.get_net_status(net_id).await.unwrap().net.status
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn n1_high_confidence_confirms_and_opens_one_alert() {
    let h = harness();
    h.net("N1", NetStatus::Active, 6).await;
    h.oracle.set("N1", Reply::Confidence(0.80));

    let outcome = h.service.run_classification("N1").await.unwrap();
    let transition = match outcome {
        ClassificationOutcome::Classified { transition, .. } => transition,
        other => panic!("expected classification, got {other:?}"),
    };
    assert!(matches!(transition, TransitionOutcome::Transitioned(_)));
    assert_eq!(h.status("N1").await, NetStatus::GhostConfirmed);

    let alerts = h.store.alerts_for_net("N1").await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].previous_status, NetStatus::Active);
    assert_eq!(alerts[0].new_status, NetStatus::GhostConfirmed);
    assert!((alerts[0].confidence - 0.80).abs() < f64::EPSILON);

    let view = h.service.get_net_status("N1").await.unwrap();
    assert!((view.latest_prediction.unwrap().confidence - 0.80).abs() < f64::EPSILON);
    assert!(view.open_alert.is_some());
}

#[tokio::test]
async fn n2_low_confidence_clears_suspicion_and_closes_alert() {
    let h = harness();
    h.net("N2", NetStatus::Active, 6).await;

    h.oracle.set("N2", Reply::Confidence(0.60));
    h.service.run_classification("N2").await.unwrap();
    assert_eq!(h.status("N2").await, NetStatus::GhostSuspected);
    assert!(h.store.open_alert("N2").await.unwrap().is_some());

    h.oracle.set("N2", Reply::Confidence(0.40));
    h.service.run_classification("N2").await.unwrap();

    assert_eq!(h.status("N2").await, NetStatus::Active);
    assert!(h.store.open_alert("N2").await.unwrap().is_none());
    let alerts = h.store.alerts_for_net("N2").await.unwrap();
    assert_eq!(alerts.len(), 1, "de-escalation must not create an alert");
    assert!(alerts[0].resolved_at.is_some());
}

#[tokio::test]
async fn n3_sparse_telemetry_skips_classification() {
    let h = harness();
    h.net("N3", NetStatus::Active, 3).await;
    h.oracle.set("N3", Reply::Confidence(0.99));

    let outcome = h.service.run_classification("N3").await.unwrap();
    assert_eq!(outcome, ClassificationOutcome::InsufficientData { found: 3, required: 5 });
    assert_eq!(h.status("N3").await, NetStatus::Active);
    assert!(h.store.latest_prediction("N3").await.unwrap().is_none());
    assert_eq!(h.oracle.calls(), 0);
}

#[tokio::test]
async fn n4_recovery_wins_over_in_flight_classification() {
    let h = harness();
    h.net("N4", NetStatus::GhostSuspected, 6).await;
    h.oracle.set("N4", Reply::Gated(0.9));

    let classify = tokio::spawn({
        let service = Arc::clone(&h.service);
        async move { service.run_classification("N4").await }
    });
    h.oracle.entered.notified().await;

    h.service
        .confirm_recovery("N4", Some("MV Orca".into()), Some("hauled aboard".into()))
        .await
        .unwrap();
    h.oracle.release.notify_one();

    let outcome = classify.await.unwrap().unwrap();
    let (transition, alert) = match outcome {
        ClassificationOutcome::Classified { transition, alert, .. } => (transition, alert),
        other => panic!("expected classification, got {other:?}"),
    };
    assert!(transition.transition().is_none(), "stale write must be dropped: {transition:?}");
    assert!(alert.is_none());
    assert_eq!(h.status("N4").await, NetStatus::Recovered);

    let view = h.service.get_net_status("N4").await.unwrap();
    assert_eq!(view.recovery.unwrap().recovered_by.as_deref(), Some("MV Orca"));
    assert!(view.latest_prediction.is_none(), "overtaken prediction must not be stored");
    assert!(view.net.last_prediction_id.is_none());
    assert!(h.store.latest_prediction("N4").await.unwrap().is_none());
}

#[tokio::test]
async fn escalation_committed_before_recovery_leaves_no_open_alert() {
    let store = Arc::new(SlowCommitStore::default());
    let h = harness_over(store.clone());
    h.net("N9", NetStatus::Active, 6).await;
    h.oracle.set("N9", Reply::Confidence(0.9));
    store.hold_next(NetStatus::GhostConfirmed);

    let classify = tokio::spawn({
        let service = Arc::clone(&h.service);
        async move { service.run_classification("N9").await }
    });

    // active → ghost_confirmed is committed but the classification has not
    // reached alert bookkeeping yet
    store.committed.notified().await;
    assert_eq!(h.status("N9").await, NetStatus::GhostConfirmed);
    h.service.confirm_recovery("N9", None, None).await.unwrap();
    store.release.notify_one();

    let outcome = classify.await.unwrap().unwrap();
    let transition = match outcome {
        ClassificationOutcome::Classified { transition, .. } => transition,
        other => panic!("expected classification, got {other:?}"),
    };
    assert!(matches!(transition, TransitionOutcome::Transitioned(_)));

    assert_eq!(h.status("N9").await, NetStatus::Recovered);
    assert!(h.store.open_alert("N9").await.unwrap().is_none());
    assert!(h.store.alerts_for_net("N9").await.unwrap().is_empty());
}

#[tokio::test]
async fn repeated_escalations_keep_a_single_open_alert() {
    let h = harness();
    h.net("N5", NetStatus::Active, 6).await;

    for confidence in [0.55, 0.65, 0.80, 0.95, 0.60] {
        h.oracle.set("N5", Reply::Confidence(confidence));
        h.service.run_classification("N5").await.unwrap();
        let open = h
            .store
            .alerts_for_net("N5")
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.is_open())
            .count();
        assert_eq!(open, 1, "after confidence {confidence}");
    }

    let alert = h.store.open_alert("N5").await.unwrap().unwrap();
    assert_eq!(alert.previous_status, NetStatus::Active);
    assert_eq!(alert.new_status, NetStatus::GhostConfirmed);
    assert_eq!(h.status("N5").await, NetStatus::GhostConfirmed);
}

#[tokio::test(start_paused = true)]
async fn oracle_timeouts_exhaust_retries_and_leave_status() {
    let h = harness();
    h.net("N6", NetStatus::GhostSuspected, 6).await;
    h.oracle.set("N6", Reply::Hang);

    let started = tokio::time::Instant::now();
    let err = h.service.run_classification("N6").await.unwrap_err();

    assert!(matches!(
        err,
        CoreError::Classification(ClassificationError::Exhausted { attempts: 4, last: OracleError::Timeout(_) })
    ));
    assert!(err.is_degraded());
    assert_eq!(h.oracle.calls(), 4);
    // 4 × 10s timeouts plus 0.5s + 1s + 2s backoff
    assert_eq!(started.elapsed(), Duration::from_millis(43_500));
    assert_eq!(h.status("N6").await, NetStatus::GhostSuspected);
    assert!(h.store.latest_prediction("N6").await.unwrap().is_none());
}

#[tokio::test]
async fn oracle_rejection_is_not_retried() {
    let h = harness();
    h.net("N7", NetStatus::Active, 6).await;
    h.oracle.set("N7", Reply::Fail(OracleError::Rejected("feature count mismatch".into())));

    let err = h.service.run_classification("N7").await.unwrap_err();
    assert!(matches!(err, CoreError::Classification(ClassificationError::Rejected(_))));
    assert_eq!(h.oracle.calls(), 1);
    assert_eq!(h.status("N7").await, NetStatus::Active);
}

#[tokio::test]
async fn recovered_net_is_never_touched_again() {
    let h = harness();
    h.net("N8", NetStatus::GhostConfirmed, 6).await;
    h.service.confirm_recovery("N8", None, None).await.unwrap();
    h.oracle.set("N8", Reply::Confidence(0.99));

    assert_eq!(
        h.service.run_classification("N8").await.unwrap(),
        ClassificationOutcome::Skipped { status: NetStatus::Recovered }
    );

    let scheduler = FleetScheduler::new(Arc::clone(&h.service), MonitorConfig::default().jobs, h.cancel.clone());
    assert!(scheduler.classification_sweep().await.unwrap().outcomes.is_empty());
    assert!(scheduler.drift_sweep().await.unwrap().outcomes.is_empty());
    assert_eq!(h.status("N8").await, NetStatus::Recovered);
    assert_eq!(h.oracle.calls(), 0);
}

#[tokio::test]
async fn sweeps_classify_then_forecast_the_fleet() {
    let h = harness();
    h.net("A", NetStatus::Active, 6).await;
    h.net("B", NetStatus::Active, 6).await;
    h.net("C", NetStatus::Active, 2).await;
    h.oracle.set("A", Reply::Confidence(0.9));
    h.oracle.set("B", Reply::Fail(OracleError::Rejected("bad".into())));

    let scheduler = FleetScheduler::new(Arc::clone(&h.service), MonitorConfig::default().jobs, h.cancel.clone());
    let report = scheduler.classification_sweep().await.unwrap();

    assert_eq!(report.outcome("A"), Some(&NetResult::Transitioned { from: NetStatus::Active, to: NetStatus::GhostConfirmed }));
    assert!(matches!(report.outcome("B"), Some(NetResult::Failed { .. })));
    assert_eq!(report.outcome("C"), Some(&NetResult::InsufficientData { found: 2 }));

    let drift = scheduler.drift_sweep().await.unwrap();
    assert_eq!(drift.outcomes.len(), 1);
    assert_eq!(drift.outcome("A"), Some(&NetResult::Forecasted { horizons: 3 }));

    let latest = h.store.latest_prediction("A").await.unwrap().unwrap();
    let hours: Vec<u32> = latest.horizon_forecasts.iter().map(|f| f.horizon_hours).collect();
    assert_eq!(hours, vec![6, 24, 72]);
}
