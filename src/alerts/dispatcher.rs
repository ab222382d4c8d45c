//! Turns persisted status transitions into alert records
//!
//! Escalations open an alert, or update the net's one open alert. Anything
//! else closes the open alert if there is one. Bookkeeping for a net is
//! serialized by a per-net lock so two racing escalations cannot both see
//! "no open alert".
//!
//! Transitions can reach the dispatcher out of commit order. A transition
//! whose target is no longer the net's stored status is superseded and left
//! alone: the transition that moved the net on owns the alert bookkeeping.

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::NotificationChannel;
use crate::config::{AlertCloseMode, AlertConfig};
use crate::lifecycle::Transition;
use crate::storage::{StoreError, TelemetryStore};
use crate::types::{Alert, NetStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "alert", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Opened(Alert),
    /// A further escalation refreshed the existing open alert
    Updated(Alert),
    Closed(Alert),
    /// Non-escalating transition with no open alert to close
    Ignored,
    /// The net has moved on since this transition was committed
    Superseded { current: NetStatus },
}

pub struct AlertDispatcher {
    store: Arc<dyn TelemetryStore>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    close_mode: AlertCloseMode,
    net_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AlertDispatcher {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        config: &AlertConfig,
    ) -> Self {
        Self {
            store,
            channels,
            close_mode: config.close_mode,
            net_locks: DashMap::new(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub async fn on_transition(&self, transition: &Transition) -> Result<DispatchOutcome, StoreError> {
        let lock = Arc::clone(self.net_locks.entry(transition.net_id.clone()).or_default().value());
        let _guard = lock.lock().await;

        let current = self
            .store
            .get_net(&transition.net_id)
            .await?
            .ok_or_else(|| StoreError::net_not_found(&transition.net_id))?
            .status;
        if current != transition.new {
            debug!(
                net_id = %transition.net_id,
                to = %transition.new,
                current = %current,
                "Transition superseded, alert left as is"
            );
            return Ok(DispatchOutcome::Superseded { current });
        }

        let open = self.store.open_alert(&transition.net_id).await?;

        if transition.is_escalation() {
            let confidence = transition.confidence.unwrap_or_default();
            let outcome = match open {
                Some(mut alert) => {
                    alert.new_status = transition.new;
                    alert.confidence = confidence;
                    alert.updated_at = Some(Utc::now());
                    self.store.save_alert(&alert).await?;
                    info!(net_id = %alert.net_id, alert_id = %alert.alert_id, status = %alert.new_status, "Open alert escalated");
                    DispatchOutcome::Updated(alert)
                }
                None => {
                    let alert = Alert::open(&transition.net_id, transition.previous, transition.new, confidence);
                    self.store.save_alert(&alert).await?;
                    info!(net_id = %alert.net_id, alert_id = %alert.alert_id, status = %alert.new_status, confidence, "Alert opened");
                    DispatchOutcome::Opened(alert)
                }
            };
            if let DispatchOutcome::Opened(alert) | DispatchOutcome::Updated(alert) = &outcome {
                self.deliver(alert);
            }
            return Ok(outcome);
        }

        match open {
            Some(mut alert) => {
                self.close(&mut alert);
                self.store.save_alert(&alert).await?;
                info!(
                    net_id = %alert.net_id,
                    alert_id = %alert.alert_id,
                    to = %transition.new,
                    "Alert closed"
                );
                Ok(DispatchOutcome::Closed(alert))
            }
            None => {
                debug!(net_id = %transition.net_id, to = %transition.new, "No open alert to close");
                Ok(DispatchOutcome::Ignored)
            }
        }
    }

    /// Manual acknowledgement. `None` when the alert does not exist.
    pub async fn acknowledge(&self, alert_id: &str) -> Result<Option<Alert>, StoreError> {
        let Some(mut alert) = self.store.get_alert(alert_id).await? else {
            return Ok(None);
        };
        let lock = Arc::clone(self.net_locks.entry(alert.net_id.clone()).or_default().value());
        let _guard = lock.lock().await;

        if !alert.acknowledged {
            alert.acknowledged = true;
            alert.updated_at = Some(Utc::now());
            self.store.save_alert(&alert).await?;
            info!(alert_id = %alert_id, net_id = %alert.net_id, "Alert acknowledged");
        }
        Ok(Some(alert))
    }

    fn close(&self, alert: &mut Alert) {
        let now = Utc::now();
        match self.close_mode {
            AlertCloseMode::Resolve => alert.resolved_at = Some(now),
            AlertCloseMode::Acknowledge => alert.acknowledged = true,
        }
        alert.updated_at = Some(now);
    }

    /// Spawn one delivery per channel. Failures are logged and never reach
    /// the caller.
    fn deliver(&self, alert: &Alert) {
        for channel in &self.channels {
            let channel = Arc::clone(channel);
            let alert = alert.clone();
            tokio::spawn(async move {
                if let Err(e) = channel.deliver(&alert).await {
                    warn!(alert_id = %alert.alert_id, error = %e, "Alert delivery failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{ChannelKind, DeliveryError};
    use crate::storage::InMemoryStore;
    use crate::types::{GeoPoint, Net};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct RecordingChannel(mpsc::UnboundedSender<Alert>);

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Push
        }

        async fn deliver(&self, alert: &Alert) -> Result<(), DeliveryError> {
            let _ = self.0.send(alert.clone());
            Ok(())
        }
    }

    struct BrokenChannel;

    #[async_trait]
    impl NotificationChannel for BrokenChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Sms
        }

        async fn deliver(&self, _alert: &Alert) -> Result<(), DeliveryError> {
            Err(DeliveryError {
                channel: ChannelKind::Sms,
                reason: "gateway down".into(),
            })
        }
    }

    fn transition(previous: NetStatus, new: NetStatus, confidence: Option<f64>) -> Transition {
        Transition {
            net_id: "N1".into(),
            previous,
            new,
            confidence,
            at: Utc::now(),
        }
    }

    /// Commit `previous → new` for net N1 in the store, the way the
    /// lifecycle manager would, and return the matching transition.
    async fn committed(
        store: &InMemoryStore,
        previous: NetStatus,
        new: NetStatus,
        confidence: Option<f64>,
    ) -> Transition {
        if store.get_net("N1").await.unwrap().is_none() {
            let net = Net::register("N1", "QR-N1", "owner-1", GeoPoint::new(-34.0, 18.0), Utc::now());
            store.insert_net(&net).await.unwrap();
        }
        let current = store.get_net("N1").await.unwrap().unwrap().status;
        if current != new {
            store.set_net_status("N1", current, new).await.unwrap();
        }
        transition(previous, new, confidence)
    }

    fn dispatcher(store: Arc<InMemoryStore>, mode: AlertCloseMode) -> AlertDispatcher {
        let config = AlertConfig {
            close_mode: mode,
            ..AlertConfig::default()
        };
        AlertDispatcher::new(store, vec![Arc::new(BrokenChannel)], &config)
    }

    #[tokio::test]
    async fn test_repeated_escalation_keeps_one_open_alert() {
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher(store.clone(), AlertCloseMode::Resolve);

        let first = d
            .on_transition(&committed(&store, NetStatus::Active, NetStatus::GhostSuspected, Some(0.6)).await)
            .await
            .unwrap();
        let DispatchOutcome::Opened(opened) = first else {
            panic!("expected a new alert, got {first:?}");
        };

        let second = d
            .on_transition(&committed(&store, NetStatus::GhostSuspected, NetStatus::GhostConfirmed, Some(0.9)).await)
            .await
            .unwrap();
        let DispatchOutcome::Updated(updated) = second else {
            panic!("expected the open alert to be updated, got {second:?}");
        };

        assert_eq!(updated.alert_id, opened.alert_id);
        assert_eq!(updated.new_status, NetStatus::GhostConfirmed);
        assert!((updated.confidence - 0.9).abs() < f64::EPSILON);

        let alerts = store.alerts_for_net("N1").await.unwrap();
        assert_eq!(alerts.iter().filter(|a| a.is_open()).count(), 1);
        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_deescalation_resolves_open_alert() {
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher(store.clone(), AlertCloseMode::Resolve);

        d.on_transition(&committed(&store, NetStatus::Active, NetStatus::GhostSuspected, Some(0.6)).await)
            .await
            .unwrap();
        let outcome = d
            .on_transition(&committed(&store, NetStatus::GhostSuspected, NetStatus::Active, Some(0.4)).await)
            .await
            .unwrap();

        let DispatchOutcome::Closed(closed) = outcome else {
            panic!("expected closure, got {outcome:?}");
        };
        assert!(closed.resolved_at.is_some());
        assert!(!closed.acknowledged);
        assert!(store.open_alert("N1").await.unwrap().is_none());
        assert_eq!(store.alerts_for_net("N1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_acknowledge_close_mode() {
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher(store.clone(), AlertCloseMode::Acknowledge);

        d.on_transition(&committed(&store, NetStatus::Active, NetStatus::GhostConfirmed, Some(0.8)).await)
            .await
            .unwrap();
        let outcome = d
            .on_transition(&committed(&store, NetStatus::GhostConfirmed, NetStatus::Recovered, None).await)
            .await
            .unwrap();

        let DispatchOutcome::Closed(closed) = outcome else {
            panic!("expected closure, got {outcome:?}");
        };
        assert!(closed.acknowledged);
        assert!(closed.resolved_at.is_none());
    }

    #[tokio::test]
    async fn test_deescalation_without_alert_is_ignored() {
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher(store.clone(), AlertCloseMode::Resolve);
        let outcome = d
            .on_transition(&committed(&store, NetStatus::GhostSuspected, NetStatus::Active, Some(0.2)).await)
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert!(store.alerts_for_net("N1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_channels_receive_escalations() {
        let store = Arc::new(InMemoryStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let d = AlertDispatcher::new(
            store.clone(),
            vec![Arc::new(RecordingChannel(tx)), Arc::new(BrokenChannel)],
            &AlertConfig::default(),
        );

        let outcome = d
            .on_transition(&committed(&store, NetStatus::Active, NetStatus::GhostConfirmed, Some(0.8)).await)
            .await
            .unwrap();
        let DispatchOutcome::Opened(opened) = outcome else {
            panic!("expected a new alert, got {outcome:?}");
        };

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.alert_id, opened.alert_id);
    }

    #[tokio::test]
    async fn test_manual_acknowledge() {
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher(store.clone(), AlertCloseMode::Resolve);
        let DispatchOutcome::Opened(opened) = d
            .on_transition(&committed(&store, NetStatus::Active, NetStatus::GhostSuspected, Some(0.55)).await)
            .await
            .unwrap()
        else {
            panic!("expected a new alert");
        };

        let acked = d.acknowledge(&opened.alert_id).await.unwrap().unwrap();
        assert!(acked.acknowledged);
        assert!(store.open_alert("N1").await.unwrap().is_none());
        assert!(d.acknowledge("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_escalation_landing_after_recovery_opens_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher(store.clone(), AlertCloseMode::Resolve);

        // Escalation committed, then recovery committed and dispatched first
        let escalation = committed(&store, NetStatus::Active, NetStatus::GhostConfirmed, Some(0.9)).await;
        let recovery = committed(&store, NetStatus::GhostConfirmed, NetStatus::Recovered, None).await;
        assert_eq!(d.on_transition(&recovery).await.unwrap(), DispatchOutcome::Ignored);

        let late = d.on_transition(&escalation).await.unwrap();
        assert_eq!(late, DispatchOutcome::Superseded { current: NetStatus::Recovered });
        assert!(store.open_alert("N1").await.unwrap().is_none());
        assert!(store.alerts_for_net("N1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_late_deescalation_keeps_newer_alert_open() {
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher(store.clone(), AlertCloseMode::Resolve);

        committed(&store, NetStatus::Active, NetStatus::GhostSuspected, Some(0.6)).await;
        let calm = committed(&store, NetStatus::GhostSuspected, NetStatus::Active, Some(0.3)).await;
        let again = committed(&store, NetStatus::Active, NetStatus::GhostSuspected, Some(0.7)).await;

        assert!(matches!(d.on_transition(&again).await.unwrap(), DispatchOutcome::Opened(_)));
        assert_eq!(
            d.on_transition(&calm).await.unwrap(),
            DispatchOutcome::Superseded { current: NetStatus::GhostSuspected }
        );
        assert!(store.open_alert("N1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_net_is_an_error() {
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher(store, AlertCloseMode::Resolve);
        let err = d
            .on_transition(&transition(NetStatus::Active, NetStatus::GhostSuspected, Some(0.6)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
