//! GhostNetService - the operations the transport layer calls
//!
//! Owns one instance of every pipeline component and wires them together:
//!
//! ```text
//! submit_ping ──► store
//! run_classification: store ► FeatureExtractor ► ClassificationOrchestrator
//!                     ► LifecycleManager (CAS) ► AlertDispatcher
//! run_drift_forecast: DriftForecaster ► store
//! confirm_recovery:   LifecycleManager (CAS loop) ► AlertDispatcher
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alerts::{channels_from_config, AlertDispatcher, DispatchOutcome, NotificationChannel};
use crate::config::{defaults, MonitorConfig};
use crate::drift::{DriftForecaster, DriftOutcome};
use crate::error::{CoreError, ValidationError};
use crate::features::{FeatureExtractor, FeatureOutcome};
use crate::lifecycle::{LifecycleManager, NetEvent, TransitionOutcome};
use crate::oracle::{ClassificationOrchestrator, PredictionOracle};
use crate::storage::{StoreError, TelemetryStore};
use crate::types::{
    Alert, AppendOutcome, GeoPoint, Net, NetStatus, Ping, PingSource, PredictionSummary,
    RecoveryRecord,
};

// ============================================================================
// Request / Response Types
// ============================================================================

/// Inbound ping. Timestamp defaults to now, source to LoRa.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PingSubmission {
    pub net_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<PingSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetRegistration {
    pub net_id: String,
    pub qr_code_id: String,
    pub owner_id: String,
    pub deployment_location: GeoPoint,
    /// Defaults to now
    #[serde(default)]
    pub deployment_time: Option<DateTime<Utc>>,
}

/// Net plus everything an operator needs to judge it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NetView {
    pub net: Net,
    pub latest_prediction: Option<PredictionSummary>,
    pub open_alert: Option<Alert>,
    pub recovery: Option<RecoveryRecord>,
}

/// What one classification cycle did for a net.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClassificationOutcome {
    /// Terminal net, never classified again
    Skipped { status: NetStatus },
    InsufficientData { found: usize, required: usize },
    Classified {
        prediction: PredictionSummary,
        transition: TransitionOutcome,
        /// `None` when no transition happened or alert bookkeeping failed
        alert: Option<DispatchOutcome>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    /// Store fine, oracle unreachable: pings are accepted, classification stalls
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub store_backend: &'static str,
    pub store_error: Option<String>,
    pub oracle_error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

// ============================================================================
// Service
// ============================================================================

pub struct GhostNetService {
    store: Arc<dyn TelemetryStore>,
    extractor: FeatureExtractor,
    orchestrator: Arc<ClassificationOrchestrator>,
    lifecycle: LifecycleManager,
    dispatcher: AlertDispatcher,
    forecaster: DriftForecaster,
}

impl GhostNetService {
    /// Build with the notification channels enabled in `config.alerts`.
    pub fn new(
        config: &MonitorConfig,
        store: Arc<dyn TelemetryStore>,
        oracle: Arc<dyn PredictionOracle>,
        cancel: CancellationToken,
    ) -> Self {
        Self::with_channels(config, store, oracle, channels_from_config(&config.alerts), cancel)
    }

    pub fn with_channels(
        config: &MonitorConfig,
        store: Arc<dyn TelemetryStore>,
        oracle: Arc<dyn PredictionOracle>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        cancel: CancellationToken,
    ) -> Self {
        let orchestrator = Arc::new(ClassificationOrchestrator::new(oracle, &config.oracle, cancel));

        Self {
            extractor: FeatureExtractor::new(Arc::clone(&store), config.features.clone()),
            lifecycle: LifecycleManager::new(Arc::clone(&store), config.detection),
            dispatcher: AlertDispatcher::new(Arc::clone(&store), channels, &config.alerts),
            forecaster: DriftForecaster::new(
                Arc::clone(&store),
                Arc::clone(&orchestrator),
                config.drift.clone(),
            ),
            orchestrator,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn TelemetryStore> {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Registration & ingestion
    // ------------------------------------------------------------------------

    pub async fn register_net(&self, registration: NetRegistration) -> Result<Net, CoreError> {
        ValidationError::check_not_empty("net_id", &registration.net_id)?;
        ValidationError::check_not_empty("qr_code_id", &registration.qr_code_id)?;
        ValidationError::check_not_empty("owner_id", &registration.owner_id)?;
        let location = registration.deployment_location;
        ValidationError::check_coordinates(location.latitude, location.longitude)?;

        if self.store.get_net_by_qr_code(&registration.qr_code_id).await?.is_some() {
            return Err(ValidationError::DuplicateQrCode(registration.qr_code_id).into());
        }

        let net = Net::register(
            registration.net_id,
            registration.qr_code_id,
            registration.owner_id,
            location,
            registration.deployment_time.unwrap_or_else(Utc::now),
        );
        match self.store.insert_net(&net).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists { id, .. }) => {
                return Err(ValidationError::DuplicateNet(id).into());
            }
            Err(e) => return Err(e.into()),
        }

        info!(net_id = %net.net_id, qr_code_id = %net.qr_code_id, "Net registered");
        Ok(net)
    }

    /// Hand a net over to another owner. Status cannot be changed this way.
    pub async fn update_net_owner(&self, net_id: &str, owner_id: &str) -> Result<Net, CoreError> {
        ValidationError::check_not_empty("owner_id", owner_id)?;
        let previous = self.require_net(net_id).await?.owner_id;

        let net = self.store.set_net_owner(net_id, owner_id).await?;
        info!(net_id = %net_id, from = %previous, to = %owner_id, "Net owner reassigned");
        Ok(net)
    }

    /// Validate and append one ping. A duplicate is reported, not rejected.
    pub async fn submit_ping(&self, submission: PingSubmission) -> Result<AppendOutcome, CoreError> {
        ValidationError::check_not_empty("net_id", &submission.net_id)?;
        ValidationError::check_coordinates(submission.latitude, submission.longitude)?;
        if self.store.get_net(&submission.net_id).await?.is_none() {
            return Err(ValidationError::UnknownNet(submission.net_id).into());
        }

        let ping = Ping::new(
            submission.net_id,
            submission.latitude,
            submission.longitude,
            submission.timestamp.unwrap_or_else(Utc::now),
            submission.source.unwrap_or_default(),
        );
        let outcome = self.store.append_ping(&ping).await?;
        debug!(net_id = %ping.net_id, source = %ping.source, ?outcome, "Ping received");
        Ok(outcome)
    }

    /// Append up to `MAX_PING_BATCH` pings. Each one stands alone: a bad ping
    /// fails only its own slot in the result.
    pub async fn submit_pings(
        &self,
        batch: Vec<PingSubmission>,
    ) -> Result<Vec<Result<AppendOutcome, CoreError>>, CoreError> {
        if batch.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        if batch.len() > defaults::MAX_PING_BATCH {
            return Err(ValidationError::BatchTooLarge {
                size: batch.len(),
                max: defaults::MAX_PING_BATCH,
            }
            .into());
        }

        let mut results = Vec::with_capacity(batch.len());
        for submission in batch {
            results.push(self.submit_ping(submission).await);
        }
        Ok(results)
    }

    // ------------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------------

    /// One classification cycle for one net.
    ///
    /// An oracle failure returns `CoreError::Classification` and leaves the
    /// net untouched. A result overtaken by a recovery or a competing status
    /// write is not persisted. Alert bookkeeping failures are logged and swallowed:
    /// the status change has already been committed.
    pub async fn run_classification(&self, net_id: &str) -> Result<ClassificationOutcome, CoreError> {
        let net = self.require_net(net_id).await?;
        if net.status.is_terminal() {
            return Ok(ClassificationOutcome::Skipped { status: net.status });
        }

        let features = match self.extractor.extract(&net, Utc::now()).await? {
            FeatureOutcome::Ready(features) => features,
            FeatureOutcome::InsufficientData { found, required } => {
                return Ok(ClassificationOutcome::InsufficientData { found, required });
            }
        };

        let prediction = match self.orchestrator.classify(features).await {
            Ok(prediction) => prediction,
            Err(e) => {
                warn!(net_id = %net_id, error = %e, "No fresh classification, status unchanged");
                return Err(e.into());
            }
        };
        let transition = self
            .lifecycle
            .apply(net_id, NetEvent::Prediction { confidence: prediction.confidence })
            .await?;
        if transition.is_stale() {
            debug!(net_id = %net_id, ?transition, "Classification overtaken, prediction dropped");
        } else {
            self.store.save_prediction(&prediction).await?;
        }
        let alert = match transition.transition() {
            Some(t) => self.dispatch(t).await,
            None => None,
        };

        Ok(ClassificationOutcome::Classified {
            prediction: PredictionSummary::from(&prediction),
            transition,
            alert,
        })
    }

    pub async fn run_drift_forecast(&self, net_id: &str) -> Result<DriftOutcome, CoreError> {
        self.require_net(net_id).await?;
        Ok(self.forecaster.forecast(net_id).await?)
    }

    /// Force the net into `recovered` and record who recovered it.
    pub async fn confirm_recovery(
        &self,
        net_id: &str,
        recovered_by: Option<String>,
        recovery_notes: Option<String>,
    ) -> Result<RecoveryRecord, CoreError> {
        self.require_net(net_id).await?;

        let outcome = self.lifecycle.confirm_recovery(net_id).await?;
        let record = RecoveryRecord {
            net_id: net_id.to_string(),
            recovered_by,
            recovery_notes,
            recovered_at: Utc::now(),
        };
        self.store.save_recovery(&record).await?;

        if let Some(t) = outcome.transition() {
            self.dispatch(t).await;
        }
        info!(net_id = %net_id, recovered_by = ?record.recovered_by, "Net recovery confirmed");
        Ok(record)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn get_net_status(&self, net_id: &str) -> Result<NetView, CoreError> {
        let net = self.require_net(net_id).await?;
        self.view(net).await
    }

    pub async fn get_net_by_qr_code(&self, qr_code_id: &str) -> Result<NetView, CoreError> {
        let net = self
            .store
            .get_net_by_qr_code(qr_code_id)
            .await?
            .ok_or_else(|| ValidationError::UnknownNet(format!("qr:{qr_code_id}")))?;
        self.view(net).await
    }

    pub async fn list_nets(&self) -> Result<Vec<Net>, CoreError> {
        Ok(self.store.list_nets().await?)
    }

    pub async fn acknowledge_alert(&self, alert_id: &str) -> Result<Alert, CoreError> {
        self.dispatcher
            .acknowledge(alert_id)
            .await?
            .ok_or_else(|| ValidationError::UnknownAlert(alert_id.to_string()).into())
    }

    /// Probe the store and the oracle. Never fails itself.
    pub async fn health(&self) -> HealthReport {
        let store_error = self
            .store
            .get_net("__health_probe__")
            .await
            .err()
            .map(|e| e.to_string());
        let oracle_error = self
            .orchestrator
            .oracle()
            .health()
            .await
            .err()
            .map(|e| e.to_string());

        let status = match (&store_error, &oracle_error) {
            (Some(_), _) => HealthStatus::Unhealthy,
            (None, Some(_)) => HealthStatus::Degraded,
            (None, None) => HealthStatus::Ok,
        };
        HealthReport {
            status,
            store_backend: self.store.backend_name(),
            store_error,
            oracle_error,
            checked_at: Utc::now(),
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn require_net(&self, net_id: &str) -> Result<Net, CoreError> {
        self.store
            .get_net(net_id)
            .await?
            .ok_or_else(|| ValidationError::UnknownNet(net_id.to_string()).into())
    }

    async fn view(&self, net: Net) -> Result<NetView, CoreError> {
        let latest_prediction = self
            .store
            .latest_prediction(&net.net_id)
            .await?
            .as_ref()
            .map(PredictionSummary::from);
        let open_alert = self.store.open_alert(&net.net_id).await?;
        let recovery = self.store.recovery_for_net(&net.net_id).await?;
        Ok(NetView {
            net,
            latest_prediction,
            open_alert,
            recovery,
        })
    }

    async fn dispatch(&self, transition: &crate::lifecycle::Transition) -> Option<DispatchOutcome> {
        match self.dispatcher.on_transition(transition).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(net_id = %transition.net_id, error = %e, "Alert bookkeeping failed, transition kept");
                None
            }
        }
    }
}
