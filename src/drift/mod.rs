//! Drift Forecaster
//!
//! For a net in an anomalous state, sends its recent trajectory to the
//! oracle's drift endpoint and attaches the per-horizon positions to the
//! net's latest prediction.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::DriftConfig;
use crate::oracle::{
    call_with_retry, ClassificationError, ClassificationOrchestrator, DriftRequest, OracleError,
    TrajectoryPoint,
};
use crate::storage::{StoreError, TelemetryStore};
use crate::types::{HorizonForecast, NetStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DriftOutcome {
    Forecasted {
        prediction_id: String,
        horizons: Vec<HorizonForecast>,
    },
    /// Net is not suspected or confirmed
    Skipped { status: NetStatus },
}

#[derive(Debug, thiserror::Error)]
pub enum DriftError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("drift oracle call failed: {0}")]
    Oracle(#[from] ClassificationError),
    #[error("net {net_id} has no prediction to attach a forecast to")]
    NoPrediction { net_id: String },
    #[error("net {net_id} has no recorded positions")]
    NoTrajectory { net_id: String },
}

pub struct DriftForecaster {
    store: Arc<dyn TelemetryStore>,
    orchestrator: Arc<ClassificationOrchestrator>,
    config: DriftConfig,
}

impl DriftForecaster {
    /// Shares the orchestrator's oracle, retry policy, timeout and
    /// cancellation token.
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        orchestrator: Arc<ClassificationOrchestrator>,
        config: DriftConfig,
    ) -> Self {
        Self {
            store,
            orchestrator,
            config,
        }
    }

    pub async fn forecast(&self, net_id: &str) -> Result<DriftOutcome, DriftError> {
        let net = self
            .store
            .get_net(net_id)
            .await?
            .ok_or_else(|| StoreError::net_not_found(net_id))?;

        if !net.status.is_anomalous() {
            debug!(net_id = %net_id, status = %net.status, "Drift forecast skipped");
            return Ok(DriftOutcome::Skipped { status: net.status });
        }

        let prediction = self
            .store
            .latest_prediction(net_id)
            .await?
            .ok_or_else(|| DriftError::NoPrediction { net_id: net_id.to_string() })?;

        let pings = self.store.recent_pings(net_id, self.config.trajectory_points).await?;
        let current_location = pings
            .last()
            .map(|p| p.location())
            .or(net.last_known_location)
            .ok_or_else(|| DriftError::NoTrajectory { net_id: net_id.to_string() })?;

        let request = DriftRequest {
            net_id: net_id.to_string(),
            current_location,
            trajectory: pings.iter().map(TrajectoryPoint::from).collect(),
            horizons_hours: self.config.horizons_hours.clone(),
        };

        let oracle = self.orchestrator.oracle();
        let response = call_with_retry(
            self.orchestrator.policy(),
            self.orchestrator.timeout(),
            self.orchestrator.cancel_token(),
            net_id,
            || oracle.forecast_drift(&request),
        )
        .await?;

        let horizons = self.select_horizons(response.forecasts)?;
        self.store.attach_forecasts(&prediction.prediction_id, &horizons).await?;

        info!(
            net_id = %net_id,
            prediction_id = %prediction.prediction_id,
            horizons = horizons.len(),
            "Drift forecast stored"
        );
        Ok(DriftOutcome::Forecasted {
            prediction_id: prediction.prediction_id,
            horizons,
        })
    }

    /// Keep one valid forecast per configured horizon, in configured order.
    fn select_horizons(&self, forecasts: Vec<HorizonForecast>) -> Result<Vec<HorizonForecast>, DriftError> {
        let mut selected = Vec::with_capacity(self.config.horizons_hours.len());
        for hours in &self.config.horizons_hours {
            let forecast = forecasts
                .iter()
                .find(|f| f.horizon_hours == *hours)
                .ok_or_else(|| invalid(format!("missing forecast for {hours}h horizon")))?;
            if !forecast.predicted_location.is_valid() {
                return Err(invalid(format!(
                    "forecast for {hours}h horizon is off the globe: {}",
                    forecast.predicted_location
                )));
            }
            selected.push(forecast.clone());
        }
        Ok(selected)
    }
}

fn invalid(reason: String) -> DriftError {
    DriftError::Oracle(ClassificationError::Rejected(OracleError::InvalidResponse(reason)))
}
