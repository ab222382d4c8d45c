//! Prediction Oracle - the external scoring service and everything around it
//!
//! - `PredictionOracle`: the collaborator seam (HTTP in production, fakes in tests)
//! - `RetryPolicy`: attempts, backoff curve and the retryable-error predicate
//! - `ClassificationOrchestrator`: timeout + retry + per-net single-flight
//! - `HttpOracle`: reqwest client for the ML service

mod http;
mod orchestrator;
mod retry;

pub use http::HttpOracle;
pub use orchestrator::ClassificationOrchestrator;
pub use retry::{call_with_retry, RetryPolicy};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::features::FeatureVector;
use crate::types::{GeoPoint, HorizonForecast, Ping};

// ============================================================================
// Wire Types
// ============================================================================

/// Classification request: one net's feature vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleRequest {
    pub net_id: String,
    pub features: FeatureVector,
}

impl From<FeatureVector> for OracleRequest {
    fn from(features: FeatureVector) -> Self {
        Self {
            net_id: features.net_id.clone(),
            features,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleResponse {
    /// Probability the net is a ghost net
    pub confidence: f64,
    pub label: String,
    #[serde(default)]
    pub horizon_forecasts: Vec<HorizonForecast>,
}

/// One fix of the trajectory sent with a drift request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrajectoryPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&Ping> for TrajectoryPoint {
    fn from(p: &Ping) -> Self {
        Self {
            latitude: p.latitude,
            longitude: p.longitude,
            timestamp: p.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriftRequest {
    pub net_id: String,
    pub current_location: GeoPoint,
    /// Oldest first
    pub trajectory: Vec<TrajectoryPoint>,
    pub horizons_hours: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriftResponse {
    pub forecasts: Vec<HorizonForecast>,
}

// ============================================================================
// Errors
// ============================================================================

/// Failure of a single oracle attempt.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum OracleError {
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    /// The oracle refused the request as malformed
    #[error("oracle rejected request: {0}")]
    Rejected(String),
    /// The oracle answered, but the answer breaks the response contract
    #[error("invalid oracle response: {0}")]
    InvalidResponse(String),
}

impl OracleError {
    /// Timeouts and unavailability are worth another attempt; contract
    /// errors on either side are not.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

/// Outcome of a full (retried) oracle call that produced no result.
///
/// Never a low-confidence reading: callers treat it as "no fresh information".
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ClassificationError {
    #[error("oracle still failing after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: OracleError },
    #[error("{0}")]
    Rejected(OracleError),
    #[error("oracle call cancelled")]
    Cancelled,
}

// ============================================================================
// Collaborator Trait
// ============================================================================

/// External scoring service.
///
/// Implementations make exactly one attempt per call; timeouts and retries
/// are layered on top by `call_with_retry`.
#[async_trait]
pub trait PredictionOracle: Send + Sync {
    async fn predict(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError>;

    async fn forecast_drift(&self, request: &DriftRequest) -> Result<DriftResponse, OracleError>;

    /// Cheap liveness probe
    async fn health(&self) -> Result<(), OracleError>;
}
