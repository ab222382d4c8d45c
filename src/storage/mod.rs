//! Telemetry Store
//!
//! Abstracts persistence of nets, pings, predictions, alerts and recovery
//! records so the pipeline never depends on a storage technology:
//! - `InMemoryStore`: in-process store for tests and minimal deployments
//! - `SledStore`: embedded, durable store used by the `seaguard` binary
//!
//! Status changes go exclusively through `set_net_status`, an atomic
//! compare-and-set keyed on the status the caller last observed.

mod memory;
mod sled_store;

pub use memory::InMemoryStore;
pub use sled_store::SledStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{
    Alert, AppendOutcome, HorizonForecast, Net, NetStatus, Ping, Prediction, RecoveryRecord,
};

/// Result of a compare-and-set on a net's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// Stored status matched `expected` and now holds the new value
    Applied,
    /// Stored status differed from `expected`; nothing was written
    Conflict { actual: NetStatus },
}

/// Trait for pluggable telemetry store backends
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across sweep workers.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Append a ping. A repeat of (net, timestamp, source) is a no-op.
    ///
    /// Also advances the net's last known location when this ping is the
    /// newest fix seen so far.
    async fn append_ping(&self, ping: &Ping) -> Result<AppendOutcome, StoreError>;

    /// Pings for `net_id` with `from <= timestamp <= to`, ordered by timestamp
    async fn pings_in_window(
        &self,
        net_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Ping>, StoreError>;

    /// The `limit` most recent pings for `net_id`, oldest first
    async fn recent_pings(&self, net_id: &str, limit: usize) -> Result<Vec<Ping>, StoreError>;

    /// Register a net. Fails with `AlreadyExists` on a duplicate id.
    async fn insert_net(&self, net: &Net) -> Result<(), StoreError>;

    async fn get_net(&self, net_id: &str) -> Result<Option<Net>, StoreError>;

    async fn get_net_by_qr_code(&self, qr_code_id: &str) -> Result<Option<Net>, StoreError>;

    async fn list_nets(&self) -> Result<Vec<Net>, StoreError>;

    /// Atomically replace the status of `net_id` if it still equals `expected`
    async fn set_net_status(
        &self,
        net_id: &str,
        expected: NetStatus,
        new: NetStatus,
    ) -> Result<CasOutcome, StoreError>;

    /// Reassign a net's owner. Status is untouched; it only moves through
    /// `set_net_status`.
    async fn set_net_owner(&self, net_id: &str, owner_id: &str) -> Result<Net, StoreError>;

    /// Append a prediction (idempotent by id) and point the net's
    /// `last_prediction_id` at it
    async fn save_prediction(&self, prediction: &Prediction) -> Result<(), StoreError>;

    async fn latest_prediction(&self, net_id: &str) -> Result<Option<Prediction>, StoreError>;

    /// Replace the horizon forecasts stored on a prediction
    async fn attach_forecasts(
        &self,
        prediction_id: &str,
        forecasts: &[HorizonForecast],
    ) -> Result<(), StoreError>;

    /// Insert or update an alert (keyed by `alert_id`)
    async fn save_alert(&self, alert: &Alert) -> Result<(), StoreError>;

    async fn get_alert(&self, alert_id: &str) -> Result<Option<Alert>, StoreError>;

    /// The unacknowledged, unresolved alert for `net_id`, if any
    async fn open_alert(&self, net_id: &str) -> Result<Option<Alert>, StoreError>;

    /// Every alert raised for `net_id`, oldest first
    async fn alerts_for_net(&self, net_id: &str) -> Result<Vec<Alert>, StoreError>;

    async fn save_recovery(&self, record: &RecoveryRecord) -> Result<(), StoreError>;

    async fn recovery_for_net(&self, net_id: &str) -> Result<Option<RecoveryRecord>, StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: &'static str, id: String },
}

impl StoreError {
    pub fn net_not_found(net_id: &str) -> Self {
        Self::NotFound { kind: "net", id: net_id.to_string() }
    }
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
