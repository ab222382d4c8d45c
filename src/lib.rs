//! SeaGuard: Ghost Net Detection
//!
//! Turns GPS pings from tracked fishing nets into lifecycle decisions.
//!
//! ## Pipeline
//!
//! - **Feature Extractor**: trailing-window movement features per net
//! - **Classification Orchestrator**: prediction oracle calls with timeout,
//!   retry/backoff and per-net single-flight
//! - **Net State Machine**: confidence thresholds → `active` /
//!   `ghost_suspected` / `ghost_confirmed`, recovery is terminal
//! - **Alert Dispatcher**: one open alert per net, fire-and-forget delivery
//! - **Drift Forecaster**: horizon positions for anomalous nets
//! - **Fleet Scheduler**: periodic classification and drift sweeps

pub mod alerts;
pub mod config;
pub mod drift;
pub mod error;
pub mod features;
pub mod lifecycle;
pub mod oracle;
pub mod scheduler;
pub mod service;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::MonitorConfig;

// Re-export commonly used types
pub use types::{
    Alert, AppendOutcome, GeoPoint, HorizonForecast, Net, NetStatus, Ping, PingSource,
    Prediction, PredictionSummary, RecoveryRecord,
};

// Re-export pipeline components
pub use error::{CoreError, ValidationError};
pub use features::{FeatureExtractor, FeatureOutcome, FeatureVector};
pub use lifecycle::{next_status, LifecycleManager, NetEvent, Transition, TransitionOutcome};
pub use oracle::{ClassificationError, ClassificationOrchestrator, HttpOracle, OracleError, PredictionOracle, RetryPolicy};
pub use scheduler::{FleetScheduler, SweepReport};
pub use service::{GhostNetService, NetRegistration, NetView, PingSubmission};
pub use storage::{InMemoryStore, SledStore, StoreError, TelemetryStore};
