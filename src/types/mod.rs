//! Shared data structures for ghost-net monitoring
//!
//! This module defines the entities that flow through the detection pipeline:
//! - Net lifecycle: `Net`, `NetStatus`, `GeoPoint`
//! - Telemetry: `Ping`, `PingSource`
//! - Classification output: `Prediction`, `HorizonForecast`
//! - Operator-facing records: `Alert`, `RecoveryRecord`

mod state;
mod telemetry;
mod prediction;
mod alert;

pub use state::*;
pub use telemetry::*;
pub use prediction::*;
pub use alert::*;
