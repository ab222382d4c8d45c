//! Monitor Configuration Module
//!
//! Provides deployment configuration loaded from TOML files and the
//! legacy deployment environment variables.
//!
//! ## Loading Order
//!
//! 1. `SEAGUARD_CONFIG` environment variable (path to TOML file)
//! 2. `seaguard.toml` in the current working directory
//! 3. Built-in defaults (see `defaults`)
//!
//! Environment overrides (`ML_SERVICE_URL`, `GHOST_NET_THRESHOLD`, ...) are
//! applied on top, then the result is validated.
//!
//! ## Usage
//!
//! ```ignore
//! let config = Arc::new(MonitorConfig::load()?);
//! let extractor = FeatureExtractor::new(store.clone(), config.features.clone());
//! ```

mod monitor_config;
pub mod defaults;
pub mod validation;

pub use monitor_config::*;
