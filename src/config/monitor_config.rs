//! Monitor Configuration - detection thresholds, job cadence and oracle policy
//!
//! Every tunable is a field here. Each struct implements `Default` with the
//! values from `defaults.rs`, so a deployment with no config file behaves
//! exactly like the stock service.
//!
//! The loaded config is immutable and handed to each component at
//! construction time; nothing reads it from global state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a SeaGuard deployment.
///
/// Load with `MonitorConfig::load()` which searches:
/// 1. `$SEAGUARD_CONFIG` env var
/// 2. `./seaguard.toml`
/// 3. Built-in defaults
///
/// and then applies the legacy environment variable overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    /// Confidence thresholds driving the lifecycle state machine
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Feature window and data sufficiency
    #[serde(default)]
    pub features: FeatureConfig,

    /// Prediction oracle endpoint and retry policy
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Sweep cadence and fan-out
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Drift forecast horizons
    #[serde(default)]
    pub drift: DriftConfig,

    /// Notification channel toggles and closure policy
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Persistent store location
    #[serde(default)]
    pub storage: StorageConfig,
}

impl MonitorConfig {
    /// Load configuration using the standard search order, apply environment
    /// overrides, then validate.
    ///
    /// A broken config file is logged and skipped (falling back to the next
    /// source); an invalid final result is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file_or_default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn load_file_or_default() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var("SEAGUARD_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded monitor config from SEAGUARD_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from SEAGUARD_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "SEAGUARD_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./seaguard.toml
        let local = PathBuf::from("seaguard.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded monitor config from ./seaguard.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./seaguard.toml, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No seaguard.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_toml_str(&contents)
            .map_err(|e| match e {
                ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
                other => other,
            })?;
        Ok(config)
    }

    /// Parse and validate a TOML document. Unknown keys are warnings only.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Apply the legacy deployment environment variables (`ML_SERVICE_URL`, ...).
    ///
    /// `lookup` abstracts the environment so tests can inject values.
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(
            lookup: &dyn Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            let raw = lookup(key)?;
            match raw.trim().parse::<T>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(key = key, value = %raw, "Ignoring unparseable environment override");
                    None
                }
            }
        }
        let flag = |key: &str| lookup(key).map(|v| v.trim().eq_ignore_ascii_case("true"));

        if let Some(url) = lookup("ML_SERVICE_URL") {
            self.oracle.url = url;
        }
        if let Some(v) = parsed(&lookup, "ML_SERVICE_TIMEOUT") {
            self.oracle.timeout_ms = v;
        }
        if let Some(v) = parsed(&lookup, "ML_SERVICE_RETRIES") {
            self.oracle.retries = v;
        }
        if let Some(v) = parsed(&lookup, "GHOST_NET_THRESHOLD") {
            self.detection.confidence_threshold = v;
        }
        if let Some(v) = parsed(&lookup, "GHOST_NET_SUSPECTED_THRESHOLD") {
            self.detection.suspected_threshold = v;
        }
        if let Some(v) = flag("ALERT_EMAIL_ENABLED") {
            self.alerts.email_enabled = v;
        }
        if let Some(v) = flag("ALERT_SMS_ENABLED") {
            self.alerts.sms_enabled = v;
        }
        if let Some(v) = flag("ALERT_PUSH_ENABLED") {
            self.alerts.push_enabled = v;
        }
        if let Some(v) = parsed(&lookup, "BATCH_PROCESSING_INTERVAL") {
            self.jobs.batch_processing_interval_ms = v;
        }
        if let Some(v) = parsed(&lookup, "DRIFT_PREDICTION_INTERVAL") {
            self.jobs.drift_prediction_interval_ms = v;
        }
        if let Some(v) = parsed(&lookup, "MIN_DATA_POINTS_FOR_ML") {
            self.features.min_data_points_for_ml = v;
        }
        if let Some(v) = parsed(&lookup, "FEATURE_TIME_WINDOW_HOURS") {
            self.features.time_window_hours = v;
        }
    }

    /// Validate all settings for internal consistency.
    ///
    /// Rules:
    /// - Thresholds are finite and inside [0, 1]
    /// - The suspected threshold does not exceed the confirmed threshold
    /// - Windows, intervals, parallelism and horizons are positive
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();
        let d = &self.detection;

        for (name, value) in [
            ("detection.confidence_threshold", d.confidence_threshold),
            ("detection.suspected_threshold", d.suspected_threshold),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                errors.push(format!("{name}: must be within [0, 1] (got {value})"));
            }
        }
        if d.suspected_threshold > d.confidence_threshold {
            errors.push(format!(
                "detection: suspected_threshold ({:.3}) must be <= confidence_threshold ({:.3})",
                d.suspected_threshold, d.confidence_threshold
            ));
        }

        if self.features.min_data_points_for_ml < 2 {
            errors.push(format!(
                "features.min_data_points_for_ml: must be >= 2 (got {})",
                self.features.min_data_points_for_ml
            ));
        }
        if self.features.time_window_hours == 0 {
            errors.push("features.time_window_hours: must be > 0".to_string());
        }
        if !self.features.dwell_speed_kmh.is_finite() || self.features.dwell_speed_kmh < 0.0 {
            errors.push(format!(
                "features.dwell_speed_kmh: must be a non-negative number (got {})",
                self.features.dwell_speed_kmh
            ));
        }

        if self.oracle.timeout_ms == 0 {
            errors.push("oracle.timeout_ms: must be > 0".to_string());
        }
        if self.oracle.backoff_max_ms < self.oracle.backoff_base_ms {
            errors.push(format!(
                "oracle: backoff_max_ms ({}) must be >= backoff_base_ms ({})",
                self.oracle.backoff_max_ms, self.oracle.backoff_base_ms
            ));
        }
        if !(0.0..=1.0).contains(&self.oracle.backoff_jitter) {
            errors.push(format!(
                "oracle.backoff_jitter: must be within [0, 1] (got {})",
                self.oracle.backoff_jitter
            ));
        }

        if self.jobs.batch_processing_interval_ms == 0 {
            errors.push("jobs.batch_processing_interval_ms: must be > 0".to_string());
        }
        if self.jobs.drift_prediction_interval_ms == 0 {
            errors.push("jobs.drift_prediction_interval_ms: must be > 0".to_string());
        }
        if self.jobs.max_parallelism == 0 {
            errors.push("jobs.max_parallelism: must be >= 1".to_string());
        }

        if self.drift.horizons_hours.is_empty() {
            errors.push("drift.horizons_hours: at least one horizon is required".to_string());
        }
        if self.drift.horizons_hours.contains(&0) {
            errors.push("drift.horizons_hours: horizons must be positive".to_string());
        }
        if self.drift.trajectory_points < 2 {
            errors.push("drift.trajectory_points: must be >= 2".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),
    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),
    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Detection
// ============================================================================

/// Confidence cut-offs on oracle output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DetectionConfig {
    /// At or above: `ghost_confirmed`
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// At or above (and below confirmed): `ghost_suspected`
    #[serde(default = "default_suspected_threshold")]
    pub suspected_threshold: f64,
}

fn default_confidence_threshold() -> f64 {
    defaults::CONFIDENCE_THRESHOLD
}
fn default_suspected_threshold() -> f64 {
    defaults::SUSPECTED_THRESHOLD
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            suspected_threshold: default_suspected_threshold(),
        }
    }
}

// ============================================================================
// Features
// ============================================================================

/// Trailing-window feature extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureConfig {
    #[serde(default = "default_min_data_points")]
    pub min_data_points_for_ml: usize,

    #[serde(default = "default_time_window_hours")]
    pub time_window_hours: u32,

    /// Segments slower than this count toward the dwell ratio (km/h)
    #[serde(default = "default_dwell_speed_kmh")]
    pub dwell_speed_kmh: f64,
}

fn default_min_data_points() -> usize {
    defaults::MIN_DATA_POINTS_FOR_ML
}
fn default_time_window_hours() -> u32 {
    defaults::FEATURE_TIME_WINDOW_HOURS
}
fn default_dwell_speed_kmh() -> f64 {
    defaults::DWELL_SPEED_KMH
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            min_data_points_for_ml: default_min_data_points(),
            time_window_hours: default_time_window_hours(),
            dwell_speed_kmh: default_dwell_speed_kmh(),
        }
    }
}

impl FeatureConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.time_window_hours))
    }
}

// ============================================================================
// Oracle
// ============================================================================

/// Prediction oracle endpoint and call policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_url")]
    pub url: String,

    /// Per-attempt timeout (ms)
    #[serde(default = "default_oracle_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt (transient failures only)
    #[serde(default = "default_oracle_retries")]
    pub retries: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
}

fn default_oracle_url() -> String {
    defaults::ORACLE_URL.to_string()
}
fn default_oracle_timeout_ms() -> u64 {
    defaults::ORACLE_TIMEOUT_MS
}
fn default_oracle_retries() -> u32 {
    defaults::ORACLE_RETRIES
}
fn default_backoff_base_ms() -> u64 {
    defaults::ORACLE_BACKOFF_BASE_MS
}
fn default_backoff_max_ms() -> u64 {
    defaults::ORACLE_BACKOFF_MAX_MS
}
fn default_backoff_jitter() -> f64 {
    defaults::ORACLE_BACKOFF_JITTER
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            url: default_oracle_url(),
            timeout_ms: default_oracle_timeout_ms(),
            retries: default_oracle_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_jitter: default_backoff_jitter(),
        }
    }
}

impl OracleConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ============================================================================
// Jobs
// ============================================================================

/// Fleet sweep cadence and concurrency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
    #[serde(default = "default_batch_interval_ms")]
    pub batch_processing_interval_ms: u64,

    #[serde(default = "default_drift_interval_ms")]
    pub drift_prediction_interval_ms: u64,

    /// Nets processed concurrently within a sweep
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,

    /// Grace period for in-flight work at shutdown (ms)
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_batch_interval_ms() -> u64 {
    defaults::BATCH_PROCESSING_INTERVAL_MS
}
fn default_drift_interval_ms() -> u64 {
    defaults::DRIFT_PREDICTION_INTERVAL_MS
}
fn default_max_parallelism() -> usize {
    defaults::SWEEP_MAX_PARALLELISM
}
fn default_shutdown_grace_ms() -> u64 {
    defaults::SHUTDOWN_GRACE_MS
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            batch_processing_interval_ms: default_batch_interval_ms(),
            drift_prediction_interval_ms: default_drift_interval_ms(),
            max_parallelism: default_max_parallelism(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl JobsConfig {
    pub const fn classification_interval(&self) -> Duration {
        Duration::from_millis(self.batch_processing_interval_ms)
    }

    pub const fn drift_interval(&self) -> Duration {
        Duration::from_millis(self.drift_prediction_interval_ms)
    }

    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

// ============================================================================
// Drift
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriftConfig {
    #[serde(default = "default_horizons")]
    pub horizons_hours: Vec<u32>,

    /// Most recent fixes sent to the oracle as the trajectory
    #[serde(default = "default_trajectory_points")]
    pub trajectory_points: usize,
}

fn default_horizons() -> Vec<u32> {
    defaults::DRIFT_HORIZONS_HOURS.to_vec()
}
fn default_trajectory_points() -> usize {
    defaults::DRIFT_TRAJECTORY_POINTS
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            horizons_hours: default_horizons(),
            trajectory_points: default_trajectory_points(),
        }
    }
}

// ============================================================================
// Alerts
// ============================================================================

/// How an open alert is closed on de-escalation or recovery.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertCloseMode {
    /// Stamp `resolved_at`, leave `acknowledged` for humans
    #[default]
    Resolve,
    /// Mark the alert acknowledged
    Acknowledge,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlertConfig {
    #[serde(default)]
    pub email_enabled: bool,
    #[serde(default)]
    pub sms_enabled: bool,
    #[serde(default)]
    pub push_enabled: bool,
    #[serde(default)]
    pub close_mode: AlertCloseMode,
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_path() -> String {
    defaults::STORAGE_PATH.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: default_storage_path() }
    }
}
