//! System-wide default constants.
//!
//! Every tunable in `MonitorConfig` takes its default from here. Grouped by
//! subsystem for easy discovery.

// ============================================================================
// Detection
// ============================================================================

/// Oracle confidence at or above which a net is confirmed as a ghost net.
pub const CONFIDENCE_THRESHOLD: f64 = 0.75;

/// Oracle confidence at or above which a net is suspected.
pub const SUSPECTED_THRESHOLD: f64 = 0.50;

// ============================================================================
// Feature Extraction
// ============================================================================

/// Minimum pings inside the window before a net is worth classifying.
pub const MIN_DATA_POINTS_FOR_ML: usize = 5;

/// Trailing telemetry window (hours).
pub const FEATURE_TIME_WINDOW_HOURS: u32 = 24;

/// Segment speed below which the net counts as dwelling (km/h).
pub const DWELL_SPEED_KMH: f64 = 0.5;

// ============================================================================
// Prediction Oracle
// ============================================================================

pub const ORACLE_URL: &str = "http://localhost:5001";

/// Per-attempt oracle timeout (ms).
pub const ORACLE_TIMEOUT_MS: u64 = 10_000;

/// Retries after the first attempt, transient failures only.
pub const ORACLE_RETRIES: u32 = 3;

/// First backoff delay (ms); doubles per retry.
pub const ORACLE_BACKOFF_BASE_MS: u64 = 500;

/// Backoff ceiling (ms).
pub const ORACLE_BACKOFF_MAX_MS: u64 = 8_000;

/// Fractional jitter applied to each backoff delay (0.2 = ±20%).
pub const ORACLE_BACKOFF_JITTER: f64 = 0.2;

// ============================================================================
// Background Jobs
// ============================================================================

/// Classification sweep period (ms). 300 000 = 5 minutes.
pub const BATCH_PROCESSING_INTERVAL_MS: u64 = 300_000;

/// Drift forecast sweep period (ms). 3 600 000 = 1 hour.
pub const DRIFT_PREDICTION_INTERVAL_MS: u64 = 3_600_000;

/// Nets processed concurrently within one sweep.
pub const SWEEP_MAX_PARALLELISM: usize = 8;

/// Time in-flight per-net work gets to finish after shutdown is requested (ms).
pub const SHUTDOWN_GRACE_MS: u64 = 15_000;

// ============================================================================
// Drift Forecasting
// ============================================================================

/// Forecast horizons (hours).
pub const DRIFT_HORIZONS_HOURS: [u32; 3] = [6, 24, 72];

/// Most recent fixes sent to the oracle as the trajectory.
pub const DRIFT_TRAJECTORY_POINTS: usize = 48;

// ============================================================================
// Ingestion
// ============================================================================

/// Largest accepted ping batch.
pub const MAX_PING_BATCH: usize = 100;

// ============================================================================
// Storage
// ============================================================================

pub const STORAGE_PATH: &str = "./data/seaguard.db";
