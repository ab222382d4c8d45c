//! Windowed feature extraction for a single net

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::sync::Arc;
use tracing::debug;

use super::geo::{bearing_deg, circular_stats, haversine_km};
use crate::config::FeatureConfig;
use crate::storage::{StoreError, TelemetryStore};
use crate::types::{Net, Ping};

/// Column order of `FeatureVector::values`
pub const FEATURE_NAMES: [&str; 12] = [
    "ping_count",
    "displacement_km",
    "path_length_km",
    "straightness",
    "distance_from_deployment_km",
    "mean_speed_kmh",
    "speed_variance",
    "mean_heading_deg",
    "heading_variance",
    "dwell_ratio",
    "ping_density_per_hour",
    "hours_since_last_ping",
];

/// Derived aggregates over one trailing window of a net's pings.
///
/// Ephemeral: computed per evaluation cycle and never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    pub net_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub ping_count: usize,
    /// Great-circle distance first fix → last fix (km)
    pub displacement_km: f64,
    /// Sum of segment distances (km)
    pub path_length_km: f64,
    /// displacement / path length; 1.0 is a straight-line drift
    pub straightness: f64,
    pub distance_from_deployment_km: f64,
    pub mean_speed_kmh: f64,
    pub speed_variance: f64,
    pub mean_heading_deg: f64,
    /// Circular variance in [0, 1]
    pub heading_variance: f64,
    /// Share of segments slower than the dwell speed
    pub dwell_ratio: f64,
    pub ping_density_per_hour: f64,
    pub hours_since_last_ping: f64,
}

impl FeatureVector {
    /// Numeric values in `FEATURE_NAMES` order
    pub fn values(&self) -> [f64; FEATURE_NAMES.len()] {
        [
            self.ping_count as f64,
            self.displacement_km,
            self.path_length_km,
            self.straightness,
            self.distance_from_deployment_km,
            self.mean_speed_kmh,
            self.speed_variance,
            self.mean_heading_deg,
            self.heading_variance,
            self.dwell_ratio,
            self.ping_density_per_hour,
            self.hours_since_last_ping,
        ]
    }
}

/// Extraction result. Too few pings is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureOutcome {
    Ready(FeatureVector),
    InsufficientData { found: usize, required: usize },
}

/// Reads a net's trailing window from the store and computes features
pub struct FeatureExtractor {
    store: Arc<dyn TelemetryStore>,
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(store: Arc<dyn TelemetryStore>, config: FeatureConfig) -> Self {
        Self { store, config }
    }

    /// Extract features for `net` over the window ending at `now`.
    ///
    /// Pure read + compute; the only failure is a store error.
    pub async fn extract(&self, net: &Net, now: DateTime<Utc>) -> Result<FeatureOutcome, StoreError> {
        let window_start = now - self.config.window();
        let pings = self
            .store
            .pings_in_window(&net.net_id, window_start, now)
            .await?;

        if pings.len() < self.config.min_data_points_for_ml {
            debug!(
                net_id = %net.net_id,
                found = pings.len(),
                required = self.config.min_data_points_for_ml,
                "Insufficient pings in window"
            );
            return Ok(FeatureOutcome::InsufficientData {
                found: pings.len(),
                required: self.config.min_data_points_for_ml,
            });
        }

        Ok(FeatureOutcome::Ready(compute_features(
            net,
            pings,
            window_start,
            now,
            self.config.dwell_speed_kmh,
        )))
    }
}

/// Compute the feature vector from an unordered set of pings.
///
/// Pings are sorted by timestamp first, so arrival order never matters.
/// Segments with zero elapsed time (same instant over two radios) contribute
/// distance but no speed or heading sample.
pub fn compute_features(
    net: &Net,
    mut pings: Vec<Ping>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    dwell_speed_kmh: f64,
) -> FeatureVector {
    pings.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.source.cmp(&b.source))
    });

    let mut path_length_km = 0.0;
    let mut speeds = Vec::with_capacity(pings.len());
    let mut headings = Vec::with_capacity(pings.len());

    for pair in pings.windows(2) {
        let (a, b) = (pair[0].location(), pair[1].location());
        let distance = haversine_km(a, b);
        path_length_km += distance;

        let hours = (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f64 / 3_600_000.0;
        if hours > 0.0 {
            speeds.push(distance / hours);
            if distance > 0.0 {
                headings.push(bearing_deg(a, b));
            }
        }
    }

    let (first, last) = match (pings.first(), pings.last()) {
        (Some(f), Some(l)) => (f.location(), l.location()),
        _ => (net.deployment_location, net.deployment_location),
    };
    let displacement_km = haversine_km(first, last);

    let mean_speed_kmh = if speeds.is_empty() { 0.0 } else { speeds.iter().mean() };
    let speed_variance = if speeds.len() < 2 { 0.0 } else { speeds.iter().variance() };
    let (mean_heading_deg, heading_variance) = circular_stats(&headings);
    let dwell_ratio = if speeds.is_empty() {
        1.0
    } else {
        speeds.iter().filter(|s| **s < dwell_speed_kmh).count() as f64 / speeds.len() as f64
    };

    let window_hours = ((window_end - window_start).num_milliseconds() as f64 / 3_600_000.0).max(f64::EPSILON);
    let hours_since_last_ping = pings
        .last()
        .map_or(window_hours, |p| {
            ((window_end - p.timestamp).num_milliseconds() as f64 / 3_600_000.0).max(0.0)
        });

    FeatureVector {
        net_id: net.net_id.clone(),
        window_start,
        window_end,
        ping_count: pings.len(),
        displacement_km,
        path_length_km,
        straightness: if path_length_km > 0.0 { displacement_km / path_length_km } else { 0.0 },
        distance_from_deployment_km: haversine_km(net.deployment_location, last),
        mean_speed_kmh,
        speed_variance,
        mean_heading_deg,
        heading_variance,
        dwell_ratio,
        ping_density_per_hour: pings.len() as f64 / window_hours,
        hours_since_last_ping,
    }
}
