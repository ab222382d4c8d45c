//! GPS telemetry pings reported by net trackers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// Radio path a ping arrived over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PingSource {
    #[default]
    Lora,
    Gsm,
    Satellite,
}

impl PingSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lora => "lora",
            Self::Gsm => "gsm",
            Self::Satellite => "satellite",
        }
    }
}

impl std::fmt::Display for PingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PingSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lora" => Ok(Self::Lora),
            "gsm" => Ok(Self::Gsm),
            "satellite" => Ok(Self::Satellite),
            other => Err(format!("unknown ping source '{other}' (expected lora, gsm or satellite)")),
        }
    }
}

/// A single GPS fix. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ping {
    pub net_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    pub source: PingSource,
}

impl Ping {
    pub fn new(
        net_id: impl Into<String>,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
        source: PingSource,
    ) -> Self {
        Self {
            net_id: net_id.into(),
            latitude,
            longitude,
            timestamp,
            source,
        }
    }

    pub const fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Identity within a net's ping log: (timestamp in epoch millis, source).
    /// Fixes closer together than a millisecond from the same source are
    /// the same fix.
    pub fn dedup_key(&self) -> (i64, PingSource) {
        (self.timestamp.timestamp_millis(), self.source)
    }
}

/// Result of appending a ping. A duplicate is a no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendOutcome {
    Appended,
    Duplicate,
}
