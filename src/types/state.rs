//! Core state types: NetStatus, GeoPoint, Net

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Net Lifecycle Status
// ============================================================================

/// Lifecycle status of a monitored net.
///
/// `Recovered` is terminal: once set, no sweep touches the net again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NetStatus {
    /// Being fished normally
    #[default]
    Active,
    /// Classifier sees drift-like behaviour above the suspected threshold
    GhostSuspected,
    /// Classifier is confident the net is adrift
    GhostConfirmed,
    /// Physically recovered (terminal)
    Recovered,
}

impl NetStatus {
    /// Escalation rank used to tell escalations from de-escalations.
    ///
    /// `Recovered` has no rank: it is neither more nor less severe.
    pub const fn severity(self) -> Option<u8> {
        match self {
            Self::Active => Some(0),
            Self::GhostSuspected => Some(1),
            Self::GhostConfirmed => Some(2),
            Self::Recovered => None,
        }
    }

    /// Suspected or confirmed ghost net.
    pub const fn is_anomalous(self) -> bool {
        matches!(self, Self::GhostSuspected | Self::GhostConfirmed)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Recovered)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::GhostSuspected => "ghost_suspected",
            Self::GhostConfirmed => "ghost_confirmed",
            Self::Recovered => "recovered",
        }
    }
}

impl std::fmt::Display for NetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "ghost_suspected" => Ok(Self::GhostSuspected),
            "ghost_confirmed" => Ok(Self::GhostConfirmed),
            "recovered" => Ok(Self::Recovered),
            other => Err(format!("unknown net status '{other}'")),
        }
    }
}

// ============================================================================
// Geography
// ============================================================================

/// WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// True when both coordinates are finite and inside WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.5}, {:.5})", self.latitude, self.longitude)
    }
}

// ============================================================================
// Net
// ============================================================================

/// A registered net fitted with a location tracker.
///
/// `status` is only ever changed through the lifecycle transition function
/// or a recovery confirmation, both applied as compare-and-set on the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Net {
    pub net_id: String,
    pub qr_code_id: String,
    pub owner_id: String,
    pub status: NetStatus,
    pub deployment_location: GeoPoint,
    pub deployment_time: DateTime<Utc>,
    /// Most recent fix (by ping timestamp, not arrival order)
    pub last_known_location: Option<GeoPoint>,
    /// Timestamp of the fix held in `last_known_location`
    pub last_ping_at: Option<DateTime<Utc>>,
    pub last_prediction_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Net {
    /// New net in `Active` status.
    pub fn register(
        net_id: impl Into<String>,
        qr_code_id: impl Into<String>,
        owner_id: impl Into<String>,
        deployment_location: GeoPoint,
        deployment_time: DateTime<Utc>,
    ) -> Self {
        Self {
            net_id: net_id.into(),
            qr_code_id: qr_code_id.into(),
            owner_id: owner_id.into(),
            status: NetStatus::Active,
            deployment_location,
            deployment_time,
            last_known_location: None,
            last_ping_at: None,
            last_prediction_id: None,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            NetStatus::Active,
            NetStatus::GhostSuspected,
            NetStatus::GhostConfirmed,
            NetStatus::Recovered,
        ] {
            assert_eq!(status.as_str().parse::<NetStatus>().unwrap(), status);
        }
        assert!("adrift".parse::<NetStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&NetStatus::GhostConfirmed).unwrap();
        assert_eq!(json, "\"ghost_confirmed\"");
    }

    #[test]
    fn test_geo_point_bounds() {
        assert!(GeoPoint::new(90.0, -180.0).is_valid());
        assert!(!GeoPoint::new(90.1, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 180.5).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(NetStatus::GhostConfirmed.severity() > NetStatus::GhostSuspected.severity());
        assert!(NetStatus::GhostSuspected.severity() > NetStatus::Active.severity());
        assert_eq!(NetStatus::Recovered.severity(), None);
    }
}
