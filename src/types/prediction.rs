//! Classifier output and drift forecasts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// Predicted position at a future offset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HorizonForecast {
    pub horizon_hours: u32,
    pub predicted_location: GeoPoint,
}

/// One classification result for a net. Append-only history; the newest
/// one is referenced from `Net::last_prediction_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub prediction_id: String,
    pub net_id: String,
    pub timestamp: DateTime<Utc>,
    /// Oracle confidence that the net is a ghost net, in [0, 1]
    pub confidence: f64,
    pub label: String,
    #[serde(default)]
    pub horizon_forecasts: Vec<HorizonForecast>,
}

impl Prediction {
    pub fn new(net_id: impl Into<String>, confidence: f64, label: impl Into<String>) -> Self {
        Self {
            prediction_id: uuid::Uuid::new_v4().to_string(),
            net_id: net_id.into(),
            timestamp: Utc::now(),
            confidence,
            label: label.into(),
            horizon_forecasts: Vec::new(),
        }
    }
}

/// Compact view of a prediction for status queries.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PredictionSummary {
    pub prediction_id: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    pub label: String,
    pub horizons: Vec<HorizonForecast>,
}

impl From<&Prediction> for PredictionSummary {
    fn from(p: &Prediction) -> Self {
        Self {
            prediction_id: p.prediction_id.clone(),
            timestamp: p.timestamp,
            confidence: p.confidence,
            label: p.label.clone(),
            horizons: p.horizon_forecasts.clone(),
        }
    }
}
