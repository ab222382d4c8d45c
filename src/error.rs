//! Error taxonomy for the operations exposed by `GhostNetService`

use crate::drift::DriftError;
use crate::oracle::ClassificationError;
use crate::storage::StoreError;

/// Rejected input. Never changes any state.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),
    #[error("unknown net '{0}'")]
    UnknownNet(String),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("batch of {size} pings exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },
    #[error("ping batch is empty")]
    EmptyBatch,
    #[error("net '{0}' is already registered")]
    DuplicateNet(String),
    #[error("QR code '{0}' is already assigned to another net")]
    DuplicateQrCode(String),
    #[error("unknown alert '{0}'")]
    UnknownAlert(String),
}

impl ValidationError {
    /// Check a coordinate pair against WGS84 bounds.
    pub fn check_coordinates(latitude: f64, longitude: f64) -> Result<(), Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Self::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Self::InvalidLongitude(longitude));
        }
        Ok(())
    }

    pub fn check_not_empty(field: &'static str, value: &str) -> Result<(), Self> {
        if value.trim().is_empty() {
            Err(Self::EmptyField(field))
        } else {
            Ok(())
        }
    }
}

/// Error returned by service operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("classification failed: {0}")]
    Classification(#[from] ClassificationError),
    #[error("drift forecast failed: {0}")]
    Drift(#[from] DriftError),
}

impl CoreError {
    /// Oracle retries ran out: monitoring is degraded, but nothing is broken.
    pub const fn is_degraded(&self) -> bool {
        matches!(
            self,
            Self::Classification(ClassificationError::Exhausted { .. })
                | Self::Drift(DriftError::Oracle(ClassificationError::Exhausted { .. }))
        )
    }
}
