//! Net State Machine
//!
//! `next_status` is the whole transition table and is pure. The
//! `LifecycleManager` applies it against the store as a compare-and-set,
//! which makes it the only writer of `Net::status`.

mod manager;

pub use manager::{LifecycleManager, TransitionOutcome};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::DetectionConfig;
use crate::types::NetStatus;

/// Input to the transition function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NetEvent {
    /// Fresh oracle reading
    Prediction { confidence: f64 },
    /// Oracle produced nothing usable this cycle
    ClassificationFailed,
    /// Operator confirmed physical recovery
    RecoveryConfirmed,
}

impl NetEvent {
    pub const fn confidence(&self) -> Option<f64> {
        match self {
            Self::Prediction { confidence } => Some(*confidence),
            _ => None,
        }
    }
}

/// A status change that was actually persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub net_id: String,
    pub previous: NetStatus,
    pub new: NetStatus,
    /// Confidence of the triggering prediction; `None` for recovery
    pub confidence: Option<f64>,
    pub at: DateTime<Utc>,
}

impl Transition {
    /// Moves further up the active → suspected → confirmed ladder
    pub fn is_escalation(&self) -> bool {
        match (self.previous.severity(), self.new.severity()) {
            (Some(prev), Some(new)) => new > prev,
            _ => false,
        }
    }
}

/// Compute the next status. `ghost_confirmed` only leaves via recovery and
/// `recovered` never leaves.
pub fn next_status(current: NetStatus, event: &NetEvent, thresholds: &DetectionConfig) -> NetStatus {
    use NetStatus::{Active, GhostConfirmed, GhostSuspected, Recovered};

    match (current, *event) {
        (Recovered, _) | (_, NetEvent::RecoveryConfirmed) => Recovered,
        (status, NetEvent::ClassificationFailed) => status,
        (status, NetEvent::Prediction { confidence }) if !confidence.is_finite() => status,
        (_, NetEvent::Prediction { confidence }) if confidence >= thresholds.confidence_threshold => {
            GhostConfirmed
        }
        (GhostConfirmed, NetEvent::Prediction { .. }) => GhostConfirmed,
        (Active | GhostSuspected, NetEvent::Prediction { confidence })
            if confidence >= thresholds.suspected_threshold =>
        {
            GhostSuspected
        }
        (GhostSuspected, NetEvent::Prediction { .. }) => Active,
        (Active, NetEvent::Prediction { .. }) => Active,
    }
}
