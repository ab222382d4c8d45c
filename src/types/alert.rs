//! Operator-facing records: escalation alerts and recovery confirmations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::NetStatus;

/// Escalation alert. At most one open alert exists per net.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub alert_id: String,
    pub net_id: String,
    pub triggered_at: DateTime<Utc>,
    pub previous_status: NetStatus,
    pub new_status: NetStatus,
    pub confidence: f64,
    pub acknowledged: bool,
    /// Set when the alert was closed by de-escalation or recovery
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Bumped every time a further escalation updates this alert
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn open(
        net_id: impl Into<String>,
        previous_status: NetStatus,
        new_status: NetStatus,
        confidence: f64,
    ) -> Self {
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            net_id: net_id.into(),
            triggered_at: Utc::now(),
            previous_status,
            new_status,
            confidence,
            acknowledged: false,
            resolved_at: None,
            updated_at: None,
        }
    }

    pub const fn is_open(&self) -> bool {
        !self.acknowledged && self.resolved_at.is_none()
    }
}

/// Explicit confirmation that a net was physically recovered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryRecord {
    pub net_id: String,
    pub recovered_by: Option<String>,
    pub recovery_notes: Option<String>,
    pub recovered_at: DateTime<Utc>,
}
