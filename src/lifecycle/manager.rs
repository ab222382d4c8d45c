//! Applies the transition function against the store

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::{next_status, NetEvent, Transition};
use crate::config::DetectionConfig;
use crate::storage::{CasOutcome, StoreError, TelemetryStore};
use crate::types::NetStatus;

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Transitioned(Transition),
    /// The event maps the current status onto itself
    Unchanged(NetStatus),
    /// Stored status moved under us; the stale transition was dropped
    Discarded { expected: NetStatus, actual: NetStatus },
}

impl TransitionOutcome {
    pub const fn transition(&self) -> Option<&Transition> {
        match self {
            Self::Transitioned(t) => Some(t),
            _ => None,
        }
    }

    /// The event arrived after the net had already moved out of its reach:
    /// a lost compare-and-set, or a net that is terminal by now.
    pub const fn is_stale(&self) -> bool {
        match self {
            Self::Discarded { .. } => true,
            Self::Unchanged(status) => status.is_terminal(),
            Self::Transitioned(_) => false,
        }
    }
}

pub struct LifecycleManager {
    store: Arc<dyn TelemetryStore>,
    thresholds: DetectionConfig,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn TelemetryStore>, thresholds: DetectionConfig) -> Self {
        Self { store, thresholds }
    }

    pub const fn thresholds(&self) -> &DetectionConfig {
        &self.thresholds
    }

    /// Read the current status, compute the next one and compare-and-set it.
    ///
    /// A conflict is not retried: whatever changed the status in between
    /// (typically a recovery) wins.
    pub async fn apply(&self, net_id: &str, event: NetEvent) -> Result<TransitionOutcome, StoreError> {
        let net = self
            .store
            .get_net(net_id)
            .await?
            .ok_or_else(|| StoreError::net_not_found(net_id))?;

        let current = net.status;
        let next = next_status(current, &event, &self.thresholds);
        if next == current {
            return Ok(TransitionOutcome::Unchanged(current));
        }

        match self.store.set_net_status(net_id, current, next).await? {
            CasOutcome::Applied => {
                let transition = Transition {
                    net_id: net_id.to_string(),
                    previous: current,
                    new: next,
                    confidence: event.confidence(),
                    at: Utc::now(),
                };
                info!(
                    net_id = %net_id,
                    from = %current,
                    to = %next,
                    confidence = ?transition.confidence,
                    "Net status changed"
                );
                Ok(TransitionOutcome::Transitioned(transition))
            }
            CasOutcome::Conflict { actual } => {
                debug!(
                    net_id = %net_id,
                    expected = %current,
                    actual = %actual,
                    "Status changed concurrently, discarding stale transition"
                );
                Ok(TransitionOutcome::Discarded { expected: current, actual })
            }
        }
    }

    /// Force `recovered`. Retries the compare-and-set until it lands, since
    /// recovery applies whatever the current status is.
    pub async fn confirm_recovery(&self, net_id: &str) -> Result<TransitionOutcome, StoreError> {
        loop {
            match self.apply(net_id, NetEvent::RecoveryConfirmed).await? {
                TransitionOutcome::Discarded { actual, .. } => {
                    debug!(net_id = %net_id, actual = %actual, "Recovery raced a status change, retrying");
                }
                outcome => return Ok(outcome),
            }
        }
    }
}
