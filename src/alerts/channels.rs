//! Notification channels (email / SMS / push)
//!
//! Delivery is fire-and-forget from the dispatcher's point of view. The
//! built-in channel records each delivery as a structured log event; a real
//! mail or SMS gateway plugs in behind the same trait.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::AlertConfig;
use crate::types::Alert;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Email,
    Sms,
    Push,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{channel} delivery failed: {reason}")]
pub struct DeliveryError {
    pub channel: ChannelKind,
    pub reason: String,
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn deliver(&self, alert: &Alert) -> Result<(), DeliveryError>;
}

/// Channel that emits one `info` event per delivered alert.
#[derive(Debug, Clone, Copy)]
pub struct TracingChannel {
    kind: ChannelKind,
}

impl TracingChannel {
    pub const fn new(kind: ChannelKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl NotificationChannel for TracingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), DeliveryError> {
        info!(
            channel = %self.kind,
            alert_id = %alert.alert_id,
            net_id = %alert.net_id,
            previous_status = %alert.previous_status,
            new_status = %alert.new_status,
            confidence = alert.confidence,
            "Ghost net alert sent"
        );
        Ok(())
    }
}

/// Built-in channels for every toggle switched on.
pub fn channels_from_config(config: &AlertConfig) -> Vec<Arc<dyn NotificationChannel>> {
    [
        (config.email_enabled, ChannelKind::Email),
        (config.sms_enabled, ChannelKind::Sms),
        (config.push_enabled, ChannelKind::Push),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .map(|(_, kind)| Arc::new(TracingChannel::new(kind)) as Arc<dyn NotificationChannel>)
    .collect()
}
