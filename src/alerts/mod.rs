//! Alert Dispatcher and notification channels

mod channels;
mod dispatcher;

pub use channels::{channels_from_config, ChannelKind, DeliveryError, NotificationChannel, TracingChannel};
pub use dispatcher::{AlertDispatcher, DispatchOutcome};
