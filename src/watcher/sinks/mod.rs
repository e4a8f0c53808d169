//! Notification sink implementations.

mod broadcast;
mod log;
mod webhook;

pub use broadcast::BroadcastSink;
pub use log::LogSink;
pub use webhook::{WebhookSink, format_message};
