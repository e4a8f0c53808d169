//! Fallback sink: one log line per event.

use async_trait::async_trait;

use crate::state::{EventKind, ServerKey};
use crate::watcher::{NotificationSink, WatchError};

/// Logs each event at info level with `event_kind`, `name`, `address` and `port` fields.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }

    fn emit(kind: EventKind, key: &ServerKey) {
        tracing::info!(
            event_kind = kind.as_str(),
            name = %key.name,
            address = %key.address,
            port = key.port,
            "{}: {} {}:{}",
            kind.as_str().to_uppercase(),
            key.name,
            key.address,
            key.port
        );
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(
        &self,
        appeared: &[ServerKey],
        disappeared: &[ServerKey],
    ) -> Result<(), WatchError> {
        for key in appeared {
            Self::emit(EventKind::Up, key);
        }
        for key in disappeared {
            Self::emit(EventKind::Down, key);
        }
        Ok(())
    }
}
