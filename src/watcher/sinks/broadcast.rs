//! In-process broadcast of server events.
//!
//! Lets local observers (the operator console, tests, embedding code)
//! subscribe to the event stream without owning the sink.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::state::{EventKind, ServerEvent, ServerKey};
use crate::watcher::{NotificationSink, WatchError};

/// Publishes each event, in order, on a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<ServerEvent>,
}

impl BroadcastSink {
    /// Create a new sink with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    fn send(&self, event: ServerEvent) {
        match self.sender.send(event) {
            Ok(count) => {
                crate::debug_event!("broadcast", "sent", "to {count} subscribers");
            }
            Err(broadcast::error::SendError(event)) => {
                // No receivers, this is fine
                crate::debug_event!("broadcast", "dropped", "no subscribers for {event:?}");
            }
        }
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    fn name(&self) -> &str {
        "broadcast"
    }

    async fn notify(
        &self,
        appeared: &[ServerKey],
        disappeared: &[ServerKey],
    ) -> Result<(), WatchError> {
        for server in appeared {
            self.send(ServerEvent {
                kind: EventKind::Up,
                server: server.clone(),
            });
        }
        for server in disappeared {
            self.send(ServerEvent {
                kind: EventKind::Down,
                server: server.clone(),
            });
        }
        Ok(())
    }
}
