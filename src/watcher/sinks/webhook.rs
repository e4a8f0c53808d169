//! Webhook sink: posts one chat-style message per event.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::state::{EventKind, ServerEvent, ServerKey};
use crate::watcher::{NotificationSink, WatchError};

#[derive(Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

/// Render an event the way it's posted to the channel.
pub fn format_message(event: &ServerEvent) -> String {
    let ServerKey {
        name,
        address,
        port,
    } = &event.server;
    match event.kind {
        EventKind::Up => {
            format!("🟢 **UP**: `{name}` at `{address}:{port}` is now available.")
        }
        EventKind::Down => {
            format!("🔴 **DOWN**: `{name}` at `{address}:{port}` is no longer available.")
        }
    }
}

/// POSTs `{"content": "..."}` to a webhook for every event, in order.
///
/// A failed post is logged and the remaining events are still attempted;
/// the call reports an error if any post failed.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, WatchError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("serverwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WatchError::InitFailed {
                reason: format!("webhook client: {e}"),
            })?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, content: &str) -> Result<(), String> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookMessage { content })
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", status.as_u16()))
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(
        &self,
        appeared: &[ServerKey],
        disappeared: &[ServerKey],
    ) -> Result<(), WatchError> {
        let events = appeared
            .iter()
            .map(|server| (EventKind::Up, server))
            .chain(disappeared.iter().map(|server| (EventKind::Down, server)));

        let mut failed = 0usize;
        let mut last_error = None;
        for (kind, server) in events {
            let event = ServerEvent {
                kind,
                server: server.clone(),
            };
            if let Err(e) = self.post(&format_message(&event)).await {
                tracing::warn!("[webhook] failed to post {kind} for {server}: {e}");
                failed += 1;
                last_error = Some(e);
            }
        }

        match last_error {
            None => Ok(()),
            Some(reason) => Err(WatchError::Delivery {
                sink: self.name().to_string(),
                reason: format!("{failed} message(s) failed, last error: {reason}"),
            }),
        }
    }
}
