//! Notification sink trait and the runtime-selectable sink target.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::WatchError;
use crate::state::ServerKey;

/// Receiver of availability changes.
///
/// Called at most once per poll cycle, only when something changed. Both
/// slices are sorted by key; implementations must deliver `appeared` before
/// `disappeared`.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sink name for logging.
    fn name(&self) -> &str;

    /// Deliver one cycle's worth of changes.
    async fn notify(
        &self,
        appeared: &[ServerKey],
        disappeared: &[ServerKey],
    ) -> Result<(), WatchError>;
}

/// Where notifications currently go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkTarget {
    /// No output configured: events are logged.
    #[default]
    Log,
    /// POST each event to a webhook.
    Webhook { url: String },
}

impl SinkTarget {
    /// Validate and build a webhook target.
    pub fn webhook(url: &str) -> Result<Self, WatchError> {
        let url = url.trim();
        let parsed = reqwest::Url::parse(url).map_err(|e| WatchError::InvalidSinkTarget {
            target: url.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WatchError::InvalidSinkTarget {
                target: url.to_string(),
                reason: "webhook must be http or https".to_string(),
            });
        }

        Ok(SinkTarget::Webhook {
            url: url.to_string(),
        })
    }

    /// Target described by an optional configured URL.
    pub fn from_config(url: Option<&str>) -> Result<Self, WatchError> {
        match url {
            Some(url) => Self::webhook(url),
            None => Ok(SinkTarget::Log),
        }
    }

    /// URL to persist in settings, if any.
    pub fn webhook_url(&self) -> Option<&str> {
        match self {
            SinkTarget::Log => None,
            SinkTarget::Webhook { url } => Some(url),
        }
    }
}

impl fmt::Display for SinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkTarget::Log => f.write_str("log only"),
            SinkTarget::Webhook { url } => write!(f, "webhook {url}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_target_validation() {
        assert!(SinkTarget::webhook("https://hooks.example.com/x").is_ok());
        assert!(matches!(
            SinkTarget::webhook("ftp://example.com"),
            Err(WatchError::InvalidSinkTarget { .. })
        ));
        assert!(matches!(
            SinkTarget::webhook("not a url"),
            Err(WatchError::InvalidSinkTarget { .. })
        ));
    }

    #[test]
    fn test_from_config() {
        assert_eq!(SinkTarget::from_config(None).unwrap(), SinkTarget::Log);
        assert_eq!(
            SinkTarget::from_config(Some("http://localhost/hook"))
                .unwrap()
                .webhook_url(),
            Some("http://localhost/hook")
        );
    }
}
