//! Error types for registry fetches.

use std::time::Duration;

use thiserror::Error;

/// Errors from fetching the server list. None of these are fatal: the poll
/// cycle is skipped and the next tick proceeds normally.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Registry did not respond within {}s", .after.as_secs_f32())]
    Timeout { after: Duration },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Registry returned HTTP {status}")]
    Status { status: u16 },

    #[error("Invalid registry response: {reason}")]
    Decode { reason: String },

    #[error("Invalid registry URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}
