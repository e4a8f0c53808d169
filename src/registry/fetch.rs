//! Fetching the server list from the registry.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::error::FetchError;
use super::record::RawRecord;

/// Source of the current server list.
#[async_trait]
pub trait RegistryFetcher: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Fetch the full list of running servers.
    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError>;
}

/// Registry client speaking JSON over HTTP(S).
///
/// Issues `GET {backend_url}/servers` and expects a JSON array of objects.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    url: reqwest::Url,
    timeout: Duration,
}

impl HttpRegistry {
    /// Create a client for the registry rooted at `backend_url`.
    pub fn new(backend_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let raw = format!("{}/servers", backend_url.trim_end_matches('/'));
        let url = reqwest::Url::parse(&raw).map_err(|e| FetchError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("serverwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| FetchError::Transport {
                url: raw,
                source,
            })?;

        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    fn classify(&self, source: reqwest::Error) -> FetchError {
        if source.is_timeout() {
            FetchError::Timeout {
                after: self.timeout,
            }
        } else {
            FetchError::Transport {
                url: self.url.to_string(),
                source,
            }
        }
    }
}

#[async_trait]
impl RegistryFetcher for HttpRegistry {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        parse_server_list(&body)
    }
}

/// Parse a registry response body into records.
///
/// The body must be a JSON array. Entries that aren't objects are skipped;
/// objects with bad fields are kept and defaulted at resolution time.
pub fn parse_server_list(body: &[u8]) -> Result<Vec<RawRecord>, FetchError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| FetchError::Decode {
        reason: e.to_string(),
    })?;

    let Value::Array(entries) = value else {
        return Err(FetchError::Decode {
            reason: "expected a JSON array of servers".to_string(),
        });
    };

    let total = entries.len();
    let records: Vec<RawRecord> = entries.into_iter().filter_map(RawRecord::from_value).collect();
    if records.len() < total {
        tracing::warn!(
            "[registry] skipped {} non-object entries",
            total - records.len()
        );
    }

    Ok(records)
}
