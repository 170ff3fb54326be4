//! Upstream feed client.
//!
//! [`ClosureApi`] is the seam the cache and tests plug into; the real
//! implementation is a thin reqwest wrapper that enforces the feed
//! contract: HTTP 200 with a JSON array body. Item-level validation (the
//! single parse step) also happens here, so everything behind this trait
//! deals in validated records only.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::types::ClosureRecord;

use super::error::FetchError;

/// Default per-request deadline for the upstream feed.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;

/// Source of closure records.
#[async_trait]
pub trait ClosureApi: Send + Sync {
    /// Fetches and validates the current feed.
    ///
    /// Returns only valid records; malformed items are skipped and logged
    /// by the parse step. A non-array body or non-2xx status is a
    /// [`FetchError`].
    async fn fetch(&self) -> Result<Vec<ClosureRecord>, FetchError>;
}

/// Feed client over HTTP.
pub struct HttpClosureApi {
    client: reqwest::Client,
    url: String,
}

impl HttpClosureApi {
    /// Creates a client for the given feed URL with the default timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, std::time::Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
    }

    /// Creates a client with an explicit per-request deadline.
    pub fn with_timeout(url: impl Into<String>, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client construction only fails on TLS backend misconfiguration");
        HttpClosureApi {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ClosureApi for HttpClosureApi {
    async fn fetch(&self) -> Result<Vec<ClosureRecord>, FetchError> {
        debug!(url = %self.url, "fetching closure feed");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?
            .error_for_status()
            .map_err(FetchError::from_reqwest)?;

        let body: Value = response.json().await.map_err(FetchError::from_reqwest)?;

        let items = body.as_array().ok_or_else(|| {
            FetchError::malformed(format!("expected a JSON array, got {}", json_kind(&body)))
        })?;

        let (records, skipped) = ClosureRecord::parse_feed(items);
        debug!(
            total = items.len(),
            valid = records.len(),
            skipped,
            "closure feed fetched"
        );
        Ok(records)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
