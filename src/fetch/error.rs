//! Fetch error taxonomy.
//!
//! All three variants are non-fatal to callers: the cache layer resolves
//! them by serving the last good payload (or nothing). The classification
//! exists so logs and the staleness indicator can say *why* data is stale.

use thiserror::Error;

/// An upstream fetch failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request exceeded the configured deadline.
    #[error("fetch timed out")]
    Timeout,

    /// DNS/connection failure or an HTTP error status.
    #[error("transport error{}: {message}", match .status { Some(s) => format!(" (HTTP {s})"), None => String::new() })]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The body was not a JSON array of objects.
    #[error("malformed payload: {message}")]
    MalformedPayload { message: String },
}

impl FetchError {
    /// Classifies a reqwest error.
    ///
    /// Timeouts are split out first; decode failures count as malformed
    /// payload; everything else (connect, DNS, redirect, status) is
    /// transport.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return FetchError::Timeout;
        }
        if err.is_decode() {
            return FetchError::MalformedPayload {
                message: err.to_string(),
            };
        }
        FetchError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }

    /// A malformed-payload error with the given description.
    pub fn malformed(message: impl Into<String>) -> Self {
        FetchError::MalformedPayload {
            message: message.into(),
        }
    }
}
