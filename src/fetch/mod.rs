//! Upstream feed access: client, error taxonomy, and the serialized cache.
//!
//! The rest of the crate goes through [`FetchCache`]; only `main` constructs
//! the concrete [`HttpClosureApi`].

pub mod cache;
pub mod client;
pub mod error;

pub use cache::{CacheRead, FetchCache, Freshness, RefreshPolicy, DEFAULT_CACHE_TTL_SECS};
pub use client::{ClosureApi, HttpClosureApi, DEFAULT_FETCH_TIMEOUT_SECS};
pub use error::FetchError;
