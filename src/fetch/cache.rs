//! Short-lived cache and single-flight wrapper around the feed client.
//!
//! The poller and on-demand command fetches share one cache, so a user
//! query never races the background poll into a second upstream request.
//! All fetches serialize through one async mutex; a caller that arrives
//! while a fetch is in flight waits for it and then reads the updated
//! cache.
//!
//! On failure the last good payload is served indefinitely (staleness
//! only delays notifications, it never corrupts state) and callers are
//! told whether they got live data, cached data, or nothing, because the
//! seen-set pruning rule only applies after a genuinely fresh fetch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::ClosureRecord;

use super::client::ClosureApi;
use super::error::FetchError;

/// Default window during which an unforced read is served from cache.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Whether a read may be satisfied from a recent cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Serve the cache if it is younger than the TTL; fetch otherwise.
    IfStale,
    /// Always contact upstream (the background poller, `force_refetch`).
    Force,
}

/// Where the records in a [`CacheRead`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// A live upstream fetch succeeded just now.
    Fresh,
    /// Served from the last good payload (TTL hit or upstream failure).
    Cached,
    /// Upstream failed and no payload has ever been cached.
    Empty,
}

/// The result of a never-failing cache read.
#[derive(Debug, Clone)]
pub struct CacheRead {
    pub records: Vec<ClosureRecord>,
    pub freshness: Freshness,
    /// Set when a live fetch was attempted this read and failed.
    pub fetch_error: Option<FetchError>,
}

impl CacheRead {
    /// Whether the records came from a live fetch.
    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh
    }
}

struct CacheInner {
    payload: Option<Vec<ClosureRecord>>,
    fetched_at: Option<Instant>,
}

/// Serialized, falling-back fetch cache over a [`ClosureApi`].
pub struct FetchCache {
    api: Arc<dyn ClosureApi>,
    ttl: Duration,
    inner: Mutex<CacheInner>,
}

impl FetchCache {
    /// Wraps a feed client with the default TTL.
    pub fn new(api: Arc<dyn ClosureApi>) -> Self {
        Self::with_ttl(api, Duration::from_secs(DEFAULT_CACHE_TTL_SECS))
    }

    /// Wraps a feed client with an explicit TTL for unforced reads.
    pub fn with_ttl(api: Arc<dyn ClosureApi>, ttl: Duration) -> Self {
        FetchCache {
            api,
            ttl,
            inner: Mutex::new(CacheInner {
                payload: None,
                fetched_at: None,
            }),
        }
    }

    /// Performs a live fetch, updating the cache on success.
    ///
    /// Errors propagate; use [`fetch_or_cached`](Self::fetch_or_cached)
    /// for the never-failing variant.
    pub async fn fetch(&self) -> Result<Vec<ClosureRecord>, FetchError> {
        let mut inner = self.inner.lock().await;
        self.fetch_locked(&mut inner).await
    }

    /// Reads the feed without ever failing.
    ///
    /// With [`RefreshPolicy::IfStale`], a cache younger than the TTL is
    /// returned without contacting upstream. Otherwise a live fetch is
    /// attempted; on failure the last good payload (or an empty list) is
    /// returned with the error attached.
    pub async fn fetch_or_cached(&self, policy: RefreshPolicy) -> CacheRead {
        let mut inner = self.inner.lock().await;

        if policy == RefreshPolicy::IfStale {
            let within_ttl = inner
                .fetched_at
                .map(|at| at.elapsed() < self.ttl)
                .unwrap_or(false);
            if within_ttl {
                if let Some(payload) = &inner.payload {
                    debug!(records = payload.len(), "serving closure feed from cache");
                    return CacheRead {
                        records: payload.clone(),
                        freshness: Freshness::Cached,
                        fetch_error: None,
                    };
                }
            }
        }

        match self.fetch_locked(&mut inner).await {
            Ok(records) => CacheRead {
                records,
                freshness: Freshness::Fresh,
                fetch_error: None,
            },
            Err(err) => match &inner.payload {
                Some(payload) => {
                    warn!(%err, records = payload.len(), "fetch failed, serving last good payload");
                    CacheRead {
                        records: payload.clone(),
                        freshness: Freshness::Cached,
                        fetch_error: Some(err),
                    }
                }
                None => {
                    warn!(%err, "fetch failed with no cached payload");
                    CacheRead {
                        records: Vec::new(),
                        freshness: Freshness::Empty,
                        fetch_error: Some(err),
                    }
                }
            },
        }
    }

    async fn fetch_locked(
        &self,
        inner: &mut CacheInner,
    ) -> Result<Vec<ClosureRecord>, FetchError> {
        let records = self.api.fetch().await?;
        inner.payload = Some(records.clone());
        inner.fetched_at = Some(Instant::now());
        Ok(records)
    }
}
