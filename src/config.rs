//! Runtime configuration.
//!
//! Everything is overridable via `CLOSURE_WATCH_*` environment variables;
//! defaults point at the production feed.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::{DEFAULT_CACHE_TTL_SECS, DEFAULT_FETCH_TIMEOUT_SECS};
use crate::poll::DEFAULT_POLL_INTERVAL_SECS;

/// Default upstream feed endpoint.
pub const DEFAULT_FEED_URL: &str = "https://starbase.nerdpg.live/api/json/roadClosures";

/// Default state blob path, relative to the working directory.
pub const DEFAULT_STATE_PATH: &str = "bot_state.json";

/// Roles allowed to run mutating commands, unless overridden.
pub const DEFAULT_ALLOWED_ROLES: [&str; 3] = ["Moderator", "Admin", "Road Closure Manager"];

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream closures endpoint.
    pub feed_url: String,

    /// Path of the persistent state blob.
    pub state_path: PathBuf,

    /// Interval between poll cycles.
    pub poll_interval: Duration,

    /// Per-request deadline for the upstream fetch.
    pub fetch_timeout: Duration,

    /// Age under which an unforced read is served from cache.
    pub cache_ttl: Duration,

    /// Role names allowed to run mutating commands.
    pub allowed_roles: BTreeSet<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Config {
            feed_url: DEFAULT_FEED_URL.to_string(),
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            allowed_roles: DEFAULT_ALLOWED_ROLES
                .iter()
                .map(|r| r.to_string())
                .collect(),
        }
    }

    /// Creates a configuration from environment variables.
    ///
    /// - `CLOSURE_WATCH_FEED_URL`
    /// - `CLOSURE_WATCH_STATE_PATH`
    /// - `CLOSURE_WATCH_POLL_INTERVAL_SECS`
    /// - `CLOSURE_WATCH_FETCH_TIMEOUT_SECS`
    /// - `CLOSURE_WATCH_CACHE_TTL_SECS`
    /// - `CLOSURE_WATCH_ALLOWED_ROLES` (comma-separated)
    ///
    /// Unset or unparsable variables fall back to defaults.
    pub fn from_env() -> Self {
        let mut config = Config::new();

        if let Ok(url) = std::env::var("CLOSURE_WATCH_FEED_URL") {
            if !url.is_empty() {
                config.feed_url = url;
            }
        }
        if let Ok(path) = std::env::var("CLOSURE_WATCH_STATE_PATH") {
            if !path.is_empty() {
                config.state_path = PathBuf::from(path);
            }
        }
        if let Some(secs) = env_secs("CLOSURE_WATCH_POLL_INTERVAL_SECS") {
            config.poll_interval = secs;
        }
        if let Some(secs) = env_secs("CLOSURE_WATCH_FETCH_TIMEOUT_SECS") {
            config.fetch_timeout = secs;
        }
        if let Some(secs) = env_secs("CLOSURE_WATCH_CACHE_TTL_SECS") {
            config.cache_ttl = secs;
        }
        if let Ok(roles) = std::env::var("CLOSURE_WATCH_ALLOWED_ROLES") {
            let parsed: BTreeSet<String> = roles
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
            if !parsed.is_empty() {
                config.allowed_roles = parsed;
            }
        }

        config
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs)
}
