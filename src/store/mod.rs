//! Durable persistence of the engine state.
//!
//! The whole state is one JSON blob: subscriber channels, identities
//! already notified, and operator-entered closures. It is loaded once at
//! startup and rewritten after every mutation that must survive a restart.
//!
//! # Crash Safety
//!
//! Saves use write-to-temp-then-rename with file and directory fsync, so a
//! crash mid-write leaves either the old blob or the new one, never a
//! half-written file.
//!
//! # Tolerant Load
//!
//! A missing file is an empty state (first run); a malformed file is
//! logged and reset to empty rather than crashing the bot. A save failure
//! is reported to the caller, who keeps the in-memory state authoritative
//! and retries at the next persist opportunity.

pub mod fsync;

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::reconcile::SeenSet;
use crate::types::{ChannelId, ManagedClosure, ManagedId};

use self::fsync::{fsync_dir, fsync_file};

/// Errors that can occur saving state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The persisted engine state.
///
/// Field names are the wire keys of the state blob; ordered collections
/// keep the serialized form byte-stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentState {
    /// Subscriber channels receiving closure notifications.
    #[serde(default)]
    pub monitoring_channels: BTreeSet<ChannelId>,

    /// Identities already delivered to at least one subscriber.
    #[serde(default)]
    pub seen_closure_ids: SeenSet,

    /// Operator-entered closures, in creation order.
    #[serde(default)]
    pub managed_closures: Vec<ManagedClosure>,
}

impl PersistentState {
    /// Finds a managed closure by id.
    pub fn managed_closure(&self, id: ManagedId) -> Option<&ManagedClosure> {
        self.managed_closures.iter().find(|c| c.id == id)
    }

    /// Finds a managed closure by id, mutably.
    pub fn managed_closure_mut(&mut self, id: ManagedId) -> Option<&mut ManagedClosure> {
        self.managed_closures.iter_mut().find(|c| c.id == id)
    }

    /// Removes a managed closure from storage. Returns whether it existed.
    pub fn remove_managed_closure(&mut self, id: ManagedId) -> bool {
        let before = self.managed_closures.len();
        self.managed_closures.retain(|c| c.id != id);
        self.managed_closures.len() < before
    }

    /// Managed closures whose end has not passed at `now` (Unix seconds).
    ///
    /// Expired entries stay in storage; expiry only affects display.
    pub fn active_managed_closures(&self, now: i64) -> Vec<&ManagedClosure> {
        self.managed_closures
            .iter()
            .filter(|c| c.active_at(now))
            .collect()
    }
}

/// File-backed store for [`PersistentState`].
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Creates a store over the given blob path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StateStore { path: path.into() }
    }

    /// Returns the blob path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the state, tolerating a missing or corrupt file.
    pub fn load(&self) -> PersistentState {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no state file, starting empty");
                return PersistentState::default();
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "state file unreadable, starting empty");
                return PersistentState::default();
            }
        };

        match serde_json::from_slice::<PersistentState>(&bytes) {
            Ok(state) => {
                info!(
                    channels = state.monitoring_channels.len(),
                    seen = state.seen_closure_ids.len(),
                    managed = state.managed_closures.len(),
                    "state loaded"
                );
                state
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "state file malformed, resetting to empty");
                PersistentState::default()
            }
        }
    }

    /// Saves the state atomically.
    ///
    /// Write to `<path>.tmp`, fsync, rename over `<path>`, fsync the
    /// directory. On error the previous blob is untouched.
    pub fn save(&self, state: &PersistentState) -> Result<()> {
        use std::fs::OpenOptions;
        use std::io::Write;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(state)?;

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&bytes)?;
            fsync_file(&file)?;
        }

        std::fs::rename(&tmp_path, &self.path)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fsync_dir(parent)?;
            }
        }

        Ok(())
    }
}
