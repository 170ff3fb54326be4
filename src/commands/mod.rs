//! Operator command surface.
//!
//! The chat-UI layer parses user input, resolves the caller's roles, and
//! calls these handlers; everything here is transport-agnostic. Handlers
//! take all parameters up front as validated values; there is no
//! multi-turn prompting in the engine.
//!
//! Mutating commands are gated by a role-membership check: the host
//! platform supplies the caller's role names, this module compares them
//! (case-insensitively) against the configured allow-set, with a bypass
//! for the server owner. Listing closures is open to everyone.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::fetch::{FetchError, Freshness, RefreshPolicy};
use crate::poll::Engine;
use crate::types::{
    ChannelId, ClosureRecord, ManagedClosure, ManagedClosureEdit, ManagedClosureFields, ManagedId,
};

/// Errors surfaced to the chat-UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The caller lacks every allowed role and is not the owner.
    #[error("you do not have permission to use this command")]
    PermissionDenied,

    /// No managed closure with this id exists.
    #[error("managed closure {0} not found")]
    UnknownClosure(ManagedId),

    /// A closure window must end after it starts.
    #[error("invalid time window: end {end} is not after start {start}")]
    InvalidTimeWindow { start: i64, end: i64 },
}

/// Result type for command handlers.
pub type Result<T> = std::result::Result<T, CommandError>;

/// The caller of a command, as resolved by the host platform.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    /// Role names the caller holds, verbatim from the platform.
    pub roles: Vec<String>,
    /// Guild/server owners bypass the role check.
    pub is_owner: bool,
}

impl Caller {
    pub fn with_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Caller {
            roles: roles.into_iter().map(Into::into).collect(),
            is_owner: false,
        }
    }

    pub fn owner() -> Self {
        Caller {
            roles: Vec::new(),
            is_owner: true,
        }
    }
}

/// Reply to a subscription command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeReply {
    Subscribed,
    AlreadySubscribed,
}

/// Reply to an unsubscription command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeReply {
    Unsubscribed,
    NotSubscribed,
}

/// Where a listed closure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureSource {
    /// The upstream feed.
    Feed,
    /// Entered by an operator; carries the id used for edit/remove.
    Local(ManagedId),
}

/// One entry of the merged closure listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedClosure {
    pub source: ClosureSource,
    pub record: ClosureRecord,
}

/// The merged closure listing with its staleness indicator.
///
/// `fetch_error` set means the feed entries are cached or missing; the UI
/// renders a warning instead of failing the command. `Freshness::Empty`
/// with no local entries is the explicit no-data state.
#[derive(Debug, Clone)]
pub struct ClosureListing {
    pub entries: Vec<ListedClosure>,
    pub freshness: Freshness,
    pub fetch_error: Option<FetchError>,
}

/// Command handlers bound to an [`Engine`] and a role allow-set.
pub struct CommandContext {
    engine: Arc<Engine>,
    /// Lowercased allowed role names.
    allowed_roles: BTreeSet<String>,
}

impl CommandContext {
    pub fn new<I, S>(engine: Arc<Engine>, allowed_roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        CommandContext {
            engine,
            allowed_roles: allowed_roles
                .into_iter()
                .map(|r| r.as_ref().to_lowercase())
                .collect(),
        }
    }

    fn authorize(&self, caller: &Caller) -> Result<()> {
        if caller.is_owner {
            return Ok(());
        }
        let permitted = caller
            .roles
            .iter()
            .any(|role| self.allowed_roles.contains(&role.to_lowercase()));
        if permitted {
            Ok(())
        } else {
            Err(CommandError::PermissionDenied)
        }
    }

    /// Adds a channel to the notification subscribers.
    pub async fn subscribe(&self, caller: &Caller, channel: ChannelId) -> Result<SubscribeReply> {
        self.authorize(caller)?;
        let reply = self
            .engine
            .update(|state| {
                if state.monitoring_channels.insert(channel) {
                    (SubscribeReply::Subscribed, true)
                } else {
                    (SubscribeReply::AlreadySubscribed, false)
                }
            })
            .await;
        if reply == SubscribeReply::Subscribed {
            info!(%channel, "channel subscribed to closure updates");
        }
        Ok(reply)
    }

    /// Removes a channel from the notification subscribers.
    pub async fn unsubscribe(
        &self,
        caller: &Caller,
        channel: ChannelId,
    ) -> Result<UnsubscribeReply> {
        self.authorize(caller)?;
        let reply = self
            .engine
            .update(|state| {
                if state.monitoring_channels.remove(&channel) {
                    (UnsubscribeReply::Unsubscribed, true)
                } else {
                    (UnsubscribeReply::NotSubscribed, false)
                }
            })
            .await;
        if reply == UnsubscribeReply::Unsubscribed {
            info!(%channel, "channel unsubscribed from closure updates");
        }
        Ok(reply)
    }

    /// Lists subscribed channels.
    pub async fn list_subscribers(&self, caller: &Caller) -> Result<Vec<ChannelId>> {
        self.authorize(caller)?;
        let state = self.engine.read_state().await;
        Ok(state.monitoring_channels.iter().copied().collect())
    }

    /// The merged feed + local closure listing.
    ///
    /// `force_refetch` bypasses the cache TTL; otherwise a recent cache is
    /// served without contacting upstream. Never fails: fetch problems
    /// degrade to cached or local-only data with the error attached.
    pub async fn list_closures(&self, force_refetch: bool) -> ClosureListing {
        self.list_closures_at(force_refetch, Utc::now().timestamp())
            .await
    }

    /// [`list_closures`](Self::list_closures) at an explicit `now`.
    pub async fn list_closures_at(&self, force_refetch: bool, now: i64) -> ClosureListing {
        let policy = if force_refetch {
            RefreshPolicy::Force
        } else {
            RefreshPolicy::IfStale
        };
        let read = self.engine.cache().fetch_or_cached(policy).await;

        let mut entries: Vec<ListedClosure> = read
            .records
            .iter()
            .map(|record| ListedClosure {
                source: ClosureSource::Feed,
                record: record.clone(),
            })
            .collect();

        let state = self.engine.read_state().await;
        entries.extend(
            state
                .active_managed_closures(now)
                .into_iter()
                .map(|closure| ListedClosure {
                    source: ClosureSource::Local(closure.id),
                    record: closure.as_record(),
                }),
        );

        entries.sort_by_key(|entry| entry.record.window.start);

        ClosureListing {
            entries,
            freshness: read.freshness,
            fetch_error: read.fetch_error,
        }
    }

    /// Creates a managed closure, returning its bot-assigned id.
    pub async fn add_managed_closure(
        &self,
        caller: &Caller,
        fields: ManagedClosureFields,
    ) -> Result<ManagedId> {
        self.authorize(caller)?;
        if fields.end <= fields.start {
            return Err(CommandError::InvalidTimeWindow {
                start: fields.start,
                end: fields.end,
            });
        }

        let closure = ManagedClosure::create(fields);
        let id = closure.id;
        self.engine
            .update(|state| {
                state.managed_closures.push(closure);
                ((), true)
            })
            .await;
        info!(%id, "managed closure added");
        Ok(id)
    }

    /// Edits a managed closure field-by-field; unset fields are kept.
    pub async fn edit_managed_closure(
        &self,
        caller: &Caller,
        id: ManagedId,
        edit: ManagedClosureEdit,
    ) -> Result<()> {
        self.authorize(caller)?;
        self.engine
            .update(|state| {
                let Some(closure) = state.managed_closure_mut(id) else {
                    return (Err(CommandError::UnknownClosure(id)), false);
                };

                let mut edited = closure.clone();
                edited.apply_edit(edit);
                if edited.window.end <= edited.window.start {
                    return (
                        Err(CommandError::InvalidTimeWindow {
                            start: edited.window.start,
                            end: edited.window.end,
                        }),
                        false,
                    );
                }

                *closure = edited;
                (Ok(()), true)
            })
            .await?;
        info!(%id, "managed closure edited");
        Ok(())
    }

    /// Deletes a managed closure from storage.
    ///
    /// Managed closures never enter the seen set, so removal has no
    /// deduplication side effects.
    pub async fn remove_managed_closure(&self, caller: &Caller, id: ManagedId) -> Result<()> {
        self.authorize(caller)?;
        self.engine
            .update(|state| {
                if state.remove_managed_closure(id) {
                    (Ok(()), true)
                } else {
                    (Err(CommandError::UnknownClosure(id)), false)
                }
            })
            .await?;
        info!(%id, "managed closure removed");
        Ok(())
    }
}
