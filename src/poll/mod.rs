//! The poll-cycle driver.
//!
//! One cycle runs `Fetching → Reconciling → Dispatching → Persisting` and
//! returns to idle; the loop fires cycles on a fixed interval. The
//! [`Engine`] is the single owner of the persistent state: the poller and
//! the command surface both mutate it only through the engine, never
//! directly.
//!
//! # Cycle Invariants
//!
//! - An empty subscriber set skips the whole cycle (nothing to notify, so
//!   nothing to fetch).
//! - An event's identity enters the seen set only when its notification
//!   reached at least one subscriber; events that reached nobody are
//!   retried wholesale next cycle.
//! - The seen set is pruned against the latest identity set only after a
//!   genuinely fresh fetch. Cache-served cycles leave it untouched.
//! - A failed state save never loses in-memory updates: the engine marks
//!   itself dirty and retries the save at the next persist opportunity.
//!
//! # Scheduling
//!
//! Cycles never overlap: the interval timer skips ticks that fire while a
//! cycle is still running. Shutdown cancels the timer and lets an
//! in-flight cycle finish naturally, avoiding partial seen-set updates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::fetch::{FetchCache, Freshness, RefreshPolicy};
use crate::notify::{self, Notifier};
use crate::reconcile;
use crate::store::{PersistentState, StateStore};

/// Default interval between poll cycles.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Single owner of the engine state.
///
/// Wraps the in-memory [`PersistentState`], its durable store, and the
/// fetch cache. Command handlers and the poll cycle both go through here.
pub struct Engine {
    state: Mutex<PersistentState>,
    store: StateStore,
    cache: FetchCache,
    /// Set when a save failed and the blob lags the in-memory state.
    dirty: AtomicBool,
}

impl Engine {
    /// Loads state from the store and wraps it. The one-time startup gate:
    /// call before the first cycle, not per cycle.
    pub fn load(store: StateStore, cache: FetchCache) -> Self {
        let state = store.load();
        Engine {
            state: Mutex::new(state),
            store,
            cache,
            dirty: AtomicBool::new(false),
        }
    }

    /// Wraps an explicit state, skipping the load. Used by tests.
    pub fn with_state(state: PersistentState, store: StateStore, cache: FetchCache) -> Self {
        Engine {
            state: Mutex::new(state),
            store,
            cache,
            dirty: AtomicBool::new(false),
        }
    }

    /// The shared fetch cache.
    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    /// A point-in-time copy of the state.
    pub async fn read_state(&self) -> PersistentState {
        self.state.lock().await.clone()
    }

    /// Applies a mutation and persists if it reports a change.
    ///
    /// The closure returns `(result, changed)`; a save also runs when a
    /// previous save failed, so no mutation is ever silently dropped.
    pub async fn update<R>(
        &self,
        mutate: impl FnOnce(&mut PersistentState) -> (R, bool),
    ) -> R {
        let mut state = self.state.lock().await;
        let (result, changed) = mutate(&mut state);
        if changed || self.is_dirty() {
            self.persist(&state);
        }
        result
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Saves the given state, tracking failure for later retry.
    fn persist(&self, state: &PersistentState) {
        match self.store.save(state) {
            Ok(()) => {
                if self.dirty.swap(false, Ordering::SeqCst) {
                    info!("state save retried successfully");
                }
            }
            Err(err) => {
                self.dirty.store(true, Ordering::SeqCst);
                error!(%err, "state save failed, in-memory state stays authoritative");
            }
        }
    }

    async fn lock_state(&self) -> MutexGuard<'_, PersistentState> {
        self.state.lock().await
    }
}

/// What one poll cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No subscribers; nothing was fetched.
    Skipped,
    /// The cycle ran to completion.
    Completed(CycleStats),
}

/// Counters from a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStats {
    pub freshness: Freshness,
    pub new_events: usize,
    pub delivered_events: usize,
    pub removed_subscribers: usize,
    pub pruned_identities: usize,
}

/// Runs one poll cycle: fetch, reconcile, dispatch, persist.
///
/// Never fails; every failure mode inside the cycle is absorbed (cache
/// fallback, per-subscriber isolation, dirty-save retry) and reflected in
/// the returned stats.
pub async fn run_cycle(engine: &Engine, notifier: &dyn Notifier) -> CycleOutcome {
    let mut state = engine.lock_state().await;

    if state.monitoring_channels.is_empty() {
        debug!("no subscriber channels, skipping poll cycle");
        return CycleOutcome::Skipped;
    }

    let read = engine.cache.fetch_or_cached(RefreshPolicy::Force).await;

    let recon = reconcile::reconcile(&read.records, &state.seen_closure_ids);
    let new_events = recon.new_records.len();
    if new_events > 0 {
        info!(new_events, freshness = ?read.freshness, "new closure events to notify");
    }

    let mut delivered_ids = Vec::new();
    let mut removed_subscribers = 0;

    for (id, record) in &recon.new_records {
        if state.monitoring_channels.is_empty() {
            warn!("all subscribers dropped mid-cycle, remaining events retry next cycle");
            break;
        }

        let notification = notify::render(*id, record);
        let outcome = notify::dispatch(notifier, &notification, &state.monitoring_channels).await;

        for channel in &outcome.remove {
            state.monitoring_channels.remove(channel);
            removed_subscribers += 1;
        }

        if outcome.any_delivered() {
            delivered_ids.push(*id);
        } else {
            warn!(event = %id, "notification reached no subscribers, retrying next cycle");
        }
    }

    let delivered_events = delivered_ids.len();
    reconcile::mark_delivered(&mut state.seen_closure_ids, delivered_ids);

    let pruned_identities = if read.is_fresh() {
        reconcile::prune_departed(&mut state.seen_closure_ids, &recon.all_identities)
    } else {
        0
    };

    let mutated = delivered_events > 0 || removed_subscribers > 0 || pruned_identities > 0;
    if mutated || engine.is_dirty() {
        engine.persist(&state);
    }

    CycleOutcome::Completed(CycleStats {
        freshness: read.freshness,
        new_events,
        delivered_events,
        removed_subscribers,
        pruned_identities,
    })
}

/// Runs poll cycles on `interval` until `shutdown` is cancelled.
///
/// Ticks that fire while a cycle is still running are skipped, never
/// stacked. Cancellation is only observed between cycles, so an in-flight
/// cycle always completes.
pub async fn run(
    engine: &Engine,
    notifier: &dyn Notifier,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_secs = interval.as_secs(), "closure poller started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("closure poller shutting down");
                return;
            }
            _ = ticker.tick() => {
                let outcome = run_cycle(engine, notifier).await;
                debug!(?outcome, "poll cycle finished");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use crate::identity;
    use crate::test_utils::{sample_record, ScriptedApi, ScriptedNotifier};
    use crate::types::{ChannelId, ClosureId, ClosureRecord, TimeWindow};
    use std::sync::Arc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn engine_with(
        api: Arc<ScriptedApi>,
        channels: &[u64],
        dir: &TempDir,
    ) -> Engine {
        let mut state = PersistentState::default();
        state
            .monitoring_channels
            .extend(channels.iter().copied().map(ChannelId));
        Engine::with_state(
            state,
            StateStore::new(dir.path().join("bot_state.json")),
            FetchCache::new(api),
        )
    }

    fn scheduled_closure() -> ClosureRecord {
        ClosureRecord {
            status: "Closure Scheduled".to_string(),
            kind: "Primary Date".to_string(),
            date: None,
            time: None,
            window: TimeWindow::new(1_700_000_000, 1_700_003_600),
            notes: None,
        }
    }

    #[tokio::test]
    async fn identical_fetches_notify_exactly_once() {
        let record = scheduled_closure();
        let api = ScriptedApi::new(vec![
            Ok(vec![record.clone()]),
            Ok(vec![record.clone()]),
        ]);
        let dir = TempDir::new().unwrap();
        let engine = engine_with(api, &[1], &dir);
        let notifier = ScriptedNotifier::default();

        let first = run_cycle(&engine, &notifier).await;
        assert_eq!(
            first,
            CycleOutcome::Completed(CycleStats {
                freshness: Freshness::Fresh,
                new_events: 1,
                delivered_events: 1,
                removed_subscribers: 0,
                pruned_identities: 0,
            })
        );
        let state = engine.read_state().await;
        assert_eq!(state.seen_closure_ids.len(), 1);
        assert!(state.seen_closure_ids.contains(&identity::derive(&record)));

        let second = run_cycle(&engine, &notifier).await;
        match second {
            CycleOutcome::Completed(stats) => {
                assert_eq!(stats.new_events, 0);
                assert_eq!(stats.delivered_events, 0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(notifier.sent_to().len(), 1);
    }

    #[tokio::test]
    async fn empty_subscriber_set_skips_without_fetching() {
        // An unscripted api panics on any fetch, so completing proves the
        // cycle never contacted upstream.
        let api = ScriptedApi::new(vec![]);
        let dir = TempDir::new().unwrap();
        let engine = engine_with(api, &[], &dir);

        let outcome = run_cycle(&engine, &ScriptedNotifier::default()).await;
        assert_eq!(outcome, CycleOutcome::Skipped);
    }

    #[tokio::test]
    async fn total_delivery_failure_retries_next_cycle() {
        let record = scheduled_closure();
        let api = ScriptedApi::new(vec![
            Ok(vec![record.clone()]),
            Ok(vec![record.clone()]),
        ]);
        let dir = TempDir::new().unwrap();
        let engine = engine_with(api, &[1], &dir);
        let notifier = ScriptedNotifier::default();
        notifier.set_failure(ChannelId(1), crate::notify::DeliveryError::transient("outage"));

        let first = run_cycle(&engine, &notifier).await;
        match first {
            CycleOutcome::Completed(stats) => {
                assert_eq!(stats.new_events, 1);
                assert_eq!(stats.delivered_events, 0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(engine.read_state().await.seen_closure_ids.is_empty());

        // Subscriber recovers: the same event comes back as new.
        notifier.clear_failure(ChannelId(1));
        let second = run_cycle(&engine, &notifier).await;
        match second {
            CycleOutcome::Completed(stats) => {
                assert_eq!(stats.new_events, 1);
                assert_eq!(stats.delivered_events, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(engine.read_state().await.seen_closure_ids.len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_with_empty_cache_completes_without_mutation() {
        let api = ScriptedApi::new(vec![Err(FetchError::Timeout)]);
        let dir = TempDir::new().unwrap();
        let engine = engine_with(api, &[1], &dir);

        let outcome = run_cycle(&engine, &ScriptedNotifier::default()).await;
        assert_eq!(
            outcome,
            CycleOutcome::Completed(CycleStats {
                freshness: Freshness::Empty,
                new_events: 0,
                delivered_events: 0,
                removed_subscribers: 0,
                pruned_identities: 0,
            })
        );
        assert!(engine.read_state().await.seen_closure_ids.is_empty());
    }

    #[tokio::test]
    async fn fresh_fetch_prunes_departed_identities() {
        let record = scheduled_closure();
        let api = ScriptedApi::new(vec![Ok(vec![record.clone()])]);
        let dir = TempDir::new().unwrap();
        let engine = engine_with(api, &[1], &dir);

        let stale = ClosureId(Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"departed"));
        engine
            .update(|state| {
                state.seen_closure_ids.insert(stale);
                ((), true)
            })
            .await;

        let outcome = run_cycle(&engine, &ScriptedNotifier::default()).await;
        match outcome {
            CycleOutcome::Completed(stats) => assert_eq!(stats.pruned_identities, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
        let state = engine.read_state().await;
        assert!(!state.seen_closure_ids.contains(&stale));
        assert!(state.seen_closure_ids.contains(&identity::derive(&record)));
    }

    #[tokio::test]
    async fn cached_cycle_never_prunes() {
        let record = scheduled_closure();
        let api = ScriptedApi::new(vec![
            Ok(vec![record.clone()]),
            Err(FetchError::Timeout),
        ]);
        let dir = TempDir::new().unwrap();
        let engine = engine_with(api, &[1], &dir);
        let notifier = ScriptedNotifier::default();

        run_cycle(&engine, &notifier).await;

        // An identity the feed no longer reports, inserted between cycles.
        let stale = ClosureId(Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"outage-survivor"));
        engine
            .update(|state| {
                state.seen_closure_ids.insert(stale);
                ((), true)
            })
            .await;

        let outcome = run_cycle(&engine, &notifier).await;
        match outcome {
            CycleOutcome::Completed(stats) => {
                assert_eq!(stats.freshness, Freshness::Cached);
                assert_eq!(stats.pruned_identities, 0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(engine.read_state().await.seen_closure_ids.contains(&stale));
    }

    #[tokio::test]
    async fn permanent_failure_drops_subscriber_but_event_is_seen() {
        let record = scheduled_closure();
        let api = ScriptedApi::new(vec![Ok(vec![record.clone()])]);
        let dir = TempDir::new().unwrap();
        let engine = engine_with(api, &[1, 2], &dir);
        let notifier = ScriptedNotifier::default();
        notifier.set_failure(
            ChannelId(1),
            crate::notify::DeliveryError::permanent("channel deleted"),
        );

        let outcome = run_cycle(&engine, &notifier).await;
        match outcome {
            CycleOutcome::Completed(stats) => {
                assert_eq!(stats.delivered_events, 1);
                assert_eq!(stats.removed_subscribers, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let state = engine.read_state().await;
        assert!(!state.monitoring_channels.contains(&ChannelId(1)));
        assert!(state.monitoring_channels.contains(&ChannelId(2)));
        assert_eq!(state.seen_closure_ids.len(), 1);

        // The removal survives a restart.
        let reloaded = StateStore::new(dir.path().join("bot_state.json")).load();
        assert_eq!(reloaded.monitoring_channels, state.monitoring_channels);
    }

    #[tokio::test]
    async fn failed_save_is_retried_at_next_persist_opportunity() {
        let record = scheduled_closure();
        let api = ScriptedApi::new(vec![
            Ok(vec![record.clone()]),
            Ok(vec![record.clone()]),
        ]);
        let dir = TempDir::new().unwrap();

        // A regular file where the state directory should be makes every
        // save fail until it is removed.
        let blocker = dir.path().join("state");
        std::fs::write(&blocker, b"in the way").unwrap();

        let mut state = PersistentState::default();
        state.monitoring_channels.insert(ChannelId(1));
        let engine = Engine::with_state(
            state,
            StateStore::new(blocker.join("bot_state.json")),
            FetchCache::new(api),
        );
        let notifier = ScriptedNotifier::default();

        run_cycle(&engine, &notifier).await;
        // Save failed, but the in-memory state kept the delivery.
        assert_eq!(engine.read_state().await.seen_closure_ids.len(), 1);

        std::fs::remove_file(&blocker).unwrap();

        // Nothing new this cycle, but the dirty flag forces a retried save.
        run_cycle(&engine, &notifier).await;
        let reloaded = StateStore::new(dir.path().join("state/bot_state.json")).load();
        assert_eq!(reloaded.seen_closure_ids.len(), 1);
    }

    #[tokio::test]
    async fn run_exits_on_cancellation() {
        let api = ScriptedApi::new(vec![]);
        let dir = TempDir::new().unwrap();
        let engine = engine_with(api, &[], &dir);
        let notifier = ScriptedNotifier::default();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        // All cycles skip (no subscribers); the loop must still observe the
        // cancelled token and return.
        run(
            &engine,
            &notifier,
            Duration::from_millis(1),
            shutdown,
        )
        .await;
    }
}
