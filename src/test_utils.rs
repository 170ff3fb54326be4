//! Shared test fixtures: sample data, proptest generators, and scripted
//! fakes for the fetch and delivery seams.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use proptest::prelude::*;

use crate::fetch::{ClosureApi, FetchError};
use crate::notify::{DeliveryError, Notification, Notifier};
use crate::types::{
    ChannelId, ClosureRecord, ManagedClosure, ManagedClosureFields, TimeWindow,
};

/// A distinct, valid closure record per seed.
pub fn sample_record(seed: i64) -> ClosureRecord {
    let start = 1_700_000_000 + seed * 7_200;
    ClosureRecord {
        status: "Closure Scheduled".to_string(),
        kind: "Primary Date".to_string(),
        date: Some("May 12, 2025".to_string()),
        time: None,
        window: TimeWindow::new(start, start + 3_600),
        notes: None,
    }
}

/// A managed closure with the given window.
pub fn sample_managed_closure(start: i64, end: i64) -> ManagedClosure {
    ManagedClosure::create(ManagedClosureFields {
        status: "Closure Scheduled".to_string(),
        kind: "Local".to_string(),
        date: None,
        time: None,
        start,
        end,
        notes: None,
    })
}

pub fn arb_closure_record() -> impl Strategy<Value = ClosureRecord> {
    let status = prop_oneof![
        Just("Possible Closure".to_string()),
        Just("Closure Scheduled".to_string()),
        Just("Closure Revoked".to_string()),
        Just("HWY 4 Road Delay".to_string()),
        Just("TFR".to_string()),
        "[A-Za-z ]{1,24}",
    ];
    let kind = prop_oneof![
        Just("Primary Date".to_string()),
        Just("Backup Date".to_string()),
        "[A-Za-z ]{1,16}",
    ];
    (
        status,
        kind,
        946_684_800i64..4_102_444_800,
        1i64..100_000,
        proptest::option::of("[A-Za-z0-9, ]{1,20}"),
        proptest::option::of("[A-Za-z0-9:. ]{1,20}"),
        proptest::option::of("[A-Za-z0-9 ]{1,40}"),
    )
        .prop_map(|(status, kind, start, len, date, time, notes)| ClosureRecord {
            status,
            kind,
            date,
            time,
            window: TimeWindow::new(start, start + len),
            notes,
        })
}

/// A [`ClosureApi`] that replays a fixed script of fetch results.
///
/// Panics if fetched more often than scripted, so tests notice unexpected
/// upstream traffic.
pub struct ScriptedApi {
    script: Mutex<VecDeque<Result<Vec<ClosureRecord>, FetchError>>>,
    calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new(script: Vec<Result<Vec<ClosureRecord>, FetchError>>) -> Arc<Self> {
        Arc::new(ScriptedApi {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Number of upstream fetches performed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClosureApi for ScriptedApi {
    async fn fetch(&self) -> Result<Vec<ClosureRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedApi: more fetches than scripted results")
    }
}

/// A [`Notifier`] that succeeds unless a channel is configured to fail.
#[derive(Default)]
pub struct ScriptedNotifier {
    failures: Mutex<HashMap<ChannelId, DeliveryError>>,
    sent: Mutex<Vec<ChannelId>>,
}

impl ScriptedNotifier {
    /// Configures a channel to fail with the given error (builder form).
    pub fn failing(self, channel: ChannelId, err: DeliveryError) -> Self {
        self.set_failure(channel, err);
        self
    }

    /// Configures a channel to fail with the given error.
    pub fn set_failure(&self, channel: ChannelId, err: DeliveryError) {
        self.failures.lock().unwrap().insert(channel, err);
    }

    /// Makes a channel deliverable again.
    pub fn clear_failure(&self, channel: ChannelId) {
        self.failures.lock().unwrap().remove(&channel);
    }

    /// Channels that received a notification, in delivery order.
    pub fn sent_to(&self) -> Vec<ChannelId> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for ScriptedNotifier {
    async fn send(
        &self,
        channel: ChannelId,
        _notification: &Notification,
    ) -> Result<(), DeliveryError> {
        if let Some(err) = self.failures.lock().unwrap().get(&channel) {
            return Err(err.clone());
        }
        self.sent.lock().unwrap().push(channel);
        Ok(())
    }
}
