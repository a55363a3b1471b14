//! Action batching with optimistic local state
//!
//! High-frequency vote actions (one button press = one unit of a side) are
//! coalesced into at most one outgoing message per side per flush interval.
//! Each recorded action also appends an optimistic delta used to derive the
//! local tally until the server's next snapshot supersedes it.
//!
//! `BatchState` is pure bookkeeping; `Batcher` owns the flush timer and the
//! action queue the UI funnels into.

use crate::protocol::destinations::APP_PRAYER;
use crate::protocol::{now_millis, PrayerRequest, Side};
use crate::transport::Publisher;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, warn};

/// One optimistic delta awaiting server acknowledgment
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub side: Side,
    pub count: u32,
    pub timestamp_ms: i64,
}

/// Accumulated per-side counts plus the optimistic delta list
#[derive(Debug, Default)]
pub struct BatchState {
    accum: BTreeMap<Side, u32>,
    pending: Vec<PendingAction>,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one action: bump the accumulator and append a delta
    pub fn record(&mut self, side: Side, now_ms: i64) {
        *self.accum.entry(side).or_insert(0) += 1;
        self.pending.push(PendingAction {
            side,
            count: 1,
            timestamp_ms: now_ms,
        });
    }

    /// Whether any side has an unsent count
    pub fn has_accumulated(&self) -> bool {
        self.accum.values().any(|&count| count > 0)
    }

    /// Take the accumulated counts as outgoing requests, resetting the
    /// accumulators. Zero-count sides are never emitted. Callers must gate
    /// this on the transport actually being able to send — draining while
    /// disconnected would lose the counts.
    pub fn drain_accumulated(&mut self) -> Vec<PrayerRequest> {
        let mut requests = Vec::new();
        for side in Side::ALL {
            if let Some(count) = self.accum.get_mut(&side) {
                if *count > 0 {
                    requests.push(PrayerRequest { side, count: *count });
                    *count = 0;
                }
            }
        }
        requests
    }

    /// Authoritative snapshot received: every pending delta up to this point
    /// is superseded and discarded. Deltas that raced the snapshot are
    /// dropped too — the accepted trade-off is a brief undercount, not a
    /// merge.
    pub fn reconcile_snapshot(&mut self) {
        self.pending.clear();
    }

    /// Server rejected our traffic (rate limit): roll back the optimistic
    /// view. Accumulators are left untouched — already-sent data is not
    /// resent, and unsent counts still flush later.
    pub fn rollback(&mut self) {
        self.pending.clear();
    }

    /// Deltas not yet acknowledged by a snapshot
    pub fn pending(&self) -> &[PendingAction] {
        &self.pending
    }

    pub fn accumulated(&self, side: Side) -> u32 {
        self.accum.get(&side).copied().unwrap_or(0)
    }
}

/// Timer-driven batcher: buffers actions and flushes them through a
/// [`Publisher`] at a fixed interval.
///
/// The flush timer is single-shot and armed by the first action after an
/// idle period; at most one is outstanding. A flush that finds the transport
/// disconnected keeps the counts and re-arms the timer for the next tick.
pub struct Batcher {
    state: Arc<Mutex<BatchState>>,
    action_tx: mpsc::UnboundedSender<Side>,
    task: Option<JoinHandle<()>>,
}

impl Batcher {
    /// Spawn the batching task against a publisher
    pub fn spawn(publisher: Arc<dyn Publisher>, flush_interval: Duration) -> Self {
        let state = Arc::new(Mutex::new(BatchState::new()));
        let (action_tx, action_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_batcher(
            state.clone(),
            action_rx,
            publisher,
            flush_interval,
        ));

        Self {
            state,
            action_tx,
            task: Some(task),
        }
    }

    /// Record one user action (the UI's entry point)
    pub fn record(&self, side: Side) {
        if self.action_tx.send(side).is_err() {
            warn!("Batcher task is gone; dropping action");
        }
    }

    /// Shared state handle for reconciliation and local-tally derivation
    pub fn shared_state(&self) -> Arc<Mutex<BatchState>> {
        self.state.clone()
    }

    /// Stop the batching task. Unflushed counts are dropped, matching the
    /// in-memory-only contract of the pending batch.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Batcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_batcher(
    state: Arc<Mutex<BatchState>>,
    mut action_rx: mpsc::UnboundedReceiver<Side>,
    publisher: Arc<dyn Publisher>,
    flush_interval: Duration,
) {
    let mut flush_timer: Option<Pin<Box<Sleep>>> = None;

    loop {
        tokio::select! {
            action = action_rx.recv() => {
                match action {
                    Some(side) => {
                        if let Ok(mut state) = state.lock() {
                            state.record(side, now_millis());
                        }
                        if flush_timer.is_none() {
                            flush_timer = Some(Box::pin(tokio::time::sleep(flush_interval)));
                        }
                    }
                    None => break, // all handles dropped
                }
            }
            () = wait_for(&mut flush_timer) => {
                flush_timer = None;

                if publisher.is_connected() {
                    let requests = match state.lock() {
                        Ok(mut state) => state.drain_accumulated(),
                        Err(_) => Vec::new(),
                    };
                    for request in requests {
                        match serde_json::to_vec(&request) {
                            Ok(body) => {
                                debug!(side = %request.side, count = request.count, "Flushing batched actions");
                                publisher.send(APP_PRAYER, body);
                            }
                            Err(e) => warn!("Failed to serialize prayer request: {}", e),
                        }
                    }
                } else {
                    // Counts are retained and retried on the next tick
                    let retained = state
                        .lock()
                        .map(|state| state.has_accumulated())
                        .unwrap_or(false);
                    if retained {
                        debug!("Transport down at flush time; retrying next tick");
                        flush_timer = Some(Box::pin(tokio::time::sleep(flush_interval)));
                    }
                }
            }
        }
    }
}

/// Resolve when the armed timer fires; park forever while unarmed
async fn wait_for(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
