//! Feed session: composition root for the client, batcher, and boards
//!
//! Owns the subscription wiring: prayer snapshots reconcile the batcher's
//! optimistic deltas, rate-limit rejections roll them back and raise a
//! notice, ticker and liquidation updates land on their boards. Malformed
//! payloads are skipped with a warning; a broken broker message never takes
//! the session down.

use crate::batch::Batcher;
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::protocol::destinations::{TOPIC_LIQUIDATION, TOPIC_PRAYER, TOPIC_TICKER, USER_ERRORS};
use crate::protocol::{
    now_millis, LiquidationEvent, PrayerSnapshot, ServerError, Side, TickerUpdate,
};
use crate::state::{LinkState, LiquidationFeed, NoticeBoard, NoticeKind, PrayerBoard, TickerBoard};
use crate::transport::backoff::{BackoffConfig, ExponentialBackoff};
use crate::transport::stomp::{LifecycleHandlers, StompClient, StompSettings};
use crate::transport::Publisher;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Message shown when the server rate-limits this client
const RATE_LIMIT_NOTICE: &str = "Too fast! Please slow down.";

/// A running feed session
pub struct FeedSession {
    client: Arc<StompClient>,
    batcher: Batcher,
    prayer: Arc<Mutex<PrayerBoard>>,
    ticker: Arc<Mutex<TickerBoard>>,
    liquidations: Arc<Mutex<LiquidationFeed>>,
    notices: Arc<Mutex<NoticeBoard>>,
}

impl FeedSession {
    /// Build the session, register all feed subscriptions, and start
    /// connecting.
    pub fn start(config: &ClientConfig) -> ClientResult<Self> {
        let settings = StompSettings::from_config(config)?;
        let backoff = ExponentialBackoff::new(BackoffConfig::from(&config.backoff));

        let handlers = LifecycleHandlers::new()
            .on_connect(|| info!("Feed connected"))
            .on_disconnect(|| info!("Feed disconnected"))
            .on_error(|error| warn!(%error, "Feed connection error"))
            .on_reconnecting(|attempt| info!(attempt, "Feed reconnecting"));

        let client = Arc::new(StompClient::new(settings, backoff, handlers));
        let batcher = Batcher::spawn(
            client.clone() as Arc<dyn Publisher>,
            config.flush_interval(),
        );

        let prayer = Arc::new(Mutex::new(PrayerBoard::new()));
        let ticker = Arc::new(Mutex::new(TickerBoard::new()));
        let liquidations = Arc::new(Mutex::new(LiquidationFeed::new()));
        let notices = Arc::new(Mutex::new(NoticeBoard::new()));

        // Aggregate snapshots supersede all optimistic deltas
        {
            let prayer = prayer.clone();
            let batch_state = batcher.shared_state();
            client.subscribe(TOPIC_PRAYER, move |body| {
                match serde_json::from_slice::<PrayerSnapshot>(body) {
                    Ok(snapshot) => {
                        if let Ok(mut board) = prayer.lock() {
                            board.apply_snapshot(snapshot);
                        }
                        if let Ok(mut state) = batch_state.lock() {
                            state.reconcile_snapshot();
                        }
                    }
                    Err(e) => warn!("Skipping malformed prayer snapshot: {}", e),
                }
            });
        }

        {
            let ticker = ticker.clone();
            client.subscribe(TOPIC_TICKER, move |body| {
                match serde_json::from_slice::<TickerUpdate>(body) {
                    Ok(update) => {
                        if let Ok(mut board) = ticker.lock() {
                            board.apply(update);
                        }
                    }
                    Err(e) => warn!("Skipping malformed ticker update: {}", e),
                }
            });
        }

        {
            let liquidations = liquidations.clone();
            client.subscribe(TOPIC_LIQUIDATION, move |body| {
                match serde_json::from_slice::<LiquidationEvent>(body) {
                    Ok(event) => {
                        debug!(symbol = %event.symbol, usd_value = event.usd_value, "Liquidation");
                        if let Ok(mut feed) = liquidations.lock() {
                            feed.push(event, now_millis());
                        }
                    }
                    Err(e) => warn!("Skipping malformed liquidation event: {}", e),
                }
            });
        }

        // Per-client error queue: a rate-limit rejection rolls the optimistic
        // state back and surfaces a transient notice
        {
            let batch_state = batcher.shared_state();
            let notices = notices.clone();
            client.subscribe(USER_ERRORS, move |body| {
                match serde_json::from_slice::<ServerError>(body) {
                    Ok(error) if error.is_rate_limit() => {
                        warn!("Rate limited by server; rolling back pending actions");
                        if let Ok(mut state) = batch_state.lock() {
                            state.rollback();
                        }
                        if let Ok(mut board) = notices.lock() {
                            board.push(RATE_LIMIT_NOTICE, NoticeKind::Warning, now_millis());
                        }
                    }
                    Ok(error) => warn!(code = %error.code, message = %error.message, "Server error"),
                    Err(e) => warn!("Skipping malformed server error: {}", e),
                }
            });
        }

        client.connect();

        Ok(Self {
            client,
            batcher,
            prayer,
            ticker,
            liquidations,
            notices,
        })
    }

    /// Record one vote action; it is batched and flushed on the next tick
    pub fn pray(&self, side: Side) {
        self.batcher.record(side);
    }

    /// Optimistic tally: last server snapshot plus unacknowledged deltas
    pub fn local_tally(&self) -> PrayerSnapshot {
        let pending = self
            .batcher
            .shared_state()
            .lock()
            .map(|state| state.pending().to_vec())
            .unwrap_or_default();
        self.prayer
            .lock()
            .map(|board| board.local_tally(&pending))
            .unwrap_or_default()
    }

    /// Derived connection state snapshot
    pub fn link_state(&self) -> LinkState {
        self.client.link_state()
    }

    /// Watch channel over the derived connection state
    pub fn watch_link(&self) -> watch::Receiver<LinkState> {
        self.client.state()
    }

    pub fn client(&self) -> &StompClient {
        &self.client
    }

    pub fn ticker(&self) -> Arc<Mutex<TickerBoard>> {
        self.ticker.clone()
    }

    pub fn liquidations(&self) -> Arc<Mutex<LiquidationFeed>> {
        self.liquidations.clone()
    }

    pub fn notices(&self) -> Arc<Mutex<NoticeBoard>> {
        self.notices.clone()
    }

    /// Expire stale notices; driven by the owner's display tick
    pub fn prune_notices(&self) {
        if let Ok(mut board) = self.notices.lock() {
            board.prune(now_millis());
        }
    }

    /// Tear the session down: stop batching, cancel any pending reconnect,
    /// close the transport
    pub fn shutdown(mut self) {
        self.batcher.shutdown();
        self.client.disconnect();
        self.client.shutdown();
    }
}
