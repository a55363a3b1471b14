//! prayerlink - resilient feed client
//!
//! A STOMP-over-WebSocket client for the crypto-prayer realtime feed: a live
//! voting counter, price ticker, and liquidation stream served by a
//! message broker.
//!
//! # Overview
//!
//! This crate provides:
//! - A messaging client with automatic reconnection (exponential backoff with
//!   jitter, subscription replay, heartbeat liveness)
//! - Action batching that coalesces rapid votes into periodic sends while
//!   keeping an optimistic local tally until the server confirms
//! - Pure state boards for the tally, ticker, liquidation feed, and
//!   connection status projection
//!
//! # Quick Start
//!
//! ```no_run
//! use prayerlink::config::ClientConfig;
//! use prayerlink::protocol::Side;
//! use prayerlink::session::FeedSession;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default();
//! let session = FeedSession::start(&config)?;
//!
//! session.pray(Side::Up);
//! println!("local tally: {:?}", session.local_tally());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

pub use batch::{BatchState, Batcher, PendingAction};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use protocol::{
    LiquidationEvent, LiquidationSide, PrayerRequest, PrayerSnapshot, ServerError, Side,
    TickerUpdate,
};
pub use session::FeedSession;
pub use state::{ConnectionStatus, LinkEvent, LinkState};
pub use transport::backoff::{BackoffConfig, ExponentialBackoff};
pub use transport::stomp::{LifecycleHandlers, StompClient, StompSettings, Subscription};
pub use transport::Publisher;
