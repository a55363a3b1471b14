//! Wire protocol support: STOMP framing and feed payload types
//!
//! The broker speaks STOMP 1.2 over WebSocket. `frame` handles the framing
//! layer; `messages` defines the JSON payloads carried in frame bodies;
//! `destinations` names the channels this client uses.

pub mod destinations;
pub mod frame;
pub mod messages;

pub use frame::{Frame, FrameCommand, FrameError, ServerInput};
pub use messages::{
    now_millis, LiquidationEvent, LiquidationSide, PrayerRequest, PrayerSnapshot, ServerError,
    Side, TickerUpdate, RATE_LIMIT_EXCEEDED,
};
