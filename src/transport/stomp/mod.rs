//! STOMP-over-WebSocket messaging client
//!
//! `connection` and `registry` hold the pure state management; `client`
//! owns the socket and all impure I/O.

pub mod client;
pub mod connection;
pub mod registry;

pub use client::{LifecycleHandlers, StompClient, Subscription};
pub use connection::{negotiate_heartbeat, StompSettings};
