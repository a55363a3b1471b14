//! Transport layer: broker connection, backoff policy, publishing seam
//!
//! The `Publisher` trait is the seam between the action batcher and the
//! messaging client, enabling dependency injection and testing without a
//! live broker.

pub mod backoff;
pub mod stomp;

/// Outbound publishing interface consumed by the action batcher.
///
/// `send` carries no delivery guarantee beyond "connected or not": while
/// disconnected the message is silently dropped, and the batcher is the layer
/// responsible for not losing meaningful application data.
pub trait Publisher: Send + Sync {
    /// Whether the underlying transport is currently connected
    fn is_connected(&self) -> bool;

    /// Serialize-and-forget publish to a destination
    fn send(&self, destination: &str, body: Vec<u8>);
}
