//! Pure connection settings and heartbeat negotiation for the STOMP client
//!
//! Everything here is testable without a socket.

use crate::config::ClientConfig;
use crate::error::ClientError;
use std::time::Duration;
use url::Url;

/// Validated connection settings for one client instance
#[derive(Debug, Clone)]
pub struct StompSettings {
    /// WebSocket endpoint (ws:// or wss://)
    pub broker_url: String,
    /// Virtual host sent in the CONNECT frame
    pub host: String,
    /// Desired heartbeat interval, advertised in both directions
    pub heartbeat: Duration,
    /// Per-attempt connect timeout (transport + handshake)
    pub connect_timeout: Duration,
}

impl StompSettings {
    pub fn new(
        broker_url: String,
        heartbeat: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let parsed = Url::parse(&broker_url)
            .map_err(|_| ClientError::InvalidBrokerUrl(broker_url.clone()))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(ClientError::InvalidBrokerUrl(broker_url));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| ClientError::InvalidBrokerUrl(broker_url.clone()))?
            .to_string();

        Ok(Self {
            broker_url,
            host,
            heartbeat,
            connect_timeout,
        })
    }

    /// Build settings from the loaded configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let url = config.resolve_broker_url()?;
        Self::new(url, config.heartbeat_interval(), config.connect_timeout())
    }
}

/// Negotiated heartbeat intervals `(outgoing, incoming)` in milliseconds.
///
/// Each direction is the max of what one peer can do and what the other
/// wants; a zero on either side disables that direction. A missing or
/// malformed server header disables heartbeats entirely (1.0/1.1 brokers).
pub fn negotiate_heartbeat(ours_ms: u64, server_header: Option<&str>) -> (u64, u64) {
    let (server_send, server_want) = match server_header.and_then(parse_heartbeat_header) {
        Some(pair) => pair,
        None => return (0, 0),
    };

    let outgoing = if ours_ms == 0 || server_want == 0 {
        0
    } else {
        ours_ms.max(server_want)
    };
    let incoming = if ours_ms == 0 || server_send == 0 {
        0
    } else {
        ours_ms.max(server_send)
    };

    (outgoing, incoming)
}

fn parse_heartbeat_header(header: &str) -> Option<(u64, u64)> {
    let (sx, sy) = header.split_once(',')?;
    Some((sx.trim().parse().ok()?, sy.trim().parse().ok()?))
}
