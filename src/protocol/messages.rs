//! Feed payload types carried in STOMP frame bodies
//!
//! Field names follow the broker's JSON (camelCase). Snapshot ratios default
//! to an even split when no votes exist, matching the server's own math.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Error code sent on the user error queue when the per-session token bucket
/// is exhausted
pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";

/// Vote direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Up,
    Down,
}

impl Side {
    /// Both sides, in a fixed order (used when draining batches)
    pub const ALL: [Side; 2] = [Side::Up, Side::Down];
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Up => write!(f, "up"),
            Side::Down => write!(f, "down"),
        }
    }
}

/// Outgoing vote message, one per side per batch flush
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrayerRequest {
    pub side: Side,
    pub count: u32,
}

/// Authoritative aggregate published on `/topic/prayer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrayerSnapshot {
    pub up_count: u64,
    pub down_count: u64,
    pub up_rpm: f64,
    pub down_rpm: f64,
    pub up_ratio: f64,
    pub down_ratio: f64,
    pub timestamp: i64,
}

impl PrayerSnapshot {
    /// Build a snapshot from raw counts, recomputing ratios the way the
    /// server does (0.5/0.5 when there are no votes at all)
    pub fn from_counts(up_count: u64, down_count: u64, up_rpm: f64, down_rpm: f64) -> Self {
        let total = up_count + down_count;
        let up_ratio = if total == 0 {
            0.5
        } else {
            up_count as f64 / total as f64
        };

        Self {
            up_count,
            down_count,
            up_rpm,
            down_rpm,
            up_ratio,
            down_ratio: 1.0 - up_ratio,
            timestamp: now_millis(),
        }
    }
}

impl Default for PrayerSnapshot {
    fn default() -> Self {
        Self::from_counts(0, 0, 0.0, 0.0)
    }
}

/// Price snapshot published on `/topic/ticker`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerUpdate {
    pub symbol: String,
    pub price: f64,
    pub price_change_24h: f64,
    pub timestamp: i64,
}

/// Position side of a liquidated order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LiquidationSide {
    Long,
    Short,
}

/// Liquidation event published on `/topic/liquidation`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationEvent {
    pub symbol: String,
    pub side: LiquidationSide,
    pub quantity: f64,
    pub price: f64,
    pub usd_value: f64,
    pub is_large: bool,
    pub timestamp: i64,
}

/// Per-client error frame from `/user/queue/errors`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    pub code: String,
    pub message: String,
}

impl ServerError {
    pub fn is_rate_limit(&self) -> bool {
        self.code == RATE_LIMIT_EXCEEDED
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_serialization() {
        assert_eq!(serde_json::to_string(&Side::Up).unwrap(), "\"up\"");
        assert_eq!(serde_json::to_string(&Side::Down).unwrap(), "\"down\"");
        assert_eq!(serde_json::from_str::<Side>("\"up\"").unwrap(), Side::Up);
    }

    #[test]
    fn test_prayer_request_wire_format() {
        let request = PrayerRequest {
            side: Side::Up,
            count: 5,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"side":"up","count":5}"#);
    }

    #[test]
    fn test_snapshot_camel_case_fields() {
        let json = r#"{
            "type": "PRAYER",
            "upCount": 10,
            "downCount": 30,
            "upRpm": 1.5,
            "downRpm": 4.5,
            "upRatio": 0.25,
            "downRatio": 0.75,
            "timestamp": 1700000000000
        }"#;
        let snapshot: PrayerSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.up_count, 10);
        assert_eq!(snapshot.down_count, 30);
        assert_eq!(snapshot.up_ratio, 0.25);
    }

    #[test]
    fn test_snapshot_from_counts_ratios() {
        let snapshot = PrayerSnapshot::from_counts(30, 10, 0.0, 0.0);
        assert_eq!(snapshot.up_ratio, 0.75);
        assert_eq!(snapshot.down_ratio, 0.25);

        let empty = PrayerSnapshot::from_counts(0, 0, 0.0, 0.0);
        assert_eq!(empty.up_ratio, 0.5);
        assert_eq!(empty.down_ratio, 0.5);
    }

    #[test]
    fn test_liquidation_wire_format() {
        let json = r#"{
            "type": "LIQUIDATION",
            "symbol": "BTCUSDT",
            "side": "SHORT",
            "quantity": 2.5,
            "price": 64000.0,
            "usdValue": 160000.0,
            "isLarge": true,
            "timestamp": 1700000000000
        }"#;
        let event: LiquidationEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.side, LiquidationSide::Short);
        assert!(event.is_large);
        assert_eq!(event.usd_value, 160000.0);
    }

    #[test]
    fn test_ticker_wire_format() {
        let json = r#"{"symbol":"BTCUSDT","price":64250.5,"priceChange24h":-2.13,"timestamp":1700000000000}"#;
        let ticker: TickerUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(ticker.price_change_24h, -2.13);
    }

    #[test]
    fn test_server_error_rate_limit_detection() {
        let error = ServerError {
            code: RATE_LIMIT_EXCEEDED.to_string(),
            message: "Too many requests. Please slow down.".to_string(),
        };
        assert!(error.is_rate_limit());

        let other = ServerError {
            code: "VALIDATION_FAILED".to_string(),
            message: "bad side".to_string(),
        };
        assert!(!other.is_rate_limit());
    }
}
