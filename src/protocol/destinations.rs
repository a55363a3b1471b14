//! Destination names used by the feed broker

/// Outgoing prayer votes (client -> server)
pub const APP_PRAYER: &str = "/app/prayer";

/// Aggregate prayer count snapshots (server -> all clients)
pub const TOPIC_PRAYER: &str = "/topic/prayer";

/// Price ticker snapshots
pub const TOPIC_TICKER: &str = "/topic/ticker";

/// Liquidation events
pub const TOPIC_LIQUIDATION: &str = "/topic/liquidation";

/// Per-client error frames (rate limiting, validation)
pub const USER_ERRORS: &str = "/user/queue/errors";
