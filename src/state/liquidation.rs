//! Liquidation feed board
//!
//! Newest-first list capped in memory, with tracking for the last large
//! event and an activity-scaled fade-out duration for display. Time enters
//! through explicit `now_ms` arguments.

use crate::protocol::LiquidationEvent;
use std::collections::VecDeque;
use std::time::Duration;
use uuid::Uuid;

/// Maximum number of events kept in memory
const MAX_EVENTS: usize = 100;
/// How long the large-event effect stays active
const LARGE_EFFECT_MS: i64 = 2000;
/// Window for the activity measure behind fade-out scaling
const ACTIVITY_WINDOW_MS: i64 = 10_000;

/// One received liquidation with a client-assigned id
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub id: Uuid,
    pub event: LiquidationEvent,
}

/// Capped newest-first liquidation list
#[derive(Debug, Default)]
pub struct LiquidationFeed {
    entries: VecDeque<FeedEntry>,
    last_large: Option<FeedEntry>,
    last_large_at_ms: Option<i64>,
}

impl LiquidationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event, assigning it a client id. Returns the stored entry.
    pub fn push(&mut self, event: LiquidationEvent, now_ms: i64) -> &FeedEntry {
        let entry = FeedEntry {
            id: Uuid::new_v4(),
            event,
        };

        if entry.event.is_large {
            self.last_large = Some(entry.clone());
            self.last_large_at_ms = Some(now_ms);
        }

        self.entries.push_front(entry);
        self.entries.truncate(MAX_EVENTS);
        &self.entries[0]
    }

    /// Newest first
    pub fn entries(&self) -> impl Iterator<Item = &FeedEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_large(&self) -> Option<&FeedEntry> {
        self.last_large.as_ref()
    }

    /// Whether the large-event effect should still be showing
    pub fn large_effect_active(&self, now_ms: i64) -> bool {
        self.last_large_at_ms
            .is_some_and(|at| now_ms - at < LARGE_EFFECT_MS)
    }

    /// Display fade-out scaled by recent activity: the busier the feed, the
    /// faster entries fade
    pub fn fade_out_duration(&self, now_ms: i64) -> Duration {
        let recent = self
            .entries
            .iter()
            .filter(|e| now_ms - e.event.timestamp < ACTIVITY_WINDOW_MS)
            .count();

        let millis = match recent {
            n if n > 20 => 3000,
            n if n > 10 => 5000,
            n if n > 5 => 7000,
            _ => 10_000,
        };
        Duration::from_millis(millis)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_large = None;
        self.last_large_at_ms = None;
    }
}
