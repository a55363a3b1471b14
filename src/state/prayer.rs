//! Prayer tally board
//!
//! Holds the last authoritative server snapshot and derives the optimistic
//! local view by folding in pending deltas that have not been acknowledged.

use crate::batch::PendingAction;
use crate::protocol::{PrayerSnapshot, Side};

/// Server-synced tally plus local-view derivation
#[derive(Debug, Default)]
pub struct PrayerBoard {
    snapshot: PrayerSnapshot,
}

impl PrayerBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tally with an authoritative server snapshot
    pub fn apply_snapshot(&mut self, snapshot: PrayerSnapshot) {
        self.snapshot = snapshot;
    }

    /// Last server snapshot, untouched by pending deltas
    pub fn snapshot(&self) -> &PrayerSnapshot {
        &self.snapshot
    }

    /// Optimistic view: server counts plus pending deltas, ratios recomputed.
    /// Rpm values stay server-reported; they have no local estimate.
    pub fn local_tally(&self, pending: &[PendingAction]) -> PrayerSnapshot {
        let pending_up: u64 = pending
            .iter()
            .filter(|p| p.side == Side::Up)
            .map(|p| p.count as u64)
            .sum();
        let pending_down: u64 = pending
            .iter()
            .filter(|p| p.side == Side::Down)
            .map(|p| p.count as u64)
            .sum();

        let up_count = self.snapshot.up_count + pending_up;
        let down_count = self.snapshot.down_count + pending_down;
        let total = up_count + down_count;
        let up_ratio = if total == 0 {
            0.5
        } else {
            up_count as f64 / total as f64
        };

        PrayerSnapshot {
            up_count,
            down_count,
            up_ratio,
            down_ratio: 1.0 - up_ratio,
            ..self.snapshot.clone()
        }
    }
}
