//! Transient user notices
//!
//! Each notice carries an explicit deadline computed when it is pushed; the
//! owner drives expiry by calling `prune` with the current time. No detached
//! timers, so teardown can never leak one.

use uuid::Uuid;

/// Default notice lifetime in milliseconds
const DEFAULT_DURATION_MS: i64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub id: Uuid,
    pub message: String,
    pub kind: NoticeKind,
    pub expires_at_ms: i64,
}

/// Bounded list of live notices
#[derive(Debug, Default)]
pub struct NoticeBoard {
    notices: Vec<Notice>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a notice with the default lifetime
    pub fn push(&mut self, message: &str, kind: NoticeKind, now_ms: i64) -> Uuid {
        self.push_with_duration(message, kind, now_ms, DEFAULT_DURATION_MS)
    }

    pub fn push_with_duration(
        &mut self,
        message: &str,
        kind: NoticeKind,
        now_ms: i64,
        duration_ms: i64,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.notices.push(Notice {
            id,
            message: message.to_string(),
            kind,
            expires_at_ms: now_ms + duration_ms,
        });
        id
    }

    /// Drop notices whose deadline has passed
    pub fn prune(&mut self, now_ms: i64) {
        self.notices.retain(|n| n.expires_at_ms > now_ms);
    }

    /// Dismiss one notice early
    pub fn dismiss(&mut self, id: Uuid) {
        self.notices.retain(|n| n.id != id);
    }

    pub fn active(&self) -> &[Notice] {
        &self.notices
    }
}
