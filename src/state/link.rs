//! Connection state projection
//!
//! Pure derivation from messaging-client lifecycle events to the user-facing
//! connection record. Holds nothing beyond the effect of the last event.

/// User-facing connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Lifecycle events emitted by the messaging client
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connecting,
    Connected,
    Disconnected,
    Error(String),
    Reconnecting(u32),
}

/// Derived connection record driving the status indicator
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkState {
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub reconnect_attempt: u32,
}

impl LinkState {
    /// Fold one lifecycle event into the record
    pub fn apply(&self, event: &LinkEvent) -> LinkState {
        let mut next = self.clone();
        match event {
            LinkEvent::Connecting => {
                next.status = ConnectionStatus::Connecting;
            }
            LinkEvent::Connected => {
                next.status = ConnectionStatus::Connected;
                next.last_error = None;
                next.reconnect_attempt = 0;
            }
            LinkEvent::Disconnected => {
                next.status = ConnectionStatus::Disconnected;
            }
            LinkEvent::Error(message) => {
                next.last_error = Some(message.clone());
            }
            LinkEvent::Reconnecting(attempt) => {
                next.status = ConnectionStatus::Reconnecting;
                next.reconnect_attempt = *attempt;
            }
        }
        next
    }

    /// Whether the link can carry outgoing sends
    pub fn is_usable(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = LinkState::default();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert_eq!(state.last_error, None);
        assert_eq!(state.reconnect_attempt, 0);
        assert!(!state.is_usable());
    }

    #[test]
    fn test_connected_clears_error_and_attempt() {
        let state = LinkState {
            status: ConnectionStatus::Reconnecting,
            last_error: Some("socket closed".to_string()),
            reconnect_attempt: 4,
        };

        let next = state.apply(&LinkEvent::Connected);
        assert_eq!(next.status, ConnectionStatus::Connected);
        assert_eq!(next.last_error, None);
        assert_eq!(next.reconnect_attempt, 0);
        assert!(next.is_usable());
    }

    #[test]
    fn test_error_preserves_status() {
        let state = LinkState::default().apply(&LinkEvent::Connecting);
        let next = state.apply(&LinkEvent::Error("refused".to_string()));

        assert_eq!(next.status, ConnectionStatus::Connecting);
        assert_eq!(next.last_error.as_deref(), Some("refused"));
    }

    #[test]
    fn test_reconnecting_carries_attempt() {
        let next = LinkState::default().apply(&LinkEvent::Reconnecting(3));
        assert_eq!(next.status, ConnectionStatus::Reconnecting);
        assert_eq!(next.reconnect_attempt, 3);
        assert!(!next.is_usable());
    }

    #[test]
    fn test_lifecycle_sequence() {
        let mut state = LinkState::default();
        for (event, expected) in [
            (LinkEvent::Connecting, ConnectionStatus::Connecting),
            (LinkEvent::Connected, ConnectionStatus::Connected),
            (LinkEvent::Disconnected, ConnectionStatus::Disconnected),
            (LinkEvent::Reconnecting(1), ConnectionStatus::Reconnecting),
            (LinkEvent::Connecting, ConnectionStatus::Connecting),
            (LinkEvent::Connected, ConnectionStatus::Connected),
        ] {
            state = state.apply(&event);
            assert_eq!(state.status, expected);
        }
        assert_eq!(state.reconnect_attempt, 0);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectionStatus::Reconnecting.to_string(), "reconnecting");
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
    }
}
