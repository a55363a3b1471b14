//! Error types for the prayerlink client
//!
//! Connection-layer failures never surface synchronously to callers; they are
//! reported through the lifecycle callbacks and the client keeps retrying.
//! The variants here cover everything that *can* be returned from an API call.

use thiserror::Error;

/// Main error type for prayerlink operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Broker protocol error: {message}")]
    Protocol { message: String },

    #[error("Rate limited by server: {message}")]
    RateLimited { message: String },

    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    #[error("Client is shut down")]
    Closed,

    #[error("Serialization error")]
    Serialization(#[source] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl ClientError {
    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a broker protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a rate-limit rejection error
    pub fn rate_limited<S: Into<String>>(message: S) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_constructor() {
        let error = ClientError::transport("connection refused");
        assert!(matches!(error, ClientError::Transport { .. }));
        assert_eq!(error.to_string(), "Transport error: connection refused");
    }

    #[test]
    fn test_protocol_error_constructor() {
        let error = ClientError::protocol("malformed frame");
        assert!(matches!(error, ClientError::Protocol { .. }));
        assert_eq!(error.to_string(), "Broker protocol error: malformed frame");
    }

    #[test]
    fn test_rate_limited_constructor() {
        let error = ClientError::rate_limited("slow down");
        assert!(matches!(error, ClientError::RateLimited { .. }));
        assert_eq!(error.to_string(), "Rate limited by server: slow down");
    }

    #[test]
    fn test_error_display_non_empty() {
        let errors = vec![
            ClientError::transport("x"),
            ClientError::protocol("x"),
            ClientError::rate_limited("x"),
            ClientError::InvalidBrokerUrl("ftp://nope".to_string()),
            ClientError::Closed,
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
