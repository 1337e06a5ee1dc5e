//! Broker Error Types
//!
//! `Clone` so the outcome of one connection attempt can be handed to every
//! caller that was waiting on it.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Transient: a connect attempt failed or an established connection dropped
    #[error("Broker connection failed: {reason}")]
    Connection { reason: String },

    /// Per call: no live channel could be obtained or a channel operation failed
    #[error("Channel unavailable: {reason}")]
    ChannelUnavailable { reason: String },

    /// Fatal: the reconnect budget is spent
    #[error("Max reconnection attempts reached ({max_retries}); delivery can no longer be guaranteed")]
    RetryExhausted { max_retries: u32 },

    #[error("Broker connection has been closed")]
    Closed,
}

impl BrokerError {
    pub fn connection(reason: impl std::fmt::Display) -> Self {
        BrokerError::Connection {
            reason: reason.to_string(),
        }
    }

    pub fn channel(reason: impl std::fmt::Display) -> Self {
        BrokerError::ChannelUnavailable {
            reason: reason.to_string(),
        }
    }
}

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

impl crate::core::error_handling::ContextualError for BrokerError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, BrokerError::RetryExhausted { .. })
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            BrokerError::RetryExhausted { .. } => {
                Some("Message broker unreachable after repeated reconnect attempts")
            }
            _ => None,
        }
    }
}
