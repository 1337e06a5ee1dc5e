//! Queue Error Types

use crate::broker::BrokerError;
use crate::core::error_handling::ContextualError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Serialization failed: {message}")]
    Serialization { message: String },
}

impl QueueError {
    /// Only retry exhaustion is fatal; the enclosing process should stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, QueueError::Broker(BrokerError::RetryExhausted { .. }))
    }
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

impl ContextualError for QueueError {
    fn is_user_actionable(&self) -> bool {
        match self {
            QueueError::Broker(err) => err.is_user_actionable(),
            QueueError::Serialization { .. } => false,
        }
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            QueueError::Broker(err) => err.user_message(),
            QueueError::Serialization { .. } => None,
        }
    }
}
