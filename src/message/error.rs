//! Message Error Types

use crate::message::MessageStatus;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: MessageStatus,
        to: MessageStatus,
    },
}

/// Result type for message operations
pub type MessageResult<T> = Result<T, MessageError>;

impl crate::core::error_handling::ContextualError for MessageError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}
