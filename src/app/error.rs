//! Application Error Types

use crate::app::cli::ConfigError;
use crate::broker::BrokerError;
use crate::core::error_handling::ContextualError;
use crate::queue::QueueError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] flexi_logger::FlexiLoggerError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The supervisor gave up reconnecting while a command was running
    #[error("Message broker connection terminated")]
    BrokerTerminated,
}

pub type AppResult<T> = Result<T, AppError>;

impl ContextualError for AppError {
    fn is_user_actionable(&self) -> bool {
        match self {
            AppError::Config(err) => err.is_user_actionable(),
            AppError::Logging(_) => false,
            AppError::Queue(err) => err.is_user_actionable(),
            AppError::Broker(err) => err.is_user_actionable(),
            AppError::BrokerTerminated => true,
        }
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            AppError::Config(err) => err.user_message(),
            AppError::Logging(_) => None,
            AppError::Queue(err) => err.user_message(),
            AppError::Broker(err) => err.user_message(),
            AppError::BrokerTerminated => {
                Some("Message broker unreachable after repeated reconnect attempts")
            }
        }
    }
}
