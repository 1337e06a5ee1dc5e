//! Traits for the queue system
//!
//! [`QueuePort`] is the contract both backends implement; [`MessageHandler`]
//! is what subscribers supply.

use crate::message::Message;
use crate::queue::QueueResult;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Result of handling one delivered message
///
/// The durable backend maps this onto the broker acknowledgment:
/// `Success` acknowledges, `Retry` negatively acknowledges with requeue,
/// `Reject` negatively acknowledges without requeue. The in-memory backend
/// only logs failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Success,
    Retry(String),
    Reject(String),
}

impl HandlerOutcome {
    pub fn retry(reason: impl Into<String>) -> Self {
        HandlerOutcome::Retry(reason.into())
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        HandlerOutcome::Reject(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, HandlerOutcome::Success)
    }
}

impl<E: std::fmt::Display> From<Result<(), E>> for HandlerOutcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => HandlerOutcome::Success,
            Err(e) => HandlerOutcome::Retry(e.to_string()),
        }
    }
}

/// Consumer-side callback invoked once per delivered message
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> HandlerOutcome;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerOutcome> + Send,
{
    async fn handle(&self, message: Message) -> HandlerOutcome {
        (self)(message).await
    }
}

/// Publish/subscribe contract shared by every queue backend
#[async_trait]
pub trait QueuePort: Send + Sync {
    /// Publish a message to a named queue
    ///
    /// Returns once the backend has accepted the message. The durable backend
    /// fails with a broker error when no live channel can be obtained and
    /// does not retry on its own.
    async fn publish(&self, queue: &str, message: Message) -> QueueResult<()>;

    /// Register a handler for a named queue
    async fn subscribe(&self, queue: &str, handler: Arc<dyn MessageHandler>) -> QueueResult<()>;

    /// Release every resource held by the backend; safe to call repeatedly
    async fn close(&self) -> QueueResult<()>;
}

/// Invoke a handler, turning a panic into a retryable failure
pub(crate) async fn invoke_handler(handler: &dyn MessageHandler, message: Message) -> HandlerOutcome {
    use futures::FutureExt;
    use std::panic::AssertUnwindSafe;

    match AssertUnwindSafe(handler.handle(message)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            HandlerOutcome::Retry(reason)
        }
    }
}
