//! In-process queue backend
//!
//! Every queue is an append-only log plus the list of handlers registered for
//! it. Publishing appends and then awaits each handler in registration order,
//! so a slow handler holds up the publisher; that coupling is the backend's
//! only form of backpressure. Nothing survives a restart.

use crate::message::Message;
use crate::queue::traits::{invoke_handler, HandlerOutcome, MessageHandler, QueuePort};
use crate::queue::QueueResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct QueueLog {
    messages: Vec<Message>,
    handlers: Vec<Arc<dyn MessageHandler>>,
}

/// Single-process implementation of [`QueuePort`]
///
/// # Example
///
/// ```rust,no_run
/// use courier::queue::{HandlerOutcome, InMemoryQueueAdapter, QueuePort};
/// use courier::message::Message;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = InMemoryQueueAdapter::new();
/// queue.publish("orders", Message::new("A", "shop", "warehouse")).await?;
///
/// // The new handler first receives "A" from the backlog
/// queue
///     .subscribe(
///         "orders",
///         Arc::new(|message: Message| async move {
///             println!("{}", message.content);
///             HandlerOutcome::Success
///         }),
///     )
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct InMemoryQueueAdapter {
    queues: Mutex<HashMap<String, QueueLog>>,
}

impl InMemoryQueueAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_queues(&self) -> MutexGuard<'_, HashMap<String, QueueLog>> {
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of messages logged for a queue
    pub fn message_count(&self, queue: &str) -> usize {
        self.lock_queues()
            .get(queue)
            .map_or(0, |log| log.messages.len())
    }

    /// Number of handlers registered for a queue
    pub fn subscriber_count(&self, queue: &str) -> usize {
        self.lock_queues()
            .get(queue)
            .map_or(0, |log| log.handlers.len())
    }

    /// Copy of the messages logged for a queue, in publish order
    pub fn messages(&self, queue: &str) -> Vec<Message> {
        self.lock_queues()
            .get(queue)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }

    async fn deliver(queue: &str, handler: &dyn MessageHandler, message: Message, replay: bool) {
        let message_id = message.id.clone();
        let phase = if replay { "backlog" } else { "live" };
        match invoke_handler(handler, message).await {
            HandlerOutcome::Success => {
                log::debug!(
                    "Message {} processed ({} delivery, queue '{}')",
                    message_id,
                    phase,
                    queue
                );
            }
            HandlerOutcome::Retry(reason) | HandlerOutcome::Reject(reason) => {
                log::error!(
                    "Handler failed for message {} ({} delivery, queue '{}'): {}",
                    message_id,
                    phase,
                    queue,
                    reason
                );
            }
        }
    }
}

#[async_trait]
impl QueuePort for InMemoryQueueAdapter {
    async fn publish(&self, queue: &str, message: Message) -> QueueResult<()> {
        let handlers = {
            let mut queues = self.lock_queues();
            let log = queues.entry(queue.to_string()).or_default();
            log.messages.push(message.clone());
            log.handlers.clone()
        };

        log::info!(
            "Published message {} to queue '{}', notifying {} consumers",
            message.id,
            queue,
            handlers.len()
        );

        for handler in &handlers {
            Self::deliver(queue, handler.as_ref(), message.clone(), false).await;
        }

        Ok(())
    }

    async fn subscribe(&self, queue: &str, handler: Arc<dyn MessageHandler>) -> QueueResult<()> {
        log::info!("Registering new consumer for queue '{}'", queue);

        // Replay in chunks without holding the lock across handler calls. The
        // handler is registered under the same lock that publish appends with,
        // and only once it has seen the whole log, so a concurrent publish is
        // either replayed here or delivered live, never both.
        let mut replayed = 0;
        loop {
            let pending = {
                let mut queues = self.lock_queues();
                let log = queues.entry(queue.to_string()).or_default();
                if replayed >= log.messages.len() {
                    log.handlers.push(Arc::clone(&handler));
                    break;
                }
                log.messages[replayed..].to_vec()
            };

            log::debug!(
                "Replaying {} existing messages from queue '{}'",
                pending.len(),
                queue
            );
            replayed += pending.len();
            for message in pending {
                Self::deliver(queue, handler.as_ref(), message, true).await;
            }
        }

        Ok(())
    }

    async fn close(&self) -> QueueResult<()> {
        log::info!("Closing in-memory queue backend");
        self.lock_queues().clear();
        Ok(())
    }
}
