//! Logging message consumer used by the `consume` and `demo` commands

use crate::message::{Message, MessageStatus};
use crate::queue::{HandlerOutcome, MessageHandler, QueuePort, QueueResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Subscribes to a queue and marks every received message delivered
pub struct MessageConsumer {
    queue: Arc<dyn QueuePort>,
    queue_name: String,
    handler: Arc<DeliveryLogger>,
}

impl MessageConsumer {
    pub fn new(queue: Arc<dyn QueuePort>, queue_name: impl Into<String>) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            handler: Arc::new(DeliveryLogger::default()),
        }
    }

    pub async fn start(&self) -> QueueResult<()> {
        self.queue
            .subscribe(&self.queue_name, self.handler.clone())
            .await?;
        log::info!("Message consumer started on queue '{}'", self.queue_name);
        Ok(())
    }

    /// Messages handled successfully so far
    pub fn delivered(&self) -> usize {
        self.handler.delivered.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct DeliveryLogger {
    delivered: AtomicUsize,
}

#[async_trait]
impl MessageHandler for DeliveryLogger {
    async fn handle(&self, mut message: Message) -> HandlerOutcome {
        match message.status {
            // Redelivery of a message already handled
            MessageStatus::Delivered => {
                log::debug!("Message {} already delivered", message.id);
                return HandlerOutcome::Success;
            }
            MessageStatus::Failed => {
                return HandlerOutcome::reject(format!("message {} is marked failed", message.id));
            }
            MessageStatus::Pending | MessageStatus::Sent => {}
        }

        if let Err(e) = message.transition_to(MessageStatus::Delivered) {
            log::error!("Error processing message {}: {}", message.id, e);
            return HandlerOutcome::retry(e.to_string());
        }

        self.delivered.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "Message {} delivered: {} -> {}: {}",
            message.id,
            message.sender,
            message.recipient,
            message.content
        );
        HandlerOutcome::Success
    }
}
