//! Broker-backed queue port with at-least-once delivery

use crate::broker::backoff::BackoffPolicy;
use crate::broker::supervisor::{
    ConnectionState, ConnectionSupervisor, LiveChannel, StateTransition,
};
use crate::broker::transport::{BrokerConnector, Delivery, DeliveryStream, QueueDeclaration};
use crate::broker::BrokerResult;
use crate::message::{codec, Message};
use crate::queue::{invoke_handler, HandlerOutcome, MessageHandler, QueuePort, QueueResult};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Queue port backed by a message broker
///
/// Every publish and subscribe first obtains a live channel from the
/// [`ConnectionSupervisor`]. Queues are declared durable with a message TTL,
/// messages are published persistent, and each delivery is acknowledged only
/// after its handler succeeded. Consumers survive reconnects: when a
/// consumer's stream breaks it waits for the supervisor to reconnect and
/// registers itself again.
pub struct DurableQueueAdapter {
    supervisor: ConnectionSupervisor,
    declaration: QueueDeclaration,
    consumers: Mutex<Vec<JoinHandle<()>>>,
    next_tag: AtomicU64,
}

impl DurableQueueAdapter {
    pub fn new(connector: Arc<dyn BrokerConnector>, policy: BackoffPolicy) -> Self {
        Self {
            supervisor: ConnectionSupervisor::new(connector, policy),
            declaration: QueueDeclaration::default(),
            consumers: Mutex::new(Vec::new()),
            next_tag: AtomicU64::new(0),
        }
    }

    pub fn with_declaration(mut self, declaration: QueueDeclaration) -> Self {
        self.declaration = declaration;
        self
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    pub fn declaration(&self) -> &QueueDeclaration {
        &self.declaration
    }

    /// Number of consumer tasks still running
    pub fn active_consumers(&self) -> usize {
        self.lock_consumers()
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    fn lock_consumers(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.consumers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for DurableQueueAdapter {
    fn drop(&mut self) {
        for task in self.lock_consumers().drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl QueuePort for DurableQueueAdapter {
    async fn publish(&self, queue: &str, message: Message) -> QueueResult<()> {
        let live = self.supervisor.ensure_connection().await?;
        let payload = codec::encode(&message)?;

        let channel = live.channel();
        let sent = async {
            channel.declare_queue(queue, &self.declaration).await?;
            channel
                .publish(queue, &payload, self.declaration.persistent)
                .await
        }
        .await;

        if let Err(e) = sent {
            log::warn!("Failed to publish message {} to '{}': {}", message.id, queue, e);
            self.supervisor
                .report_failure(live.generation(), &e.to_string());
            return Err(e.into());
        }

        log::debug!("Message {} published to queue '{}'", message.id, queue);
        Ok(())
    }

    async fn subscribe(&self, queue: &str, handler: Arc<dyn MessageHandler>) -> QueueResult<()> {
        let tag = format!(
            "courier-{}-{}",
            queue,
            self.next_tag.fetch_add(1, Ordering::Relaxed)
        );
        let consumer = Consumer {
            supervisor: self.supervisor.clone(),
            declaration: self.declaration,
            queue: queue.to_string(),
            tag,
            handler,
        };

        let (live, stream) = consumer.open().await?;
        log::info!("Consumer '{}' started for queue '{}'", consumer.tag, queue);

        let task = tokio::spawn(consumer.run(live, stream));
        let mut consumers = self.lock_consumers();
        consumers.retain(|task| !task.is_finished());
        consumers.push(task);
        Ok(())
    }

    async fn close(&self) -> QueueResult<()> {
        self.supervisor.close().await;
        let consumers: Vec<_> = self.lock_consumers().drain(..).collect();
        for task in consumers {
            task.abort();
        }
        Ok(())
    }
}

/// One subscription: its queue, handler and broker consumer tag
struct Consumer {
    supervisor: ConnectionSupervisor,
    declaration: QueueDeclaration,
    queue: String,
    tag: String,
    handler: Arc<dyn MessageHandler>,
}

impl Consumer {
    /// Declare the queue and register with the broker on a live channel
    async fn open(&self) -> BrokerResult<(LiveChannel, DeliveryStream)> {
        let live = self.supervisor.ensure_connection().await?;
        let channel = live.channel();
        let registered = async {
            channel.declare_queue(&self.queue, &self.declaration).await?;
            channel.consume(&self.queue, &self.tag).await
        }
        .await;

        match registered {
            Ok(stream) => Ok((live, stream)),
            Err(e) => {
                self.supervisor
                    .report_failure(live.generation(), &e.to_string());
                Err(e)
            }
        }
    }

    async fn run(self, mut live: LiveChannel, mut stream: DeliveryStream) {
        loop {
            let reason = self.drain(&mut stream).await;
            drop(stream);

            let mut transitions = self.supervisor.subscribe_transitions();
            self.supervisor.report_failure(live.generation(), &reason);

            loop {
                if !self.wait_for_reconnect(&mut transitions).await {
                    log::info!("Consumer '{}' on '{}' stopped", self.tag, self.queue);
                    return;
                }
                match self.open().await {
                    Ok((next_live, next_stream)) => {
                        log::info!(
                            "Consumer '{}' resubscribed to queue '{}'",
                            self.tag,
                            self.queue
                        );
                        live = next_live;
                        stream = next_stream;
                        break;
                    }
                    Err(e) => {
                        log::warn!("Consumer '{}' could not resubscribe: {}", self.tag, e);
                    }
                }
            }
        }
    }

    /// Process deliveries until the stream breaks; returns why it stopped
    async fn drain(&self, stream: &mut DeliveryStream) -> String {
        while let Some(next) = stream.next().await {
            let delivery = match next {
                Ok(delivery) => delivery,
                Err(e) => return e.to_string(),
            };
            if let Err(e) = self.dispatch(delivery.as_ref()).await {
                return e.to_string();
            }
        }
        format!("consumer '{}' stream ended", self.tag)
    }

    async fn dispatch(&self, delivery: &dyn Delivery) -> BrokerResult<()> {
        let message = match codec::decode(delivery.payload()) {
            Ok(message) => message,
            Err(e) => {
                log::error!("Requeueing undecodable delivery on '{}': {}", self.queue, e);
                return delivery.nack(true).await;
            }
        };

        let id = message.id.clone();
        match invoke_handler(self.handler.as_ref(), message).await {
            HandlerOutcome::Success => {
                log::trace!("Acknowledging message {} on '{}'", id, self.queue);
                delivery.ack().await
            }
            HandlerOutcome::Retry(reason) => {
                log::warn!("Message {} on '{}' requeued: {}", id, self.queue, reason);
                delivery.nack(true).await
            }
            HandlerOutcome::Reject(reason) => {
                log::warn!("Message {} on '{}' rejected: {}", id, self.queue, reason);
                delivery.nack(false).await
            }
        }
    }

    /// Wait until the supervisor is connected again
    ///
    /// Returns `false` once it was closed or gave up.
    async fn wait_for_reconnect(
        &self,
        transitions: &mut broadcast::Receiver<StateTransition>,
    ) -> bool {
        loop {
            match self.supervisor.state() {
                ConnectionState::Connected => return true,
                ConnectionState::Terminated | ConnectionState::Disconnected => return false,
                ConnectionState::Connecting | ConnectionState::Reconnecting => {}
            }
            match transitions.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    }
}
