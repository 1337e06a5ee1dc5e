//! Broker transport seam
//!
//! The supervisor and the durable adapter only see these traits. The AMQP
//! implementation lives in [`crate::broker::amqp`]; tests drive the same code
//! through a scripted in-memory broker.

use crate::broker::BrokerResult;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Message time-to-live applied to every declared queue (24 hours)
pub const DEFAULT_MESSAGE_TTL: Duration = Duration::from_millis(86_400_000);

/// Parameters used when declaring a queue and publishing to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDeclaration {
    pub durable: bool,
    pub message_ttl: Duration,
    /// Publish with the persistent delivery mode
    pub persistent: bool,
}

impl Default for QueueDeclaration {
    fn default() -> Self {
        Self {
            durable: true,
            message_ttl: DEFAULT_MESSAGE_TTL,
            persistent: true,
        }
    }
}

impl QueueDeclaration {
    pub fn message_ttl_ms(&self) -> u64 {
        u64::try_from(self.message_ttl.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Callback handed to each connection so transport events reach the supervisor
///
/// Error and close events raised by the client library call [`notify`];
/// signals coming from a connection that has already been replaced are
/// ignored by the supervisor.
///
/// [`notify`]: FailureSignal::notify
#[derive(Clone)]
pub struct FailureSignal {
    notify: Arc<dyn Fn(String) + Send + Sync>,
}

impl FailureSignal {
    pub fn new(notify: impl Fn(String) + Send + Sync + 'static) -> Self {
        Self {
            notify: Arc::new(notify),
        }
    }

    /// Signal that goes nowhere, for short-lived probe connections
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn notify(&self, reason: impl Into<String>) {
        (self.notify)(reason.into())
    }
}

impl fmt::Debug for FailureSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FailureSignal")
    }
}

/// One message handed to a consumer, awaiting acknowledgment
#[async_trait]
pub trait Delivery: Send + Sync {
    fn payload(&self) -> &[u8];

    /// Remove the message from the broker
    async fn ack(&self) -> BrokerResult<()>;

    /// Refuse the message; with `requeue` it becomes available for redelivery
    async fn nack(&self, requeue: bool) -> BrokerResult<()>;
}

pub type DeliveryStream = BoxStream<'static, BrokerResult<Box<dyn Delivery>>>;

#[async_trait]
pub trait BrokerChannel: Send + Sync {
    async fn declare_queue(&self, queue: &str, declaration: &QueueDeclaration)
        -> BrokerResult<()>;

    /// Publish a payload to a queue and wait until the broker accepted it
    async fn publish(&self, queue: &str, payload: &[u8], persistent: bool) -> BrokerResult<()>;

    /// Start consuming a queue, one unacknowledged delivery at a time
    async fn consume(&self, queue: &str, consumer_tag: &str) -> BrokerResult<DeliveryStream>;

    async fn close(&self) -> BrokerResult<()>;
}

#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn open_channel(&self) -> BrokerResult<Arc<dyn BrokerChannel>>;

    async fn close(&self) -> BrokerResult<()>;
}

#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Open a new connection; `signal` must be fired when it fails later on
    async fn connect(&self, signal: FailureSignal) -> BrokerResult<Arc<dyn BrokerConnection>>;

    /// Human-readable target for log lines (credentials stripped)
    fn endpoint(&self) -> String;
}
