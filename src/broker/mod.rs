//! Durable Broker Backend
//!
//! Broker-backed implementation of [`crate::queue::QueuePort`] with
//! at-least-once delivery and automatic reconnection.
//!
//! The [`ConnectionSupervisor`] owns the one connection/channel pair and its
//! lifecycle; [`DurableQueueAdapter`] asks it for a live channel before every
//! publish and subscribe. Both only speak to the broker through the traits in
//! [`transport`], which [`AmqpConnector`] implements with `lapin`.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use courier::broker::{AmqpConnector, BackoffPolicy, DurableQueueAdapter};
//! use courier::message::Message;
//! use courier::queue::QueuePort;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = Arc::new(AmqpConnector::new("amqp://localhost:5672"));
//! let queue = DurableQueueAdapter::new(connector, BackoffPolicy::default());
//!
//! queue.publish("messages", Message::new("hello", "user1", "user2")).await?;
//! queue.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod amqp;
mod backoff;
mod durable;
mod error;
pub mod probe;
mod supervisor;
pub mod transport;

pub use amqp::AmqpConnector;
pub use backoff::BackoffPolicy;
pub use durable::DurableQueueAdapter;
pub use error::{BrokerError, BrokerResult};
pub use supervisor::{ConnectionState, ConnectionSupervisor, LiveChannel, StateTransition};

#[cfg(test)]
pub(crate) mod tests;
