//! Queue Port and In-Process Backend
//!
//! Producers and consumers talk to a [`QueuePort`], never to a concrete
//! backend. Two implementations exist:
//!
//! - [`InMemoryQueueAdapter`]: single-process log with synchronous fan-out,
//!   meant for development and tests
//! - [`crate::broker::DurableQueueAdapter`]: AMQP broker-backed, durable
//!   queues and at-least-once delivery
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   publish(queue, msg)   ┌────────────────────────────┐
//! │   Producer   │ ──────────────────────▶ │         QueuePort          │
//! └──────────────┘                         │  ┌──────────────────────┐  │
//!                                          │  │ InMemoryQueueAdapter │  │
//! ┌──────────────┐  subscribe(queue, h)    │  ├──────────────────────┤  │
//! │   Consumer   │ ──────────────────────▶ │  │ DurableQueueAdapter  │  │
//! └──────────────┘ ◀── h(msg) → outcome ── │  └──────────────────────┘  │
//!                                          └────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use courier::queue::{HandlerOutcome, InMemoryQueueAdapter, QueuePort};
//! use courier::message::Message;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue: Arc<dyn QueuePort> = Arc::new(InMemoryQueueAdapter::new());
//!
//! queue
//!     .subscribe(
//!         "messages",
//!         Arc::new(|message: Message| async move {
//!             println!("Received: {}", message.content);
//!             HandlerOutcome::Success
//!         }),
//!     )
//!     .await?;
//!
//! queue.publish("messages", Message::new("hello", "user1", "user2")).await?;
//! queue.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
mod error;
mod memory;
mod traits;

pub use error::{QueueError, QueueResult};
pub use memory::InMemoryQueueAdapter;
pub use traits::{HandlerOutcome, MessageHandler, QueuePort};

pub(crate) use traits::invoke_handler;

#[cfg(test)]
mod tests;
