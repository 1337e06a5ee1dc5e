//! Public API for the queue system
//!
//! External modules should import from here rather than directly from internal modules.

// Port contract
pub use crate::queue::traits::{HandlerOutcome, MessageHandler, QueuePort};

// Backends
pub use crate::broker::DurableQueueAdapter;
pub use crate::queue::memory::InMemoryQueueAdapter;

// Message types
pub use crate::message::{Message, MessageStatus};

// Error handling
pub use crate::queue::error::{QueueError, QueueResult};
