//! Message entity carried by the queue port
//!
//! The queue core only transports [`Message`] values; it never changes their
//! status. Producers build messages with [`Message::new`], consumers receive
//! independent copies and may advance the status along the directional rules
//! encoded in [`MessageStatus::can_transition_to`].
//!
//! The wire form used by the durable backend lives in [`codec`]: a flat JSON
//! object whose timestamp is an ISO-8601 string with millisecond precision.

pub mod codec;
mod error;
mod types;

pub use error::{MessageError, MessageResult};
pub use types::{Message, MessageStatus};
