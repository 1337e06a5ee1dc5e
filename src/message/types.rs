//! Message and status types

use crate::message::error::{MessageError, MessageResult};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Delivery status of a message
///
/// Statuses only move forward: `PENDING` may become `SENT`, `DELIVERED` or
/// `FAILED`; `SENT` may become `DELIVERED` or `FAILED`; the last two are
/// terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
}

impl MessageStatus {
    /// Whether moving from `self` to `next` respects the directional rules
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        matches!(
            (self, next),
            (Pending, Sent) | (Pending, Delivered) | (Pending, Failed) | (Sent, Delivered)
                | (Sent, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Delivered | MessageStatus::Failed)
    }
}

/// A message exchanged between a sender and a recipient
///
/// Values are cloned on every hand-off; the queue and each consumer hold
/// their own copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Producer-assigned unique identifier
    pub id: String,
    pub content: String,
    pub sender: String,
    pub recipient: String,
    /// Creation time, serialized as ISO-8601 with millisecond precision
    #[serde(with = "crate::message::codec::iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

impl Message {
    /// Build a new `PENDING` message with a fresh UUID and the current time
    ///
    /// The timestamp is truncated to milliseconds so the value survives a
    /// round trip through the wire format unchanged.
    ///
    /// # Example
    ///
    /// ```rust
    /// use courier::message::{Message, MessageStatus};
    ///
    /// let message = Message::new("hello", "user1", "user2");
    /// assert_eq!(message.status, MessageStatus::Pending);
    /// ```
    pub fn new(
        content: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            sender: sender.into(),
            recipient: recipient.into(),
            timestamp: Utc::now().trunc_subsecs(3),
            status: MessageStatus::Pending,
        }
    }

    /// Advance the status, rejecting backwards or sideways moves
    pub fn transition_to(&mut self, next: MessageStatus) -> MessageResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(MessageError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
