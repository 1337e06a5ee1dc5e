//! Shared test handlers

use crate::message::Message;
use crate::queue::{HandlerOutcome, MessageHandler};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Handler that records message contents and answers with a fixed outcome
pub struct RecordingHandler {
    seen: Mutex<Vec<String>>,
    outcome: HandlerOutcome,
}

impl RecordingHandler {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            outcome: HandlerOutcome::Success,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            outcome: HandlerOutcome::retry("always fails"),
        })
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: Message) -> HandlerOutcome {
        self.seen.lock().unwrap().push(message.content);
        self.outcome.clone()
    }
}

pub fn message(content: &str) -> Message {
    Message::new(content, "sender", "recipient")
}
