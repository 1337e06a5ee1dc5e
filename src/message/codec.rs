//! Wire codec for messages
//!
//! Messages travel as flat JSON records:
//!
//! ```text
//! {"id":"…","content":"…","sender":"…","recipient":"…",
//!  "timestamp":"2024-05-01T12:30:00.123Z","status":"PENDING"}
//! ```

use crate::message::Message;
use crate::queue::{QueueError, QueueResult};

const PREVIEW_BYTES: usize = 100;

/// Serialize a message into its wire payload
pub fn encode(message: &Message) -> QueueResult<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| QueueError::Serialization {
        message: format!("Failed to serialize message {}: {}", message.id, e),
    })
}

/// Deserialize a wire payload back into a message
///
/// Failures carry a short preview of the payload to help trace malformed
/// producers.
pub fn decode(payload: &[u8]) -> QueueResult<Message> {
    serde_json::from_slice(payload).map_err(|e| {
        let preview = if payload.len() > PREVIEW_BYTES {
            format!(
                "{}...",
                String::from_utf8_lossy(&payload[..PREVIEW_BYTES])
            )
        } else {
            String::from_utf8_lossy(payload).into_owned()
        };
        QueueError::Serialization {
            message: format!(
                "Failed to deserialize message: {} | data_length: {}, data_preview: '{}'",
                e,
                payload.len(),
                preview
            ),
        }
    })
}

/// Serde adapter for ISO-8601 timestamps with millisecond precision
///
/// Decoding accepts any RFC 3339 offset and fractional precision. Encoding
/// always writes UTC with a `Z` suffix and exactly three fractional digits,
/// so a decoded timestamp is re-encoded in that normalised form and digits
/// below the millisecond are dropped.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
