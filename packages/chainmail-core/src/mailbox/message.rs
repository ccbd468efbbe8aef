//! Reference message type and wire codec.
//!
//! Production deployments plug in their own [`MessageCodec`] (RFC 2822
//! mail, protobuf, ...). The JSON codec here backs tests and the demo.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Converts messages to and from the plaintext wire bytes that get encrypted
pub trait MessageCodec: Send + Sync {
    /// The decoded message type
    type Message: Send + Sync;

    /// Serialize a message to wire bytes
    fn encode(&self, message: &Self::Message) -> Result<Vec<u8>>;

    /// Parse wire bytes into a message
    fn decode(&self, wire: &[u8]) -> Result<Self::Message>;
}

/// A mail message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID (UUID)
    pub id: Uuid,
    /// Sender address
    pub from: String,
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain text body
    pub body: String,
    /// When the message was composed
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Compose a new message stamped with the current time
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            timestamp: Utc::now(),
        }
    }
}

/// JSON wire encoding for [`Message`]
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    type Message = Message;

    fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(message)?)
    }

    fn decode(&self, wire: &[u8]) -> Result<Message> {
        serde_json::from_slice(wire).map_err(|e| Error::DeserializationError(e.to_string()))
    }
}
