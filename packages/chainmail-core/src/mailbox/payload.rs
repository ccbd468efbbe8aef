//! Transaction data payload.
//!
//! ```text
//! ┌───────────────┬──────────────────────────────────────────────────────┐
//! │ "chainmail"   │ bincode(EnvelopePayload)                             │
//! │ 9 bytes       │   version: u8                                        │
//! │               │   encrypted_location: bytes  (serialized envelope)   │
//! │               │   message_hash: Option<bytes> (SHA3-256 multihash)   │
//! └───────────────┴──────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::crypto::EncryptedEnvelope;
use crate::error::{Error, Result, Stage, StageExt};

/// Marks transaction data as a protocol payload
pub const MAGIC_PREFIX: [u8; 9] = *b"chainmail";

/// Current payload version
pub const PAYLOAD_VERSION: u8 = 1;

/// Body of the transaction data, after the magic prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopePayload {
    /// Payload format version
    pub version: u8,
    /// Serialized location envelope
    pub encrypted_location: Vec<u8>,
    /// Serialized digest of the plaintext wire bytes
    pub message_hash: Option<Vec<u8>>,
}

impl EnvelopePayload {
    /// Build a current-version payload
    pub fn new(encrypted_location: Vec<u8>, message_hash: Option<Vec<u8>>) -> Self {
        Self {
            version: PAYLOAD_VERSION,
            encrypted_location,
            message_hash,
        }
    }

    /// Parse the location envelope
    pub fn location_envelope(&self) -> Result<EncryptedEnvelope> {
        EncryptedEnvelope::from_bytes(&self.encrypted_location)
    }
}

/// Prefix and serialize a payload into transaction data
pub fn encode_payload(payload: &EnvelopePayload) -> Result<Vec<u8>> {
    let body =
        bincode::serialize(payload).map_err(|e| Error::SerializationError(e.to_string()))?;

    let mut data = Vec::with_capacity(MAGIC_PREFIX.len() + body.len());
    data.extend_from_slice(&MAGIC_PREFIX);
    data.extend_from_slice(&body);
    Ok(data)
}

/// Strip the prefix and deserialize transaction data
///
/// ## Errors
///
/// - `InvalidEncodingPrefix` if the data is not a protocol payload
/// - stage "could not unmarshal" if the body is malformed or of an unknown
///   version
pub fn decode_payload(data: &[u8]) -> Result<EnvelopePayload> {
    let body = data
        .strip_prefix(&MAGIC_PREFIX[..])
        .ok_or(Error::InvalidEncodingPrefix)?;

    let payload: EnvelopePayload = bincode::deserialize(body)
        .map_err(Error::from)
        .stage(Stage::Unmarshal)?;

    if payload.version != PAYLOAD_VERSION {
        return Err(Error::Stage {
            stage: Stage::Unmarshal,
            cause: Box::new(Error::MalformedEnvelope(format!(
                "unsupported payload version {}",
                payload.version
            ))),
        });
    }
    Ok(payload)
}

// ============================================================================
// TESTS
// ============================================================================
