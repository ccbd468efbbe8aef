//! # Mailbox Module
//!
//! Send and read orchestration: the encrypted message body goes to
//! off-chain storage, and only an encrypted pointer to it goes on-chain.
//!
//! ## Send
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              SEND                                       │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  message ──codec.encode──► wire bytes                                  │
//! │                               │                                         │
//! │                               ├──SHA3-256──► message_hash               │
//! │                               │                                         │
//! │                               ▼                                         │
//! │              encrypt(recipient) ──► content envelope                    │
//! │                               │                                         │
//! │              MurMur3 digest ──┤                                         │
//! │                               ▼                                         │
//! │              store.put(digest, envelope) ──► Location                   │
//! │                               │                                         │
//! │                               ▼                                         │
//! │              encrypt(recipient, location) ──► location envelope         │
//! │                               │                                         │
//! │                               ▼                                         │
//! │   "chainmail" ‖ bincode{version, location envelope, message_hash}      │
//! │                               │                                         │
//! │                               ▼                                         │
//! │              sender.send(to, from, data, signer, opts)                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Read
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              READ                                       │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  transaction data                                                      │
//! │     │ strip "chainmail", unmarshal          "could not unmarshal"      │
//! │     ▼                                                                   │
//! │  location envelope                                                     │
//! │     │ decrypt(private key)                  "could not decrypt         │
//! │     ▼                                        location"                 │
//! │  Location                                                              │
//! │     │ fetch, no digest check                "could not get message     │
//! │     ▼                                        from location"            │
//! │  content envelope                                                      │
//! │     │ decrypt(private key)                  "could not decrypt         │
//! │     ▼                                        message"                  │
//! │  wire bytes                                                            │
//! │     │ compare to message_hash, if present   "message-hash invalid"     │
//! │     ▼                                                                   │
//! │  codec.decode ──► message                                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both pipelines are strictly sequential with no retries. The first failing
//! stage aborts and is named in the returned error.

mod message;
mod payload;

use std::sync::Arc;

use async_trait::async_trait;

use crate::crypto::{decrypt, encrypt, EncryptedEnvelope, PrivateKey, PublicKey};
use crate::digest::{compare_contents_to_hash, Digest, CONTENT_HASH_KIND, MESSAGE_HASH_KIND};
use crate::error::{Error, Result, Stage, StageExt};
use crate::fetch::Fetcher;
use crate::storage::{ContentStore, Location};

pub use message::{JsonCodec, Message, MessageCodec};
pub use payload::{decode_payload, encode_payload, EnvelopePayload, MAGIC_PREFIX, PAYLOAD_VERSION};

/// Signs transaction payloads with the sender's chain key
pub trait Signer: Send + Sync {
    /// Sign `payload`, returning the chain-specific signature
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Options passed through to the blockchain sender
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOpts {
    /// Target network, e.g. `mainnet`
    pub network: Option<String>,
    /// Gas limit override
    pub gas_limit: Option<u64>,
    /// Gas price override
    pub gas_price: Option<u64>,
}

/// Submits transaction data to a blockchain
#[async_trait]
pub trait Sender: Send + Sync {
    /// Build, sign and submit a transaction carrying `data`
    async fn send(
        &self,
        to: &[u8],
        from: &[u8],
        data: &[u8],
        signer: &dyn Signer,
        opts: &SendOpts,
    ) -> Result<()>;
}

/// Result of a successful send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Where the content envelope was stored
    pub location: Location,
    /// Digest the content envelope was stored under
    pub content_hash: Digest,
    /// Digest of the plaintext wire bytes
    pub message_hash: Digest,
}

/// Sends and reads messages through pluggable storage and chain collaborators
pub struct Mailbox<C: MessageCodec> {
    codec: C,
    store: Arc<dyn ContentStore>,
    sender: Arc<dyn Sender>,
    fetcher: Fetcher,
}

impl<C: MessageCodec> Mailbox<C> {
    /// Create a mailbox
    pub fn new(
        codec: C,
        store: Arc<dyn ContentStore>,
        sender: Arc<dyn Sender>,
        fetcher: Fetcher,
    ) -> Self {
        Self {
            codec,
            store,
            sender,
            fetcher,
        }
    }

    /// The message codec
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Encrypt, store and announce a message to `recipient`
    pub async fn send(
        &self,
        message: &C::Message,
        recipient: &PublicKey,
        to: &[u8],
        from: &[u8],
        signer: &dyn Signer,
        opts: &SendOpts,
    ) -> Result<SentMessage> {
        let wire = self.codec.encode(message).stage(Stage::EncodeMessage)?;
        let message_hash = Digest::compute(MESSAGE_HASH_KIND, &wire).stage(Stage::EncodeMessage)?;

        let content = encrypt(recipient, &wire)
            .stage(Stage::EncryptMessage)?
            .to_bytes();

        let content_hash = Digest::compute(CONTENT_HASH_KIND, &content).stage(Stage::StoreMessage)?;
        let location = self
            .store
            .put(&content_hash, &content)
            .await
            .stage(Stage::StoreMessage)?;
        tracing::debug!("Stored {} byte content envelope at {}", content.len(), location);

        let encrypted_location = encrypt(recipient, location.as_str().as_bytes())
            .stage(Stage::EncryptLocation)?
            .to_bytes();

        let payload = EnvelopePayload::new(encrypted_location, Some(message_hash.to_bytes()));
        let data = encode_payload(&payload).stage(Stage::EncodePayload)?;

        self.sender
            .send(to, from, &data, signer, opts)
            .await
            .stage(Stage::SendTransaction)?;

        tracing::info!(
            "Sent message {} ({} bytes of transaction data)",
            message_hash,
            data.len()
        );

        Ok(SentMessage {
            location,
            content_hash,
            message_hash,
        })
    }

    /// Recover a message from transaction data with the recipient's key
    pub async fn read(&self, data: &[u8], private_key: &PrivateKey) -> Result<C::Message> {
        let payload = decode_payload(data)?;
        let location_envelope = payload.location_envelope().stage(Stage::Unmarshal)?;

        let location = decrypt_location(&location_envelope, private_key)
            .stage(Stage::DecryptLocation)?;
        tracing::debug!("Reading message from {}", location);

        let content = self
            .fetcher
            .get_message(location.as_str(), &[])
            .await
            .stage(Stage::GetMessage)?;

        let wire = EncryptedEnvelope::from_bytes(&content)
            .and_then(|envelope| decrypt(private_key, &envelope))
            .stage(Stage::DecryptMessage)?;

        match &payload.message_hash {
            Some(hash) => {
                compare_contents_to_hash(&wire, hash).stage(Stage::VerifyMessageHash)?;
            }
            None => tracing::debug!("Payload carries no message hash, skipping check"),
        }

        let message = self.codec.decode(&wire).stage(Stage::DecodeMessage)?;
        tracing::info!("Read message from {}", location);
        Ok(message)
    }
}

fn decrypt_location(envelope: &EncryptedEnvelope, private_key: &PrivateKey) -> Result<Location> {
    let bytes = decrypt(private_key, envelope)?;
    let location = String::from_utf8(bytes)
        .map_err(|_| Error::InvalidLocation("location is not UTF-8".into()))?;
    Location::parse(&location)
}

// ============================================================================
// TESTS
// ============================================================================
