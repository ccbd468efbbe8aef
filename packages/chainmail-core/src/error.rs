//! # Error Handling
//!
//! This module provides the error types for Chainmail Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Format Errors (100-199)          never retried                    │
//! │  │   ├── UnknownHashKind       - Digest prefix not recognised          │
//! │  │   ├── InvalidDigest         - Wrong digest length / encoding        │
//! │  │   ├── InvalidEncodingPrefix - Magic prefix missing                  │
//! │  │   ├── MalformedEnvelope     - Envelope fields malformed             │
//! │  │   ├── InvalidKey            - Bad curve point / scalar              │
//! │  │   └── InvalidLocation       - Location is not an absolute URI       │
//! │  │                                                                      │
//! │  ├── Integrity Errors (200-299)       never fall through               │
//! │  │   ├── InvalidMac            - Envelope MAC mismatch                 │
//! │  │   ├── HashMismatch          - Content digest mismatch               │
//! │  │   └── DecryptionFailed      - Padding / AEAD failure                │
//! │  │                                                                      │
//! │  ├── Transport Errors (300-399)       retry belongs to the caller      │
//! │  │   ├── HttpStatus            - Non-2xx response                      │
//! │  │   ├── TransportError        - Unreachable host, I/O failure         │
//! │  │   ├── ContentNotFound       - Missing file                          │
//! │  │   └── Storage{Read,Write}   - Collaborator storage failure          │
//! │  │                                                                      │
//! │  ├── Configuration Errors (400-499)   fatal, immediate                 │
//! │  │   ├── UnsupportedScheme     - No fetcher for URI scheme             │
//! │  │   ├── KdfNotSupported       - Persisted KDF name unknown            │
//! │  │   ├── ScryptParamsRequired  - Persisted scrypt params missing       │
//! │  │   └── InvalidKdfParams      - Cost parameters rejected              │
//! │  │                                                                      │
//! │  └── Stage { stage, cause }           wraps any of the above with the  │
//! │                                        pipeline step that failed       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stage Context
//!
//! The send and read pipelines are strictly sequential, so every failure
//! is reported with the step it came from:
//!
//! ```text
//! Err(Stage { DecryptLocation, InvalidMac })
//!   → "could not decrypt location: invalid mac"
//! ```
//!
//! `Error::root()` peels the stages off to reach the original cause, and
//! `code()` / `kind()` always describe that cause.

use std::fmt;

use thiserror::Error;

/// Result type alias for Chainmail Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Chainmail Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Format Errors (100-199)
    // ========================================================================

    /// Digest bytes did not match any supported encoding
    #[error("unknown hash kind")]
    UnknownHashKind,

    /// Digest had a recognised prefix but an invalid body
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Transaction data does not start with the protocol magic prefix
    #[error("invalid encoding prefix")]
    InvalidEncodingPrefix,

    /// Encrypted envelope or payload fields are malformed
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Invalid key format or length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Location is not an absolute URI
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    // ========================================================================
    // Integrity Errors (200-299)
    // ========================================================================

    /// Envelope MAC did not verify
    #[error("invalid mac")]
    InvalidMac,

    /// Recomputed digest differs from the expected digest
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Expected raw digest (hex)
        expected: String,
        /// Recomputed raw digest (hex)
        actual: String,
    },

    /// Decryption failed after authentication (padding, AEAD tag)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    // ========================================================================
    // Transport Errors (300-399)
    // ========================================================================

    /// HTTP fetch returned a non-success status
    #[error("HTTP request to {location} failed with status {status}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// Location that was requested
        location: String,
    },

    /// Network or I/O failure while reaching a location
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Nothing stored at the location
    #[error("Content not found: {0}")]
    ContentNotFound(String),

    /// Failed to read from a storage collaborator
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Failed to write to a storage collaborator
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    // ========================================================================
    // Configuration Errors (400-499)
    // ========================================================================

    /// Location scheme has no fetcher
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Persisted key names a KDF other than scrypt
    #[error("KDF not supported: {0}")]
    KdfNotSupported(String),

    /// Persisted key is missing its scrypt parameters
    #[error("scrypt params are required")]
    ScryptParamsRequired,

    /// Cost parameters or salt rejected
    #[error("Invalid KDF parameters: {0}")]
    InvalidKdfParams(String),

    /// Configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    /// Random number generation failed
    #[error("Random number generation failed")]
    RngFailed,

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    // ========================================================================
    // Stage Context
    // ========================================================================

    /// A pipeline stage failed
    ///
    /// The cause is rendered inline and not exposed through `source()`.
    #[error("{stage}: {cause}")]
    Stage {
        /// The step that failed
        stage: Stage,
        /// What went wrong in that step
        cause: Box<Error>,
    },
}

/// The pipeline step an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Parsing the expected digest
    ParseHash,
    /// Recomputing the digest of the contents
    CreateHash,
    /// Encoding the message to wire bytes
    EncodeMessage,
    /// Encrypting the message body
    EncryptMessage,
    /// Storing the encrypted body
    StoreMessage,
    /// Encrypting the location
    EncryptLocation,
    /// Building the transaction payload
    EncodePayload,
    /// Submitting the transaction
    SendTransaction,
    /// Decoding the transaction payload
    Unmarshal,
    /// Decrypting the location envelope
    DecryptLocation,
    /// Dereferencing the location
    GetMessage,
    /// Decrypting the message envelope
    DecryptMessage,
    /// Checking the message-identity digest
    VerifyMessageHash,
    /// Decoding the wire bytes
    DecodeMessage,
    /// Reading from the cache
    ReadCache,
    /// Retrieving bytes from a location
    Fetch,
    /// Checking fetched bytes against their digest
    VerifyContents,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Stage::ParseHash => "could not parse hash",
            Stage::CreateHash => "could not create hash",
            Stage::EncodeMessage => "could not encode message",
            Stage::EncryptMessage => "could not encrypt message",
            Stage::StoreMessage => "could not store message",
            Stage::EncryptLocation => "could not encrypt location",
            Stage::EncodePayload => "could not encode payload",
            Stage::SendTransaction => "could not send transaction",
            Stage::Unmarshal => "could not unmarshal",
            Stage::DecryptLocation => "could not decrypt location",
            Stage::GetMessage => "could not get message from location",
            Stage::DecryptMessage => "could not decrypt message",
            Stage::VerifyMessageHash => "message-hash invalid",
            Stage::DecodeMessage => "could not decode message",
            Stage::ReadCache => "could not read cache",
            Stage::Fetch => "could not fetch contents",
            Stage::VerifyContents => "contents failed verification",
        };
        f.write_str(msg)
    }
}

/// Error categories from the protocol's error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; fatal
    Format,
    /// Authentication or digest failure; fatal
    Integrity,
    /// Network or storage failure; the caller may retry
    Transport,
    /// Unsupported or missing configuration; fatal
    Configuration,
    /// Failure inside this library
    Internal,
}

impl Error {
    /// The innermost error, with all stage context removed
    pub fn root(&self) -> &Error {
        match self {
            Error::Stage { cause, .. } => cause.root(),
            other => other,
        }
    }

    /// The outermost stage, if this error carries stage context
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Get the numeric error code of the root cause
    ///
    /// Error codes are organized by category:
    /// - 100-199: Format
    /// - 200-299: Integrity
    /// - 300-399: Transport
    /// - 400-499: Configuration
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Format (100-199)
            Error::UnknownHashKind => 100,
            Error::InvalidDigest(_) => 101,
            Error::InvalidEncodingPrefix => 102,
            Error::MalformedEnvelope(_) => 103,
            Error::InvalidKey(_) => 104,
            Error::InvalidLocation(_) => 105,

            // Integrity (200-299)
            Error::InvalidMac => 200,
            Error::HashMismatch { .. } => 201,
            Error::DecryptionFailed(_) => 202,

            // Transport (300-399)
            Error::HttpStatus { .. } => 300,
            Error::TransportError(_) => 301,
            Error::ContentNotFound(_) => 302,
            Error::StorageReadError(_) => 303,
            Error::StorageWriteError(_) => 304,

            // Configuration (400-499)
            Error::UnsupportedScheme(_) => 400,
            Error::KdfNotSupported(_) => 401,
            Error::ScryptParamsRequired => 402,
            Error::InvalidKdfParams(_) => 403,
            Error::InvalidConfig(_) => 404,

            // Internal (900-999)
            Error::EncryptionFailed(_) => 900,
            Error::KeyDerivationFailed(_) => 901,
            Error::RngFailed => 902,
            Error::SerializationError(_) => 903,
            Error::DeserializationError(_) => 904,

            Error::Stage { cause, .. } => cause.code(),
        }
    }

    /// Category of the root cause
    pub fn kind(&self) -> ErrorKind {
        match self.code() {
            100..=199 => ErrorKind::Format,
            200..=299 => ErrorKind::Integrity,
            300..=399 => ErrorKind::Transport,
            400..=499 => ErrorKind::Configuration,
            _ => ErrorKind::Internal,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Only transport failures can be resolved by retrying; the retry
    /// policy itself belongs to the caller.
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

/// Attach stage context to a result
pub(crate) trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|cause| Error::Stage {
            stage,
            cause: Box::new(cause),
        })
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::DeserializationError(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::TransportError(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
