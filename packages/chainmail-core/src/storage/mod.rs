//! # Storage Module
//!
//! Collaborator contracts for off-chain content, fetch caching and key
//! storage, plus reference implementations.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  ContentStore (async)                                           │   │
//! │  │  ────────────────────                                            │   │
//! │  │                                                                 │   │
//! │  │  put(content_hash, envelope_bytes) → Location                  │   │
//! │  │                                                                 │   │
//! │  │  FileContentStore: <root>/<hex digest>  →  file://<path>       │   │
//! │  │  (S3, IPFS and friends live outside this crate)                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Cache                                                          │   │
//! │  │  ─────                                                           │   │
//! │  │                                                                 │   │
//! │  │  get(location) → Option<bytes>     set(location, bytes)        │   │
//! │  │                                                                 │   │
//! │  │  MemoryCache   RwLock<HashMap>                                 │   │
//! │  │  FileCache     one file per location, optional TTL             │   │
//! │  │  NoopCache     always misses                                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  KeyStore                                                       │   │
//! │  │  ────────                                                        │   │
//! │  │                                                                 │   │
//! │  │  <dir>/<compressed pubkey hex>.json                            │   │
//! │  │  private key sealed with AES-256-GCM under an scrypt key       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cached bytes are always re-verified by the fetch pipeline when a digest
//! is supplied, so a cache never needs to be trusted.

mod cache;
mod content;
mod keystore;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::{Error, Result};

pub use cache::{FileCache, MemoryCache, NoopCache};
pub use content::FileContentStore;
pub use keystore::{EncryptedKey, KeyStore};

/// Separator between a location's scheme and the rest
pub const SCHEME_SEPARATOR: &str = "://";

/// An absolute URI pointing at stored content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location(String);

impl Location {
    /// Validate and wrap a location string
    pub fn parse(location: &str) -> Result<Self> {
        let (scheme, _) = location
            .split_once(SCHEME_SEPARATOR)
            .ok_or_else(|| Error::InvalidLocation(format!("missing scheme: {}", location)))?;

        let mut chars = scheme.chars();
        let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !valid {
            return Err(Error::InvalidLocation(format!("bad scheme: {:?}", scheme)));
        }

        Ok(Self(location.to_string()))
    }

    /// The scheme, e.g. `https`
    pub fn scheme(&self) -> &str {
        self.split().0
    }

    /// Everything after `://`
    pub fn remainder(&self) -> &str {
        self.split().1
    }

    /// The full URI
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> (&str, &str) {
        // validated on construction
        self.0
            .split_once(SCHEME_SEPARATOR)
            .unwrap_or((self.0.as_str(), ""))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Location {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.0
    }
}

impl AsRef<str> for Location {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Off-chain store for encrypted message content
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `contents`, keyed by `content_hash`, and return where they live
    async fn put(&self, content_hash: &Digest, contents: &[u8]) -> Result<Location>;
}

/// Cache of fetched bytes, keyed by location
///
/// Implementations must tolerate concurrent access. Writes for the same
/// location always carry the same bytes, so last-writer-wins is fine.
///
/// Calls may block. The fetch pipeline runs them on tokio's blocking pool.
pub trait Cache: Send + Sync {
    /// Look up cached bytes
    fn get(&self, location: &str) -> Result<Option<Vec<u8>>>;

    /// Store bytes for a location
    fn set(&self, location: &str, contents: &[u8]) -> Result<()>;
}

// ============================================================================
// TESTS
// ============================================================================
