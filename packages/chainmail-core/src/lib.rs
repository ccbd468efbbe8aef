//! # Chainmail Core
//!
//! End-to-end encrypted mail carried over a blockchain. The message body is
//! encrypted to the recipient's secp256k1 key and put in off-chain storage.
//! The transaction only carries an encrypted pointer to it and a hash of the
//! plaintext.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       CHAINMAIL CORE MODULES                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                           Mailbox                                 │  │
//! │  │   send: encode → encrypt → store → encrypt location → sender     │  │
//! │  │   read: unmarshal → decrypt location → fetch → decrypt → verify  │  │
//! │  └───────┬──────────────────┬──────────────────┬──────────────┬────┘  │
//! │          │                  │                  │              │        │
//! │  ┌───────▼─────┐  ┌─────────▼────┐  ┌─────────▼────┐  ┌──────▼─────┐  │
//! │  │   Crypto    │  │    Digest    │  │    Fetch     │  │  Storage   │  │
//! │  │             │  │              │  │              │  │            │  │
//! │  │ - secp256k1 │  │ - SHA3-256   │  │ - http(s)    │  │ - content  │  │
//! │  │ - ECIES     │  │ - SHA2-256   │  │ - file       │  │ - caches   │  │
//! │  │ - scrypt    │  │ - MurMur3    │  │ - cache      │  │ - keystore │  │
//! │  └─────────────┘  └──────────────┘  └──────────────┘  └────────────┘  │
//! │                                                                         │
//! │  ┌──────────────────────────┐  ┌──────────────────────────────────┐   │
//! │  │          Config          │  │              Error               │   │
//! │  │  TOML, fetch + caching   │  │  codes, kinds, pipeline stages   │   │
//! │  └──────────────────────────┘  └──────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error type, codes and pipeline stages
//! - [`crypto`] - Keys, the public-key envelope and passphrase KDF
//! - [`digest`] - Multihash-style digests for message and content identity
//! - [`storage`] - Locations, content stores, fetch caches and the keystore
//! - [`fetch`] - Digest-verified retrieval from a location
//! - [`mailbox`] - Send and read orchestration
//! - [`config`] - TOML configuration
//!
//! ## Collaborators
//!
//! Chain access and signing are not part of this crate. Callers supply a
//! [`mailbox::Sender`] and a [`mailbox::Signer`], a [`storage::ContentStore`]
//! for the encrypted bodies, and a [`mailbox::MessageCodec`] for their
//! message format.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod digest;
pub mod error;
pub mod fetch;
pub mod mailbox;
pub mod storage;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::MailboxConfig;
pub use crypto::{EncryptedEnvelope, PrivateKey, PublicKey};
pub use digest::{Digest, HashKind};
pub use error::{Error, Result, Stage};
pub use fetch::Fetcher;
pub use mailbox::{Mailbox, MessageCodec, SendOpts, Sender, SentMessage, Signer};
pub use storage::{Cache, ContentStore, Location};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Chainmail Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns build information for debugging
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        target: std::env::consts::OS,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Build information for debugging
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Crate version
    pub version: &'static str,
    /// Target operating system
    pub target: &'static str,
    /// Build profile (debug/release)
    pub profile: &'static str,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = build_info();
        assert_eq!(info.version, version());
        assert!(!info.target.is_empty());
    }
}
