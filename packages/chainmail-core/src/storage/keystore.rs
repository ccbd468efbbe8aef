//! # Key Storage
//!
//! Passphrase-protected private keys on disk.
//!
//! ## Sealed Key Document
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    <dir>/<compressed pubkey hex>.json                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  {                                                                      │
//! │    "public_key":    "02…",          plaintext, used as AEAD AAD        │
//! │    "kdf":           "scrypt",                                          │
//! │    "scrypt_params": { "len", "n", "p", "r", "salt" },                  │
//! │    "nonce":         "…",            12 bytes, hex                      │
//! │    "ciphertext":    "…"             AES-256-GCM(private key), hex      │
//! │  }                                                                      │
//! │                                                                         │
//! │  passphrase ──scrypt(params)──► 32-byte key ──AES-256-GCM──► scalar     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The passphrase itself is never written anywhere.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{derive_key, DeriveOpts, PrivateKey, PublicKey, ScryptParams, KDF_SCRYPT};
use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
const NONCE_SIZE: usize = 12;

/// Sealing key length required from the KDF
const SEALING_KEY_SIZE: usize = 32;

/// A private key sealed under a passphrase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedKey {
    /// Public half, stored in the clear
    pub public_key: PublicKey,
    /// Name of the KDF that produced the sealing key; empty when absent
    #[serde(default)]
    pub kdf: String,
    /// Parameters for re-deriving the sealing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrypt_params: Option<ScryptParams>,
    /// AES-GCM nonce
    #[serde(with = "crate::crypto::hex_vec")]
    pub nonce: Vec<u8>,
    /// Sealed private key with authentication tag
    #[serde(with = "crate::crypto::hex_vec")]
    pub ciphertext: Vec<u8>,
}

impl EncryptedKey {
    /// Seal `private_key` under the passphrase carried by `opts`
    pub fn seal(private_key: &PrivateKey, opts: &DeriveOpts) -> Result<Self> {
        if opts.len != SEALING_KEY_SIZE {
            return Err(Error::InvalidKdfParams(format!(
                "sealing needs a {}-byte key, got len {}",
                SEALING_KEY_SIZE, opts.len
            )));
        }
        let derived = derive_key(opts)?;
        let public_key = private_key.public_key();

        let mut nonce = [0u8; NONCE_SIZE];
        rand::rngs::OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|_| Error::RngFailed)?;

        let cipher = Aes256Gcm::new_from_slice(&derived.key)
            .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;
        let secret = private_key.secret_bytes();
        let aad = public_key.to_compressed();
        let ciphertext = cipher
            .encrypt(
                AesNonce::from_slice(&nonce),
                Payload {
                    msg: secret.as_slice(),
                    aad: &aad,
                },
            )
            .map_err(|e| Error::EncryptionFailed(format!("Encryption failed: {}", e)))?;

        Ok(Self {
            public_key,
            kdf: KDF_SCRYPT.to_string(),
            scrypt_params: Some(derived.params),
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    /// Unseal with `passphrase`
    ///
    /// ## Errors
    ///
    /// - `KdfNotSupported` / `ScryptParamsRequired` for unusable metadata
    /// - `DecryptionFailed` for a wrong passphrase or a corrupted document
    pub fn open(&self, passphrase: &str) -> Result<PrivateKey> {
        let opts = DeriveOpts::from_persisted(&self.kdf, self.scrypt_params.as_ref())?
            .passphrase(passphrase);
        if self.nonce.len() != NONCE_SIZE {
            return Err(Error::DeserializationError(format!(
                "nonce must be {} bytes, got {}",
                NONCE_SIZE,
                self.nonce.len()
            )));
        }
        let derived = derive_key(&opts)?;

        let cipher = Aes256Gcm::new_from_slice(&derived.key)
            .map_err(|e| Error::DecryptionFailed(format!("Invalid key: {}", e)))?;
        let aad = self.public_key.to_compressed();
        let secret = Zeroizing::new(
            cipher
                .decrypt(
                    AesNonce::from_slice(&self.nonce),
                    Payload {
                        msg: &self.ciphertext,
                        aad: &aad,
                    },
                )
                .map_err(|_| {
                    Error::DecryptionFailed("wrong passphrase or corrupted key".into())
                })?,
        );

        let private_key = PrivateKey::from_bytes(&secret)?;
        if private_key.public_key() != self.public_key {
            return Err(Error::InvalidKey("sealed key does not match its public key".into()));
        }
        Ok(private_key)
    }

    /// Serialize to the on-disk JSON document
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse the on-disk JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Directory of sealed keys, one JSON document per key
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    /// Open (creating if needed) a keystore directory
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::StorageWriteError(format!("create keystore {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    fn key_path(&self, public_key: &PublicKey) -> PathBuf {
        self.dir.join(format!("{}.json", public_key.to_hex()))
    }

    /// Seal and persist a private key, returning its public key
    pub fn store(&self, private_key: &PrivateKey, opts: &DeriveOpts) -> Result<PublicKey> {
        let sealed = EncryptedKey::seal(private_key, opts)?;
        let path = self.key_path(&sealed.public_key);

        std::fs::write(&path, sealed.to_json()?)
            .map_err(|e| Error::StorageWriteError(format!("{}: {}", path.display(), e)))?;

        tracing::info!("Stored key {}", sealed.public_key);
        Ok(sealed.public_key)
    }

    /// Load the sealed document for a key
    pub fn get(&self, public_key: &PublicKey) -> Result<Option<EncryptedKey>> {
        let path = self.key_path(public_key);
        match std::fs::read_to_string(&path) {
            Ok(json) => Ok(Some(EncryptedKey::from_json(&json)?)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::StorageReadError(format!("{}: {}", path.display(), e))),
        }
    }

    /// Load and unseal a private key
    pub fn get_private_key(&self, public_key: &PublicKey, passphrase: &str) -> Result<PrivateKey> {
        let sealed = self
            .get(public_key)?
            .ok_or_else(|| Error::StorageReadError(format!("no key stored for {}", public_key)))?;
        sealed.open(passphrase)
    }

    /// Check if a key is stored
    pub fn has_key(&self, public_key: &PublicKey) -> bool {
        self.key_path(public_key).is_file()
    }

    /// Remove a stored key
    pub fn delete(&self, public_key: &PublicKey) -> Result<bool> {
        match std::fs::remove_file(self.key_path(public_key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::StorageWriteError(e.to_string())),
        }
    }

    /// Public keys of every stored key
    ///
    /// Files that are not named like a key are ignored.
    pub fn public_keys(&self) -> Result<Vec<PublicKey>> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| Error::StorageReadError(format!("list {}: {}", self.dir.display(), e)))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::StorageReadError(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Ok(key) = PublicKey::from_hex(stem) {
                    keys.push(key);
                }
            }
        }
        keys.sort_by_key(|k| k.to_hex());
        Ok(keys)
    }
}

// ============================================================================
// TESTS
// ============================================================================
