//! # Passphrase Key Derivation
//!
//! scrypt turns a passphrase into a symmetric key for sealing private keys
//! at rest. Every cost parameter except the passphrase is persisted next to
//! the sealed key, so the same passphrase re-derives the same key later.
//!
//! ## Option Assembly
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        DERIVE OPTIONS                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  First-time key creation                                               │
//! │  ───────────────────────                                                │
//! │    DeriveOpts::with_random_salt()?      defaults + fresh 32-byte salt  │
//! │        .passphrase("correct horse")                                    │
//! │                                                                         │
//! │  Re-deriving an existing key                                           │
//! │  ───────────────────────────                                            │
//! │    DeriveOpts::with_persisted_params(&stored)   exact N, P, R, len,    │
//! │        .passphrase("correct horse")             salt from the store    │
//! │                                                                         │
//! │  Later calls override earlier ones, so a caller may still tune a       │
//! │  single field after picking a constructor.                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Defaults
//!
//! | Parameter | Value | Notes |
//! |-----------|-------|-------|
//! | N | 2^18 = 262144 | ~256 MiB of memory with R = 8 |
//! | R | 8 | block size |
//! | P | 1 | parallelism |
//! | len | 32 | AES-256 key |
//!
//! Derivation at these settings takes around a second and must stay off hot
//! paths.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// KDF name recorded in persisted metadata
pub const KDF_SCRYPT: &str = "scrypt";

/// Default scrypt cost
pub const DEFAULT_N: u32 = 262_144;

/// Default scrypt parallelism
pub const DEFAULT_P: u32 = 1;

/// Default scrypt block size
pub const DEFAULT_R: u32 = 8;

/// Default derived key length in bytes
pub const DEFAULT_LEN: usize = 32;

/// Length of a freshly generated salt
pub const SALT_SIZE: usize = 32;

/// scrypt parameters as persisted with a sealed key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScryptParams {
    /// Derived key length in bytes
    pub len: usize,
    /// CPU/memory cost, a power of two
    pub n: u32,
    /// Parallelism
    pub p: u32,
    /// Block size
    pub r: u32,
    /// Salt, hex encoded on disk
    #[serde(with = "hex_vec")]
    pub salt: Vec<u8>,
}

/// Options for a single key derivation
///
/// The passphrase is never persisted; [`ScryptParams`] carries everything
/// else.
#[derive(Clone)]
pub struct DeriveOpts {
    /// CPU/memory cost, a power of two greater than 1
    pub n: u32,
    /// Parallelism
    pub p: u32,
    /// Block size
    pub r: u32,
    /// Derived key length in bytes
    pub len: usize,
    /// Salt, or none for an unsalted derivation
    pub salt: Option<Vec<u8>>,
    passphrase: Zeroizing<String>,
}

impl Default for DeriveOpts {
    fn default() -> Self {
        Self {
            n: DEFAULT_N,
            p: DEFAULT_P,
            r: DEFAULT_R,
            len: DEFAULT_LEN,
            salt: None,
            passphrase: Zeroizing::new(String::new()),
        }
    }
}

impl fmt::Debug for DeriveOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeriveOpts")
            .field("n", &self.n)
            .field("p", &self.p)
            .field("r", &self.r)
            .field("len", &self.len)
            .field("salt", &self.salt.as_ref().map(hex::encode))
            .finish_non_exhaustive()
    }
}

impl DeriveOpts {
    /// Defaults plus a fresh random salt, for first-time key creation
    pub fn with_random_salt() -> Result<Self> {
        let mut salt = vec![0u8; SALT_SIZE];
        rand::rngs::OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|_| Error::RngFailed)?;
        Ok(Self::default().salt(salt))
    }

    /// Reconstruct the exact parameters a key was first derived with
    pub fn with_persisted_params(params: &ScryptParams) -> Self {
        Self {
            n: params.n,
            p: params.p,
            r: params.r,
            len: params.len,
            salt: Some(params.salt.clone()),
            ..Self::default()
        }
    }

    /// Rebuild options from persisted keystore metadata
    ///
    /// ## Errors
    ///
    /// - `KdfNotSupported` if `kdf` is not scrypt
    /// - `ScryptParamsRequired` if the parameters are missing
    pub fn from_persisted(kdf: &str, params: Option<&ScryptParams>) -> Result<Self> {
        if kdf != KDF_SCRYPT {
            return Err(Error::KdfNotSupported(kdf.to_string()));
        }
        let params = params.ok_or(Error::ScryptParamsRequired)?;
        Ok(Self::with_persisted_params(params))
    }

    /// Set the passphrase
    pub fn passphrase(mut self, passphrase: &str) -> Self {
        self.passphrase = Zeroizing::new(passphrase.to_string());
        self
    }

    /// Set the salt
    pub fn salt(mut self, salt: Vec<u8>) -> Self {
        self.salt = Some(salt);
        self
    }

    /// Set the cost parameters
    pub fn cost(mut self, n: u32, r: u32, p: u32) -> Self {
        self.n = n;
        self.r = r;
        self.p = p;
        self
    }

    /// Set the derived key length
    pub fn output_len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    /// The parameters to persist alongside a sealed key
    pub fn params(&self) -> ScryptParams {
        ScryptParams {
            len: self.len,
            n: self.n,
            p: self.p,
            r: self.r,
            salt: self.salt.clone().unwrap_or_default(),
        }
    }

    fn scrypt_params(&self) -> Result<scrypt::Params> {
        if self.n < 2 || !self.n.is_power_of_two() {
            return Err(Error::InvalidKdfParams(format!(
                "N must be a power of two greater than 1, got {}",
                self.n
            )));
        }
        let log_n = self.n.trailing_zeros() as u8;
        scrypt::Params::new(log_n, self.r, self.p, self.len)
            .map_err(|e| Error::InvalidKdfParams(e.to_string()))
    }
}

/// A derived key together with the parameters that reproduce it
pub struct DerivedKey {
    /// The symmetric key
    pub key: Zeroizing<Vec<u8>>,
    /// Parameters to persist for re-derivation
    pub params: ScryptParams,
}

/// Derive a symmetric key from the passphrase and parameters in `opts`
///
/// CPU and memory heavy. Callers on an async runtime should run
/// this under `spawn_blocking`.
pub fn derive_key(opts: &DeriveOpts) -> Result<DerivedKey> {
    let params = opts.scrypt_params()?;
    let salt = opts.salt.as_deref().unwrap_or_default();

    let mut key = Zeroizing::new(vec![0u8; opts.len]);
    scrypt::scrypt(opts.passphrase.as_bytes(), salt, &params, &mut key)
        .map_err(|e| Error::KeyDerivationFailed(e.to_string()))?;

    Ok(DerivedKey {
        key,
        params: opts.params(),
    })
}

/// Serde helper for serializing byte vectors as hex
pub(crate) mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Cheap parameters so tests do not pay the production cost
    fn fast(opts: DeriveOpts) -> DeriveOpts {
        opts.cost(1024, 8, 1)
    }

    #[test]
    fn test_defaults() {
        let opts = DeriveOpts::default();

        assert_eq!(opts.n, 262_144);
        assert_eq!(opts.p, 1);
        assert_eq!(opts.r, 8);
        assert_eq!(opts.len, 32);
        assert_eq!(opts.salt, None);
        assert!(opts.passphrase.is_empty());
    }

    #[test]
    fn test_derive_deterministic() {
        let opts = fast(DeriveOpts::default().salt(b"salt".to_vec()).passphrase("hunter2"));

        let k1 = derive_key(&opts).unwrap();
        let k2 = derive_key(&opts).unwrap();

        assert_eq!(*k1.key, *k2.key);
        assert_eq!(k1.key.len(), 32);
    }

    #[test]
    fn test_salt_and_passphrase_change_output() {
        let base = fast(DeriveOpts::default().salt(b"salt-a".to_vec()).passphrase("one"));
        let other_salt = base.clone().salt(b"salt-b".to_vec());
        let other_pass = base.clone().passphrase("two");

        let k = derive_key(&base).unwrap();
        assert_ne!(*k.key, *derive_key(&other_salt).unwrap().key);
        assert_ne!(*k.key, *derive_key(&other_pass).unwrap().key);
    }

    #[test]
    fn test_later_options_override_earlier() {
        let opts = DeriveOpts::default()
            .salt(b"first".to_vec())
            .salt(b"second".to_vec())
            .output_len(16);

        assert_eq!(opts.salt.as_deref(), Some(&b"second"[..]));
        assert_eq!(opts.len, 16);
    }

    #[test]
    fn test_random_salt() {
        let o1 = DeriveOpts::with_random_salt().unwrap();
        let o2 = DeriveOpts::with_random_salt().unwrap();

        assert_eq!(o1.salt.as_ref().map(Vec::len), Some(SALT_SIZE));
        assert_ne!(o1.salt, o2.salt);
        assert_eq!(o1.n, DEFAULT_N);
    }

    #[test]
    fn test_persisted_params_rederive() {
        let first = fast(DeriveOpts::with_random_salt().unwrap()).passphrase("pw");
        let derived = derive_key(&first).unwrap();

        let json = serde_json::to_string(&derived.params).unwrap();
        let stored: ScryptParams = serde_json::from_str(&json).unwrap();

        let again = DeriveOpts::from_persisted(KDF_SCRYPT, Some(&stored))
            .unwrap()
            .passphrase("pw");
        assert_eq!(*derive_key(&again).unwrap().key, *derived.key);
    }

    #[test]
    fn test_from_persisted_errors() {
        let err = DeriveOpts::from_persisted("pbkdf2", None).unwrap_err();
        assert!(matches!(err, Error::KdfNotSupported(_)));

        let err = DeriveOpts::from_persisted(KDF_SCRYPT, None).unwrap_err();
        assert!(matches!(err, Error::ScryptParamsRequired));
        assert_eq!(err.to_string(), "scrypt params are required");
    }

    #[test]
    fn test_invalid_cost_rejected() {
        for n in [0, 1, 1000] {
            let opts = DeriveOpts::default().cost(n, 8, 1);
            assert!(matches!(derive_key(&opts), Err(Error::InvalidKdfParams(_))));
        }
    }

    #[test]
    fn test_debug_hides_passphrase() {
        let opts = DeriveOpts::default().passphrase("super-secret");
        assert!(!format!("{:?}", opts).contains("super-secret"));
    }
}
