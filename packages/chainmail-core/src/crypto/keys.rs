//! # Key Management
//!
//! secp256k1 key pairs for envelope encryption.
//!
//! ## Key Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  PrivateKey (secp256k1 scalar)                                  │   │
//! │  │  ─────────────────────────────                                   │   │
//! │  │                                                                  │   │
//! │  │  • Recipient's static key: decrypts location and content       │   │
//! │  │  • Sender's ephemeral key: one per envelope, then dropped       │   │
//! │  │  • 32 bytes, zeroized on drop                                   │   │
//! │  │                                                                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  PublicKey (secp256k1 point, SEC1)                              │   │
//! │  │  ─────────────────────────────────                               │   │
//! │  │                                                                  │   │
//! │  │  Compressed:    02|03 ‖ X              (33 bytes)               │   │
//! │  │  Uncompressed:  04    ‖ X ‖ Y          (65 bytes)               │   │
//! │  │                                                                  │   │
//! │  │  Either form is accepted. Envelopes always carry the            │   │
//! │  │  uncompressed form, keystores file keys under the compressed.   │   │
//! │  │                                                                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Point (de)compression lives here so the envelope code never touches
//! curve encodings directly.

use std::fmt;

use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Size of a private key in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Size of a compressed SEC1 public key
pub const COMPRESSED_PUBLIC_KEY_SIZE: usize = 33;

/// Size of an uncompressed SEC1 public key
pub const UNCOMPRESSED_PUBLIC_KEY_SIZE: usize = 65;

/// secp256k1 private key
///
/// ## Security
///
/// - The scalar is zeroized when this struct is dropped
/// - `Debug` never prints key material
#[derive(Clone)]
pub struct PrivateKey {
    secret: k256::SecretKey,
}

impl PrivateKey {
    /// Generate a new random private key from the OS RNG
    pub fn generate() -> Self {
        Self {
            secret: k256::SecretKey::random(&mut OsRng),
        }
    }

    /// Create from a 32-byte big-endian scalar
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PRIVATE_KEY_SIZE {
            return Err(Error::InvalidKey(format!(
                "private key must be {} bytes, got {}",
                PRIVATE_KEY_SIZE,
                bytes.len()
            )));
        }
        let secret = k256::SecretKey::from_slice(bytes)
            .map_err(|_| Error::InvalidKey("private key is not a valid secp256k1 scalar".into()))?;
        Ok(Self { secret })
    }

    /// Decode from hex, with or without a `0x` prefix
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(hex_str.trim_start_matches("0x"))
                .map_err(|e| Error::InvalidKey(format!("Invalid hex: {}", e)))?,
        );
        Self::from_bytes(&bytes)
    }

    /// Get the secret scalar bytes (for sealing into a keystore)
    ///
    /// ## Security Warning
    ///
    /// Never log or transmit these bytes.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_SIZE]> {
        let mut out = Zeroizing::new([0u8; PRIVATE_KEY_SIZE]);
        out.copy_from_slice(&self.secret.to_bytes());
        out
    }

    /// Derive the matching public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            point: self.secret.public_key(),
        }
    }

    /// ECDH with another party's public key
    ///
    /// Returns the x-coordinate of `their_public × self`, 32 bytes
    /// big-endian. Both sides of the exchange compute the same value.
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> Zeroizing<[u8; 32]> {
        let shared = k256::ecdh::diffie_hellman(
            self.secret.to_nonzero_scalar(),
            their_public.point.as_affine(),
        );
        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(shared.raw_secret_bytes());
        out
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key().to_hex())
            .finish_non_exhaustive()
    }
}

/// secp256k1 public key
///
/// Serializes as the hex of its compressed form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey {
    point: k256::PublicKey,
}

impl PublicKey {
    /// Parse a SEC1 encoded key, compressed (33 bytes) or uncompressed (65 bytes)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            COMPRESSED_PUBLIC_KEY_SIZE | UNCOMPRESSED_PUBLIC_KEY_SIZE => {}
            len => {
                return Err(Error::InvalidKey(format!(
                    "public key must be {} or {} bytes, got {}",
                    COMPRESSED_PUBLIC_KEY_SIZE, UNCOMPRESSED_PUBLIC_KEY_SIZE, len
                )))
            }
        }
        let point = k256::PublicKey::from_sec1_bytes(bytes)
            .map_err(|_| Error::InvalidKey("public key is not a point on secp256k1".into()))?;
        Ok(Self { point })
    }

    /// Decode from hex, with or without a `0x` prefix
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim_start_matches("0x"))
            .map_err(|e| Error::InvalidKey(format!("Invalid hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// 33-byte compressed encoding
    pub fn to_compressed(&self) -> Vec<u8> {
        self.point.to_encoded_point(true).as_bytes().to_vec()
    }

    /// 65-byte uncompressed encoding
    pub fn to_uncompressed(&self) -> Vec<u8> {
        self.point.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Hex of the compressed encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_compressed())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for PublicKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_hex()
    }
}

/// Convert a SEC1 public key of either form to its 33-byte compressed form
pub fn compress(public_key: &[u8]) -> Result<Vec<u8>> {
    Ok(PublicKey::from_bytes(public_key)?.to_compressed())
}

/// Convert a SEC1 public key of either form to its 65-byte uncompressed form
pub fn decompress(public_key: &[u8]) -> Result<Vec<u8>> {
    Ok(PublicKey::from_bytes(public_key)?.to_uncompressed())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SOFIA_PRIVATE: &str = "01901E63389EF02EAA7C5782E08B40D98FAEF835F28BD144EECF5614A415943F";
    const SOFIA_COMPRESSED: &str =
        "0269d908510e355beb1d5bf2df8129e5b6401e1969891e8016a0b2300739bbb006";
    const SOFIA_UNCOMPRESSED: &str = "0469d908510e355beb1d5bf2df8129e5b6401e1969891e8016a0b2300739bbb00687055e5924a2fd8dd35f069dc14d8147aa11c1f7e2f271573487e1beeb2be9d0";

    #[test]
    fn test_key_generation() {
        let k1 = PrivateKey::generate();
        let k2 = PrivateKey::generate();

        assert_ne!(k1.public_key(), k2.public_key());
    }

    #[test]
    fn test_known_public_key() {
        let key = PrivateKey::from_hex(SOFIA_PRIVATE).unwrap();
        let public = key.public_key();

        assert_eq!(hex::encode(public.to_compressed()), SOFIA_COMPRESSED);
        assert_eq!(hex::encode(public.to_uncompressed()), SOFIA_UNCOMPRESSED);
    }

    #[test]
    fn test_compress_decompress() {
        let compressed = hex::decode(SOFIA_COMPRESSED).unwrap();
        let uncompressed = hex::decode(SOFIA_UNCOMPRESSED).unwrap();

        assert_eq!(decompress(&compressed).unwrap(), uncompressed);
        assert_eq!(compress(&uncompressed).unwrap(), compressed);
        assert_eq!(compress(&compress(&uncompressed).unwrap()).unwrap(), compressed);
        assert_eq!(decompress(&decompress(&compressed).unwrap()).unwrap(), uncompressed);
    }

    #[test]
    fn test_invalid_public_keys() {
        assert!(PublicKey::from_bytes(&[0x02; 32]).is_err());

        // x = 0 is not on the curve
        let mut bogus = vec![0x02];
        bogus.extend_from_slice(&[0u8; 32]);
        assert!(PublicKey::from_bytes(&bogus).is_err());
    }

    #[test]
    fn test_invalid_private_keys() {
        assert!(PrivateKey::from_bytes(&[0u8; 32]).is_err());
        assert!(PrivateKey::from_bytes(&[1u8; 31]).is_err());
        assert!(PrivateKey::from_hex("zz").is_err());
    }

    #[test]
    fn test_diffie_hellman() {
        let alice = PrivateKey::generate();
        let bob = PrivateKey::generate();

        let alice_shared = alice.diffie_hellman(&bob.public_key());
        let bob_shared = bob.diffie_hellman(&alice.public_key());

        assert_eq!(*alice_shared, *bob_shared);
    }

    #[test]
    fn test_public_key_serialization() {
        let public = PrivateKey::generate().public_key();

        let json = serde_json::to_string(&public).unwrap();
        let restored: PublicKey = serde_json::from_str(&json).unwrap();

        assert_eq!(public, restored);
        assert_eq!(json, format!("\"{}\"", public.to_hex()));
    }

    #[test]
    fn test_private_key_debug_hides_secret() {
        let key = PrivateKey::from_hex(SOFIA_PRIVATE).unwrap();
        let debug = format!("{:?}", key);

        assert!(!debug.to_lowercase().contains(&SOFIA_PRIVATE.to_lowercase()));
        assert!(debug.contains(SOFIA_COMPRESSED));
    }
}
