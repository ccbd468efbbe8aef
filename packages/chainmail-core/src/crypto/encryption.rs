//! # Hybrid Envelope Encryption
//!
//! ECIES-style public-key encryption: an ephemeral secp256k1 key agrees a
//! secret with the recipient's static key, and that secret keys AES-256-CBC
//! plus an HMAC-SHA256 over everything the recipient needs to decrypt.
//!
//! ## Encryption Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ENVELOPE ENCRYPTION FLOW                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Step 1: Ephemeral Key Agreement                                       │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  Fresh ephemeral private key                                 │       │
//! │  │           ×                                                  │       │
//! │  │  Recipient's static public key                               │       │
//! │  │           ↓                                                  │       │
//! │  │  x-coordinate, leading zero bytes stripped                   │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Step 2: Key Expansion                                                 │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  SHA-512(shared_secret)                                      │       │
//! │  │     bytes  0..32 → AES-256 key                               │       │
//! │  │     bytes 32..64 → HMAC-SHA256 key                           │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Step 3: Encrypt                                                       │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  AES-256-CBC(key, random 16-byte IV, PKCS#7(plaintext))      │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Step 4: Authenticate                                                  │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  HMAC-SHA256(mac_key, IV ‖ ephemeral_pub(65) ‖ ciphertext)   │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Decryption recomputes the same secret from the recipient's private key
//! and the envelope's ephemeral key, checks the MAC in constant time, and
//! only then touches the ciphertext.
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────┬──────────┬─────────────────────┬──────────────────┬──────────┐
//! │ 0x2e │ IV (16)  │ ephemeral pub (65)  │ ciphertext (16n) │ MAC (32) │
//! └──────┴──────────┴─────────────────────┴──────────────────┴──────────┘
//! ```
//!
//! No sender identity is carried. Authenticity of who sent an envelope comes
//! from the transaction signature, not from this layer.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest as _, Sha256, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::keys::{PrivateKey, PublicKey, UNCOMPRESSED_PUBLIC_KEY_SIZE};
use crate::error::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Identifier byte for AES-256-CBC + HMAC-SHA256 envelopes
pub const CIPHER_ID: u8 = 0x2e;

/// Size of the CBC initialization vector in bytes
pub const IV_SIZE: usize = 16;

/// Size of the HMAC-SHA256 tag in bytes
pub const MAC_SIZE: usize = 32;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Size of each expanded key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Smallest valid serialized envelope: one ciphertext block
const MIN_ENVELOPE_SIZE: usize = 1 + IV_SIZE + UNCOMPRESSED_PUBLIC_KEY_SIZE + BLOCK_SIZE + MAC_SIZE;

/// A shared secret derived from secp256k1 ECDH
///
/// Holds the x-coordinate as a minimal big-endian integer, so a coordinate
/// with leading zero bytes hashes shorter than 32 bytes.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: Vec<u8>,
}

impl SharedSecret {
    /// Agree a secret between `private_key` and `public_key`
    pub fn derive(private_key: &PrivateKey, public_key: &PublicKey) -> Self {
        let x = private_key.diffie_hellman(public_key);
        Self::from_x_coordinate(x.as_slice())
    }

    fn from_x_coordinate(x: &[u8]) -> Self {
        let start = x.iter().position(|b| *b != 0).unwrap_or(x.len());
        Self {
            bytes: x[start..].to_vec(),
        }
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Expand into the encryption and MAC keys
    fn expand(&self) -> EnvelopeKeys {
        let hash = Sha512::digest(&self.bytes);
        let mut keys = EnvelopeKeys {
            encryption: [0u8; KEY_SIZE],
            mac: [0u8; KEY_SIZE],
        };
        keys.encryption.copy_from_slice(&hash[..KEY_SIZE]);
        keys.mac.copy_from_slice(&hash[KEY_SIZE..]);
        keys
    }
}

/// Symmetric keys expanded from a shared secret
#[derive(Zeroize, ZeroizeOnDrop)]
struct EnvelopeKeys {
    encryption: [u8; KEY_SIZE],
    mac: [u8; KEY_SIZE],
}

impl EnvelopeKeys {
    fn mac(&self, iv: &[u8; IV_SIZE], ephemeral: &[u8], ciphertext: &[u8]) -> Result<HmacSha256> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.mac)
            .map_err(|e| Error::EncryptionFailed(format!("Invalid MAC key: {}", e)))?;
        mac.update(iv);
        mac.update(ephemeral);
        mac.update(ciphertext);
        Ok(mac)
    }
}

/// Output of envelope encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    iv: [u8; IV_SIZE],
    ephemeral_public_key: PublicKey,
    ciphertext: Vec<u8>,
    mac: [u8; MAC_SIZE],
}

impl EncryptedEnvelope {
    /// The CBC initialization vector
    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    /// The sender's one-time public key
    pub fn ephemeral_public_key(&self) -> &PublicKey {
        &self.ephemeral_public_key
    }

    /// The padded AES-CBC ciphertext
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// The HMAC-SHA256 tag
    pub fn mac(&self) -> &[u8; MAC_SIZE] {
        &self.mac
    }

    /// Serialize to the envelope wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        let ephemeral = self.ephemeral_public_key.to_uncompressed();
        let mut out =
            Vec::with_capacity(1 + IV_SIZE + ephemeral.len() + self.ciphertext.len() + MAC_SIZE);
        out.push(CIPHER_ID);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&ephemeral);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.mac);
        out
    }

    /// Parse the envelope wire format
    ///
    /// Only structure is checked here. The MAC is checked by [`decrypt`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_ENVELOPE_SIZE {
            return Err(Error::MalformedEnvelope(format!(
                "envelope too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != CIPHER_ID {
            return Err(Error::MalformedEnvelope(format!(
                "unsupported cipher id 0x{:02x}",
                bytes[0]
            )));
        }

        let body = &bytes[1..];
        let (iv_bytes, rest) = body.split_at(IV_SIZE);
        let (ephemeral, rest) = rest.split_at(UNCOMPRESSED_PUBLIC_KEY_SIZE);
        let (ciphertext, mac_bytes) = rest.split_at(rest.len() - MAC_SIZE);

        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(Error::MalformedEnvelope(format!(
                "ciphertext length {} is not a positive multiple of {}",
                ciphertext.len(),
                BLOCK_SIZE
            )));
        }

        let ephemeral_public_key = PublicKey::from_bytes(ephemeral)
            .map_err(|e| Error::MalformedEnvelope(format!("bad ephemeral key: {}", e)))?;

        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(iv_bytes);
        let mut mac = [0u8; MAC_SIZE];
        mac.copy_from_slice(mac_bytes);

        Ok(Self {
            iv,
            ephemeral_public_key,
            ciphertext: ciphertext.to_vec(),
            mac,
        })
    }
}

/// Encrypt `plaintext` so only the holder of `recipient`'s private key can read it
///
/// A fresh ephemeral key and IV are drawn from the OS RNG for every call.
pub fn encrypt(recipient: &PublicKey, plaintext: &[u8]) -> Result<EncryptedEnvelope> {
    let ephemeral = PrivateKey::generate();
    let mut iv = [0u8; IV_SIZE];
    rand::rngs::OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|_| Error::RngFailed)?;

    encrypt_with(&ephemeral, iv, recipient, plaintext)
}

/// Encrypt with a caller-chosen ephemeral key and IV
///
/// Reusing either across envelopes breaks confidentiality. Exposed in-crate
/// for reproducible vectors only.
pub(crate) fn encrypt_with(
    ephemeral: &PrivateKey,
    iv: [u8; IV_SIZE],
    recipient: &PublicKey,
    plaintext: &[u8],
) -> Result<EncryptedEnvelope> {
    let keys = SharedSecret::derive(ephemeral, recipient).expand();
    let ephemeral_public_key = ephemeral.public_key();

    let ciphertext = Aes256CbcEnc::new_from_slices(&keys.encryption, &iv)
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let tag = keys
        .mac(&iv, &ephemeral_public_key.to_uncompressed(), &ciphertext)?
        .finalize()
        .into_bytes();
    let mut mac = [0u8; MAC_SIZE];
    mac.copy_from_slice(&tag);

    Ok(EncryptedEnvelope {
        iv,
        ephemeral_public_key,
        ciphertext,
        mac,
    })
}

/// Decrypt an envelope addressed to `private_key`
///
/// ## Errors
///
/// - `InvalidMac` if the envelope was altered or is for another key.
///   Nothing is decrypted in that case.
/// - `DecryptionFailed` if the MAC verifies but the padding is invalid
pub fn decrypt(private_key: &PrivateKey, envelope: &EncryptedEnvelope) -> Result<Vec<u8>> {
    let keys = SharedSecret::derive(private_key, &envelope.ephemeral_public_key).expand();

    keys.mac(
        &envelope.iv,
        &envelope.ephemeral_public_key.to_uncompressed(),
        &envelope.ciphertext,
    )?
    .verify_slice(&envelope.mac)
    .map_err(|_| Error::InvalidMac)?;

    Aes256CbcDec::new_from_slices(&keys.encryption, &envelope.iv)
        .map_err(|e| Error::DecryptionFailed(format!("Invalid key: {}", e)))?
        .decrypt_padded_vec_mut::<Pkcs7>(&envelope.ciphertext)
        .map_err(|_| Error::DecryptionFailed("invalid padding".into()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPIENT_PRIVATE: &str =
        "01901E63389EF02EAA7C5782E08B40D98FAEF835F28BD144EECF5614A415943F";
    const LONG_MESSAGE: &[u8] =
        b"Hi Tim, this is a much longer message to make sure there are no problems";

    fn flip_each_byte(envelope: &EncryptedEnvelope, recipient: &PrivateKey) {
        let bytes = envelope.to_bytes();
        // skip the cipher id and the ephemeral key, which fail earlier as malformed
        let ephemeral_range = 1 + IV_SIZE..1 + IV_SIZE + UNCOMPRESSED_PUBLIC_KEY_SIZE;
        for i in 1..bytes.len() {
            if ephemeral_range.contains(&i) {
                continue;
            }
            let mut tampered = bytes.clone();
            tampered[i] ^= 0x01;
            let parsed = EncryptedEnvelope::from_bytes(&tampered).unwrap();
            let err = decrypt(recipient, &parsed).unwrap_err();
            assert!(matches!(err, Error::InvalidMac), "byte {} gave {:?}", i, err);
        }
    }

    #[test]
    fn test_known_vector() {
        let ephemeral = PrivateKey::from_bytes(&[0x04; 32]).unwrap();
        let recipient = PrivateKey::from_hex(RECIPIENT_PRIVATE).unwrap();

        let envelope =
            encrypt_with(&ephemeral, [0x05; 16], &recipient.public_key(), LONG_MESSAGE).unwrap();

        assert_eq!(
            hex::encode(envelope.ciphertext()),
            "2ec66aac453ff543f47830d4b8cbc68d9965bf7c6bb69724fd4de26d41001256dfa6f7f0b3956ce21d4717caf75b0c2ad753852f216df6cfbcda4911619c5fc34798a19f81adff902c1ad906ab0edaec"
        );
        assert_eq!(
            hex::encode(envelope.mac()),
            "4367ae8a54b65f99e4f2fd315ba65bf85e1138967a7bea451faf80f75cdf3404"
        );
        assert_eq!(
            hex::encode(envelope.ephemeral_public_key().to_uncompressed()),
            "04462779ad4aad39514614751a71085f2f10e1c7a593e4e030efb5b8721ce55b0b199c07969f5442000bea455d72ae826a86bfac9089cb18152ed756ebb2a596f5"
        );

        let decrypted = decrypt(&recipient, &envelope).unwrap();
        assert_eq!(decrypted, LONG_MESSAGE);
    }

    #[test]
    fn test_known_shared_secret() {
        let ephemeral = PrivateKey::from_bytes(&[0x04; 32]).unwrap();
        let recipient = PrivateKey::from_hex(RECIPIENT_PRIVATE).unwrap();

        let sender_side = SharedSecret::derive(&ephemeral, &recipient.public_key());
        let recipient_side = SharedSecret::derive(&recipient, &ephemeral.public_key());

        assert_eq!(
            hex::encode(sender_side.as_bytes()),
            "04695325aac70f9f9ebe676248ebbfefa87b3eff16117559d2a0953d0e695be6"
        );
        assert_eq!(sender_side.as_bytes(), recipient_side.as_bytes());
    }

    #[test]
    fn test_shared_secret_strips_leading_zeros() {
        let secret = SharedSecret::from_x_coordinate(&[0x00, 0x00, 0x7f, 0x00, 0x01]);
        assert_eq!(secret.as_bytes(), &[0x7f, 0x00, 0x01]);

        let secret = SharedSecret::from_x_coordinate(&[0x01, 0x00]);
        assert_eq!(secret.as_bytes(), &[0x01, 0x00]);
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let recipient = PrivateKey::generate();

        let cases: [&[u8]; 5] = [b"", b"a", &[0x42; 16], &[0x17; 1000], LONG_MESSAGE];
        for plaintext in cases {
            let envelope = encrypt(&recipient.public_key(), plaintext).unwrap();
            let parsed = EncryptedEnvelope::from_bytes(&envelope.to_bytes()).unwrap();

            assert_eq!(parsed, envelope);
            assert_eq!(parsed.ciphertext().len() % BLOCK_SIZE, 0);
            assert_eq!(decrypt(&recipient, &parsed).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_fresh_ephemeral_key_per_envelope() {
        let recipient = PrivateKey::generate().public_key();

        let e1 = encrypt(&recipient, b"same").unwrap();
        let e2 = encrypt(&recipient, b"same").unwrap();

        assert_ne!(e1.ephemeral_public_key(), e2.ephemeral_public_key());
        assert_ne!(e1.ciphertext(), e2.ciphertext());
    }

    #[test]
    fn test_tampered_envelope_fails_mac() {
        let recipient = PrivateKey::generate();
        let envelope = encrypt(&recipient.public_key(), LONG_MESSAGE).unwrap();

        flip_each_byte(&envelope, &recipient);
    }

    #[test]
    fn test_wrong_recipient_fails_mac() {
        let recipient = PrivateKey::generate();
        let other = PrivateKey::generate();
        let envelope = encrypt(&recipient.public_key(), b"for recipient only").unwrap();

        let err = decrypt(&other, &envelope).unwrap_err();
        assert!(matches!(err, Error::InvalidMac));
    }

    #[test]
    fn test_swapped_ephemeral_key_fails_mac() {
        let recipient = PrivateKey::generate();
        let mut envelope = encrypt(&recipient.public_key(), b"hello").unwrap();
        envelope.ephemeral_public_key = PrivateKey::generate().public_key();

        assert!(matches!(decrypt(&recipient, &envelope), Err(Error::InvalidMac)));
    }

    #[test]
    fn test_authentic_envelope_with_bad_padding() {
        use aes::cipher::block_padding::NoPadding;

        let recipient = PrivateKey::generate();
        let ephemeral = PrivateKey::generate();
        let iv = [7u8; IV_SIZE];
        let keys = SharedSecret::derive(&ephemeral, &recipient.public_key()).expand();

        // a zero block decrypts to a final pad byte of 0
        let ciphertext = Aes256CbcEnc::new_from_slices(&keys.encryption, &iv)
            .unwrap()
            .encrypt_padded_vec_mut::<NoPadding>(&[0u8; BLOCK_SIZE]);
        let ephemeral_public_key = ephemeral.public_key();
        let tag = keys
            .mac(&iv, &ephemeral_public_key.to_uncompressed(), &ciphertext)
            .unwrap()
            .finalize()
            .into_bytes();
        let mut mac = [0u8; MAC_SIZE];
        mac.copy_from_slice(&tag);

        let envelope = EncryptedEnvelope {
            iv,
            ephemeral_public_key,
            ciphertext,
            mac,
        };
        let err = decrypt(&recipient, &envelope).unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed(_)), "got {:?}", err);
    }

    #[test]
    fn test_malformed_envelopes() {
        let recipient = PrivateKey::generate();
        let bytes = encrypt(&recipient.public_key(), b"hello").unwrap().to_bytes();

        // wrong cipher id
        let mut wrong_id = bytes.clone();
        wrong_id[0] = 0x2f;
        assert!(matches!(
            EncryptedEnvelope::from_bytes(&wrong_id),
            Err(Error::MalformedEnvelope(_))
        ));

        // truncated below one block of ciphertext
        assert!(matches!(
            EncryptedEnvelope::from_bytes(&bytes[..MIN_ENVELOPE_SIZE - 1]),
            Err(Error::MalformedEnvelope(_))
        ));

        // ciphertext not block aligned
        let mut misaligned = bytes.clone();
        misaligned.insert(1 + IV_SIZE + UNCOMPRESSED_PUBLIC_KEY_SIZE, 0xaa);
        assert!(matches!(
            EncryptedEnvelope::from_bytes(&misaligned),
            Err(Error::MalformedEnvelope(_))
        ));

        // ephemeral key not on the curve
        let mut bad_key = bytes.clone();
        for b in &mut bad_key[1 + IV_SIZE + 1..1 + IV_SIZE + UNCOMPRESSED_PUBLIC_KEY_SIZE] {
            *b = 0;
        }
        assert!(matches!(
            EncryptedEnvelope::from_bytes(&bad_key),
            Err(Error::MalformedEnvelope(_))
        ));
    }
}
