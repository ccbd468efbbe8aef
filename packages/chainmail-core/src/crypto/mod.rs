//! # Cryptography Module
//!
//! Key handling, envelope encryption and passphrase key derivation.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  keys        secp256k1 PrivateKey / PublicKey, SEC1 (de)compress │   │
//! │  └──────────────────────────────┬──────────────────────────────────┘   │
//! │                                 │                                       │
//! │                                 ▼                                       │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  encryption  ephemeral ECDH → SHA-512 → AES-256-CBC + HMAC       │   │
//! │  │              used twice per message:                             │   │
//! │  │                • location envelope (anchored on-chain)           │   │
//! │  │                • content envelope  (stored off-chain)            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  kdf         scrypt passphrase → key, persistable parameters     │   │
//! │  │              (keystore only, never on a hot path)                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose |
//! |-----------|---------|
//! | secp256k1 ECDH | Key agreement with the recipient's chain key |
//! | SHA-512 | Splits the shared secret into encryption and MAC keys |
//! | AES-256-CBC + PKCS#7 | Envelope confidentiality |
//! | HMAC-SHA256 | Envelope integrity, verified in constant time |
//! | scrypt | Passphrase stretching for keys at rest |
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: Secret scalars, shared secrets, derived keys and
//!    passphrases are zeroized when dropped
//! 2. **MAC Before Decrypt**: Ciphertext is never decrypted unless its MAC
//!    verifies
//! 3. **Secure Random**: `rand::rngs::OsRng` for ephemeral keys, IVs and salts

mod encryption;
mod kdf;
mod keys;

pub use encryption::{
    decrypt, encrypt, EncryptedEnvelope, SharedSecret, BLOCK_SIZE, CIPHER_ID, IV_SIZE, MAC_SIZE,
};
pub use kdf::{
    derive_key, DeriveOpts, DerivedKey, ScryptParams, DEFAULT_LEN, DEFAULT_N, DEFAULT_P,
    DEFAULT_R, KDF_SCRYPT, SALT_SIZE,
};
pub use keys::{
    compress, decompress, PrivateKey, PublicKey, COMPRESSED_PUBLIC_KEY_SIZE, PRIVATE_KEY_SIZE,
    UNCOMPRESSED_PUBLIC_KEY_SIZE,
};

pub(crate) use kdf::hex_vec;
