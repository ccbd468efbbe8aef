//! # Content Digests
//!
//! Self-describing digests: every serialized digest carries the algorithm
//! that produced it, so readers can verify content without a separate
//! format version.
//!
//! ## Encodings
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        DIGEST WIRE FORMATS                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Multihash (SHA3-256, SHA2-256, MurMur3-128)                           │
//! │  ┌──────────────┬──────────────┬──────────────────────────────┐        │
//! │  │ code varint  │ len varint   │ raw digest (len bytes)       │        │
//! │  └──────────────┴──────────────┴──────────────────────────────┘        │
//! │    0x16 sha3-256      0x20          32 bytes                           │
//! │    0x12 sha2-256      0x20          32 bytes                           │
//! │    0x22 murmur3-128   0x04           4 bytes                           │
//! │                                                                         │
//! │  CIDv1, raw codec, SHA2-256                                            │
//! │  ┌──────┬──────┬──────┬──────┬──────────────────────────────┐          │
//! │  │ 0x01 │ 0x55 │ 0x12 │ 0x20 │ SHA2-256 digest (32 bytes)   │          │
//! │  └──────┴──────┴──────┴──────┴──────────────────────────────┘          │
//! │  version  raw   sha2   len                                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Purposes
//!
//! | Kind | Used for |
//! |------|----------|
//! | MurMur3-128 | Storage keys of encrypted content (fast corruption check) |
//! | SHA3-256 | Message identity, anti-tamper check on decrypted bytes |
//! | CIDv1-SHA2-256-raw | Content-addressed stores that speak CIDs |
//!
//! The MurMur3 digest is the 32-bit MurMur3 value (seed 0) in little-endian
//! byte order, which is what already-stored messages were keyed with.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use sha2::Sha256;
use sha3::{Digest as _, Sha3_256};

use crate::error::{Error, Result, Stage, StageExt};

/// Multihash code for SHA2-256
pub const SHA2_256_CODE: u64 = 0x12;

/// Multihash code for SHA3-256
pub const SHA3_256_CODE: u64 = 0x16;

/// Multihash code for MurMur3-128
pub const MURMUR3_128_CODE: u64 = 0x22;

/// Fixed prefix of a CIDv1 (raw codec) wrapping a 32-byte SHA2-256 digest
pub const CID_V1_SHA2_256_RAW_PREFIX: [u8; 4] = [0x01, 0x55, 0x12, 0x20];

/// Digest kind for storage keys of encrypted content
pub const CONTENT_HASH_KIND: HashKind = HashKind::MurMur3_128;

/// Digest kind for message identity
pub const MESSAGE_HASH_KIND: HashKind = HashKind::Sha3_256;

/// Supported digest algorithms
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    /// SHA3-256 multihash
    Sha3_256,
    /// SHA2-256 multihash
    Sha2_256,
    /// MurMur3 multihash (non-cryptographic, 4-byte digest)
    MurMur3_128,
    /// CIDv1 with raw codec wrapping a SHA2-256 multihash
    CidV1Sha2_256Raw,
}

impl HashKind {
    /// Length in bytes of the raw digest
    pub fn digest_len(&self) -> usize {
        match self {
            HashKind::Sha3_256 | HashKind::Sha2_256 | HashKind::CidV1Sha2_256Raw => 32,
            HashKind::MurMur3_128 => 4,
        }
    }

    /// Multihash code, for kinds encoded as a plain multihash
    fn multihash_code(&self) -> Option<u64> {
        match self {
            HashKind::Sha3_256 => Some(SHA3_256_CODE),
            HashKind::Sha2_256 => Some(SHA2_256_CODE),
            HashKind::MurMur3_128 => Some(MURMUR3_128_CODE),
            HashKind::CidV1Sha2_256Raw => None,
        }
    }

    fn from_multihash_code(code: u64) -> Option<Self> {
        match code {
            SHA3_256_CODE => Some(HashKind::Sha3_256),
            SHA2_256_CODE => Some(HashKind::Sha2_256),
            MURMUR3_128_CODE => Some(HashKind::MurMur3_128),
            _ => None,
        }
    }

    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Sha3_256 => "sha3-256",
            HashKind::Sha2_256 => "sha2-256",
            HashKind::MurMur3_128 => "murmur3-128",
            HashKind::CidV1Sha2_256Raw => "cidv1-sha2-256-raw",
        }
    }

    /// Compute the raw digest of `data`
    fn raw_digest(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            HashKind::Sha3_256 => Ok(Sha3_256::digest(data).to_vec()),
            HashKind::Sha2_256 | HashKind::CidV1Sha2_256Raw => Ok(Sha256::digest(data).to_vec()),
            HashKind::MurMur3_128 => {
                let value = murmur3::murmur3_32(&mut Cursor::new(data), 0)
                    .map_err(|e| Error::InvalidDigest(format!("murmur3: {}", e)))?;
                Ok(value.to_le_bytes().to_vec())
            }
        }
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha3-256" => Ok(HashKind::Sha3_256),
            "sha2-256" => Ok(HashKind::Sha2_256),
            "murmur3-128" => Ok(HashKind::MurMur3_128),
            "cidv1-sha2-256-raw" => Ok(HashKind::CidV1Sha2_256Raw),
            _ => Err(Error::UnknownHashKind),
        }
    }
}

/// A self-describing digest: algorithm plus raw hash bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    kind: HashKind,
    digest: Vec<u8>,
}

impl Digest {
    /// Compute the digest of `data` under `kind`
    pub fn compute(kind: HashKind, data: &[u8]) -> Result<Self> {
        Ok(Self {
            kind,
            digest: kind.raw_digest(data)?,
        })
    }

    /// Build from an already computed raw digest
    pub fn from_raw(kind: HashKind, digest: Vec<u8>) -> Result<Self> {
        if digest.len() != kind.digest_len() {
            return Err(Error::InvalidDigest(format!(
                "{} digest must be {} bytes, got {}",
                kind,
                kind.digest_len(),
                digest.len()
            )));
        }
        Ok(Self { kind, digest })
    }

    /// The algorithm
    pub fn kind(&self) -> HashKind {
        self.kind
    }

    /// The raw hash bytes, without any prefix
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Serialize with its self-describing prefix
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.digest.len() + 4);
        match self.kind.multihash_code() {
            Some(code) => {
                let mut buf = unsigned_varint::encode::u64_buffer();
                out.extend_from_slice(unsigned_varint::encode::u64(code, &mut buf));
                let mut buf = unsigned_varint::encode::u64_buffer();
                out.extend_from_slice(unsigned_varint::encode::u64(
                    self.digest.len() as u64,
                    &mut buf,
                ));
            }
            None => out.extend_from_slice(&CID_V1_SHA2_256_RAW_PREFIX),
        }
        out.extend_from_slice(&self.digest);
        out
    }

    /// Parse a serialized digest
    ///
    /// Known multihash prefixes are tried first; anything else must be the
    /// supported CIDv1 encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if let Some(digest) = parse_multihash(bytes)? {
            return Ok(digest);
        }

        if bytes.len() > CID_V1_SHA2_256_RAW_PREFIX.len()
            && bytes[..CID_V1_SHA2_256_RAW_PREFIX.len()] == CID_V1_SHA2_256_RAW_PREFIX
        {
            return Self::from_raw(
                HashKind::CidV1Sha2_256Raw,
                bytes[CID_V1_SHA2_256_RAW_PREFIX.len()..].to_vec(),
            );
        }

        Err(Error::UnknownHashKind)
    }

    /// Hex encoding of the serialized form
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Try the multihash encodings of the known kinds
///
/// Returns `Ok(None)` when the prefix is not a known multihash code, so the
/// caller can fall back to CID parsing.
fn parse_multihash(bytes: &[u8]) -> Result<Option<Digest>> {
    let (code, rest) = match unsigned_varint::decode::u64(bytes) {
        Ok(decoded) => decoded,
        Err(_) => return Ok(None),
    };
    let kind = match HashKind::from_multihash_code(code) {
        Some(kind) => kind,
        None => return Ok(None),
    };
    let (len, digest) = unsigned_varint::decode::u64(rest)
        .map_err(|e| Error::InvalidDigest(format!("bad {} length: {}", kind, e)))?;
    if len as usize != digest.len() {
        return Err(Error::InvalidDigest(format!(
            "{} declares {} bytes but carries {}",
            kind,
            len,
            digest.len()
        )));
    }
    Digest::from_raw(kind, digest.to_vec()).map(Some)
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Compute the serialized digest of `data` under `kind`
pub fn create(kind: HashKind, data: &[u8]) -> Result<Vec<u8>> {
    Ok(Digest::compute(kind, data)?.to_bytes())
}

/// Classify a serialized digest, returning its kind and raw digest
pub fn parse(bytes: &[u8]) -> Result<(HashKind, Vec<u8>)> {
    let digest = Digest::from_bytes(bytes)?;
    Ok((digest.kind, digest.digest))
}

/// Unwrap the raw digest from a serialized digest of a known kind
pub fn get_digest(kind: HashKind, hash: &[u8]) -> Result<Vec<u8>> {
    let digest = Digest::from_bytes(hash)?;
    if digest.kind != kind {
        return Err(Error::InvalidDigest(format!(
            "expected a {} digest, found {}",
            kind, digest.kind
        )));
    }
    Ok(digest.digest)
}

/// Verify that `data` hashes to the serialized digest `hash`
///
/// The comparison is a plain equality check. Digests are public values, so
/// unlike the envelope MAC there is no timing side channel to protect.
pub fn compare_contents_to_hash(data: &[u8], hash: &[u8]) -> Result<()> {
    let expected = Digest::from_bytes(hash).stage(Stage::ParseHash)?;
    let actual = Digest::compute(expected.kind, data).stage(Stage::CreateHash)?;

    if actual.digest != expected.digest {
        return Err(Error::HashMismatch {
            expected: hex::encode(&expected.digest),
            actual: hex::encode(&actual.digest),
        });
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
