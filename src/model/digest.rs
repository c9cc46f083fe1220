//! Tagged content digests and the streaming hasher that produces them
//!
//! A digest is stored in its self-describing multihash form:
//! one byte naming the algorithm, one byte for the digest length,
//! then the digest bytes. Equality is byte equality of the full
//! tagged encoding, so digests from different algorithms never
//! compare equal even if the raw hash bytes collided.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::fmt;

/// Hash functions a [`Digest`] may be produced by.
///
/// The wire codes are the registered multihash codes, so digests
/// written by other multihash implementations remain readable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA2-256, multihash code 0x12. The default.
    Sha2_256,
    /// BLAKE3, multihash code 0x1e.
    Blake3,
}

impl HashAlgorithm {
    /// The multihash algorithm code.
    pub fn code(&self) -> u8 {
        match self {
            HashAlgorithm::Sha2_256 => 0x12,
            HashAlgorithm::Blake3 => 0x1e,
        }
    }

    /// Resolve an algorithm from its multihash code.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0x12 => Ok(HashAlgorithm::Sha2_256),
            0x1e => Ok(HashAlgorithm::Blake3),
            other => Err(Error::UnknownAlgorithm(other)),
        }
    }

    /// Digest length in bytes (32 for both supported functions).
    pub fn digest_len(&self) -> usize {
        32
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Sha2_256
    }
}

/// An algorithm-tagged hash digest in multihash encoding:
/// `[code][len][digest bytes]`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(Vec<u8>);

impl Digest {
    /// Wrap raw multihash bytes, validating the tag and length.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::MalformedCid(format!(
                "multihash too short: {} bytes",
                bytes.len()
            )));
        }
        let algorithm = HashAlgorithm::from_code(bytes[0])?;
        let len = bytes[1] as usize;
        if len != algorithm.digest_len() || bytes.len() != 2 + len {
            return Err(Error::MalformedCid(format!(
                "multihash length mismatch: tagged {}, carrying {}",
                len,
                bytes.len().saturating_sub(2)
            )));
        }
        Ok(Digest(bytes))
    }

    /// Hash an in-memory payload in one call.
    pub fn of(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        let mut hasher = Hasher::new(algorithm);
        hasher.update(data);
        hasher.finalize()
    }

    /// The algorithm that produced this digest.
    pub fn algorithm(&self) -> HashAlgorithm {
        // Validated at construction.
        HashAlgorithm::from_code(self.0[0]).unwrap_or_default()
    }

    /// The raw digest bytes, without the tag.
    pub fn digest_bytes(&self) -> &[u8] {
        &self.0[2..]
    }

    /// The full tagged encoding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex rendering of the full tagged encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..10.min(self.0.len() * 2)])
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

enum HasherState {
    Sha2_256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

/// Incremental hasher producing a tagged [`Digest`].
///
/// Feed any number of `update` calls and then `finalize`. Chunk
/// boundaries never affect the result, so callers can stream
/// payloads larger than memory in bounded windows.
pub struct Hasher {
    algorithm: HashAlgorithm,
    state: HasherState,
}

impl Hasher {
    /// Create a hasher for the given algorithm.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha2_256 => HasherState::Sha2_256(sha2::Sha256::new()),
            HashAlgorithm::Blake3 => HasherState::Blake3(Box::new(blake3::Hasher::new())),
        };
        Hasher { algorithm, state }
    }

    /// Absorb a chunk of input.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha2_256(h) => {
                h.update(data);
            }
            HasherState::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Finish and produce the tagged digest.
    pub fn finalize(self) -> Digest {
        let raw: Vec<u8> = match self.state {
            HasherState::Sha2_256(h) => h.finalize().to_vec(),
            HasherState::Blake3(h) => h.finalize().as_bytes().to_vec(),
        };
        let mut bytes = Vec::with_capacity(2 + raw.len());
        bytes.push(self.algorithm.code());
        bytes.push(raw.len() as u8);
        bytes.extend(raw);
        Digest(bytes)
    }
}
