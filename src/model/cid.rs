//! Printable content identifiers
//!
//! A CID is the base-58 rendering (bitcoin alphabet, no padding) of a
//! digest's multihash bytes. It is the only externally visible name for
//! stored data and is stable across processes and machines for a given
//! payload and algorithm.

use crate::model::Digest;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A content identifier: base-58 text encoding of a [`Digest`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cid(String);

impl Cid {
    /// Encode a digest. Total and deterministic; distinct digests
    /// produce distinct identifiers.
    pub fn from_digest(digest: &Digest) -> Self {
        Cid(bs58::encode(digest.as_bytes()).into_string())
    }

    /// Decode back to the tagged digest.
    ///
    /// Fails with [`Error::MalformedCid`] on characters outside the
    /// base-58 alphabet or on payloads that are not a valid multihash.
    pub fn digest(&self) -> Result<Digest> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| Error::MalformedCid(format!("{}: {}", self.0, e)))?;
        Digest::from_bytes(bytes)
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.0)
    }
}

impl FromStr for Cid {
    type Err = Error;

    /// Parse and validate an identifier string.
    fn from_str(s: &str) -> Result<Self> {
        let cid = Cid(s.to_string());
        cid.digest()?;
        Ok(cid)
    }
}

impl AsRef<str> for Cid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HashAlgorithm;

    #[test]
    fn test_roundtrip() {
        let d = Digest::of(HashAlgorithm::Sha2_256, b"roundtrip me");
        let cid = Cid::from_digest(&d);
        assert_eq!(cid.digest().unwrap(), d);
    }

    #[test]
    fn test_same_payload_same_cid() {
        let a = Cid::from_digest(&Digest::of(HashAlgorithm::Sha2_256, b"dedup"));
        let b = Cid::from_digest(&Digest::of(HashAlgorithm::Sha2_256, b"dedup"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_non_alphabet_characters() {
        // '0', 'O', 'I' and 'l' are excluded from base-58
        for bad in ["0cafe", "O0O0", "has a space", "под"] {
            assert!(bad.parse::<Cid>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let d = Digest::of(HashAlgorithm::Sha2_256, b"x");
        let full = Cid::from_digest(&d);
        let truncated = &full.as_str()[..full.as_str().len() - 4];
        assert!(truncated.parse::<Cid>().is_err());
    }

    #[test]
    fn test_parse_accepts_valid() {
        let d = Digest::of(HashAlgorithm::Blake3, b"valid");
        let cid = Cid::from_digest(&d);
        let parsed: Cid = cid.as_str().parse().unwrap();
        assert_eq!(parsed, cid);
        assert_eq!(parsed.digest().unwrap(), d);
    }
}
