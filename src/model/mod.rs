//! Core data model: tagged digests and content identifiers

mod cid;
mod digest;

pub use cid::Cid;
pub use digest::{Digest, HashAlgorithm, Hasher};
