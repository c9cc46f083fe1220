//! # mnema
//!
//! A content-addressable store with a triple-based knowledge base.
//!
//! Data is named by a self-describing hash of its bytes rather than by a
//! caller-assigned name: storing the same payload twice always yields the
//! same identifier and one stored copy. A companion knowledge base records
//! immutable (subject, property, value) facts about stored content, each
//! fact itself content-addressed.
//!
//! ## Core Concepts
//!
//! - **Digest**: an algorithm-tagged hash in multihash encoding
//! - **CID**: the base-58 text form of a digest, the only external name
//! - **Blob store**: a sharded file tree with per-shard inline tables
//! - **Triple**: an immutable fact keyed by the hash of its serialization
//!
//! ## Example
//!
//! ```ignore
//! use mnema::DataService;
//!
//! let service = DataService::open("/var/lib/mnema")?;
//! let (cid, is_new) = service.know(b"hello")?;
//! assert_eq!(service.recall(&cid)?, b"hello");
//! ```

pub mod extract;
pub mod ingest;
pub mod knowledge;
pub mod model;
pub mod sniff;
pub mod store;

mod error;
mod service;

pub use error::{Error, Result};
pub use extract::ExtractReport;
pub use ingest::IngestReport;
pub use knowledge::{KnowledgeBase, Triple};
pub use model::{Cid, Digest, HashAlgorithm, Hasher};
pub use service::{DataService, KNOWLEDGE_FILE};
pub use sniff::ContentKind;
pub use store::{BlobStore, ObjectReader};
