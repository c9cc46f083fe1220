//! Content-addressed blob storage
//!
//! This module implements the on-disk layout: a sharded directory tree of
//! file-backed objects with one small-object table per shard directory.

mod blob_store;
mod shard;

pub use blob_store::{BlobStore, CidIter, ObjectReader, DEFAULT_INLINE_LIMIT, DEFAULT_LEVELS};
pub use shard::{shard_rel_path, ShardTable, OBJECT_EXT, TABLE_FILE};
