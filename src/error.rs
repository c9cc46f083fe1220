//! Error types for mnema

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mnema operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mnema operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("knowledge base error: {0}")]
    Knowledge(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed content identifier: {0}")]
    MalformedCid(String),

    #[error("unknown hash algorithm code: {0:#04x}")]
    UnknownAlgorithm(u8),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("input stream cannot be rewound for a second pass")]
    NonSeekableInput,

    #[error("not an archive of a known type: {0}")]
    UnsupportedArchive(String),

    #[error("extraction tool failed: {0}")]
    Extraction(String),
}
