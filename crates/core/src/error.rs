//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid chunk size: {0} (must be greater than zero)")]
    InvalidChunkSize(u64),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid tag: {0}")]
    InvalidTag(String),

    /// `missing` lists at most the first few gaps; `missing_count` is the total.
    #[error(
        "incomplete chunk set for {hash}: found {found} chunks, {missing_count} missing (first: {missing:?})"
    )]
    IncompleteSet {
        hash: String,
        found: usize,
        missing: Vec<u32>,
        missing_count: usize,
    },

    #[error("too many chunks: {count} exceeds the maximum of {max}", max = u32::MAX)]
    TooManyChunks { count: u64 },

    #[error("duplicate chunk sequence {sequence} in chunk set for {hash}")]
    DuplicateSequence { hash: String, sequence: u32 },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error means the reassembled bytes disagree with what was expected.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::SizeMismatch { .. } | Self::HashMismatch { .. })
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
