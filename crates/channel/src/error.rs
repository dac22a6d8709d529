//! Channel and transfer error types.

use thiserror::Error;

/// Errors raised by a messaging backend.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("rate limited by backend (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: f64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("attachment not found: {0}")]
    AttachmentNotFound(String),

    #[error("session is closed")]
    SessionClosed,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for backend operations.
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;

/// One chunk send that did not complete.
#[derive(Debug)]
pub struct ChunkFailure {
    /// Sequence of the chunk that failed.
    pub sequence: u32,
    /// The backend error.
    pub error: ChannelError,
}

/// Errors of an upload or retrieval call.
///
/// Every failure mode stays a distinct variant so callers can tell an
/// unusable credential from a missing file from corrupted bytes.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error(
        "upload of {hash} failed: {} of {total} chunk sends failed, {sent} chunks remain orphaned in the channel",
        .failures.len()
    )]
    Upload {
        hash: String,
        total: usize,
        sent: usize,
        failures: Vec<ChunkFailure>,
    },

    #[error("no chunks found for {hash} ({messages_scanned} messages scanned)")]
    NotFound { hash: String, messages_scanned: u64 },

    #[error(
        "incomplete chunk set for {hash}: found {found} chunks, {missing_count} missing (first: {missing:?})"
    )]
    IncompleteSet {
        hash: String,
        found: usize,
        missing: Vec<u32>,
        missing_count: usize,
    },

    #[error("download of chunk {sequence} failed: {source}")]
    Download {
        sequence: u32,
        #[source]
        source: ChannelError,
    },

    #[error("integrity check failed: {0}")]
    Integrity(chanstore_core::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(chanstore_core::Error),

    #[error("channel error: {0}")]
    Channel(ChannelError),
}

impl TransferError {
    /// Stable identifier for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication_error",
            Self::ChannelNotFound(_) => "channel_not_found",
            Self::Upload { .. } => "upload_error",
            Self::NotFound { .. } => "not_found",
            Self::IncompleteSet { .. } => "incomplete_set",
            Self::Download { .. } => "download_error",
            Self::Integrity(_) => "integrity_error",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Channel(_) => "channel_error",
        }
    }

    /// Sequences whose sends failed, for an upload error.
    pub fn failed_sequences(&self) -> Vec<u32> {
        match self {
            Self::Upload { failures, .. } => failures.iter().map(|f| f.sequence).collect(),
            _ => Vec::new(),
        }
    }
}

impl From<ChannelError> for TransferError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Authentication(msg) => Self::Authentication(msg),
            ChannelError::ChannelNotFound(msg) => Self::ChannelNotFound(msg),
            other => Self::Channel(other),
        }
    }
}

impl From<chanstore_core::Error> for TransferError {
    fn from(err: chanstore_core::Error) -> Self {
        match err {
            chanstore_core::Error::IncompleteSet {
                hash,
                found,
                missing,
                missing_count,
            } => Self::IncompleteSet {
                hash,
                found,
                missing,
                missing_count,
            },
            e @ (chanstore_core::Error::SizeMismatch { .. }
            | chanstore_core::Error::HashMismatch { .. }
            | chanstore_core::Error::DuplicateSequence { .. }) => Self::Integrity(e),
            e => Self::InvalidArgument(e),
        }
    }
}

/// Result type for transfer operations.
pub type TransferResult<T> = std::result::Result<T, TransferError>;
