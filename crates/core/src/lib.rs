//! Core domain types and shared logic for chanstore.
//!
//! This crate defines the data model of the chunked transfer layer:
//! - Content hashes identifying whole files
//! - Fixed-size chunking
//! - Transport tags carried in captions and filenames
//! - Reassembly with size and hash verification
//! - Configuration shared by the server and CLI
//!
//! Nothing here performs I/O.

pub mod chunk;
pub mod config;
pub mod error;
pub mod hash;
pub mod reassemble;
pub mod tag;

pub use chunk::{Chunk, ChunkSet, checked_chunk_count, expected_chunk_count, split};
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use reassemble::{Verification, reassemble};
pub use tag::ChunkTag;

/// Default chunk size: 10 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum chunk size: 25 MiB, the largest attachment most channels accept.
pub const MAX_CHUNK_SIZE: u64 = 25 * 1024 * 1024;
