//! Reassembly of located chunks into the original bytes.

use crate::chunk::{Chunk, ChunkSet};
use crate::hash::ContentHash;
use bytes::{Bytes, BytesMut};

/// Checks applied to reassembled bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verification {
    /// Total size the caller expects, if known.
    pub expected_size: Option<u64>,
    /// Recompute the content hash and compare it to the chunk set's hash.
    pub verify_hash: bool,
}

impl Default for Verification {
    fn default() -> Self {
        Self {
            expected_size: None,
            verify_hash: true,
        }
    }
}

impl Verification {
    /// Size-only checking, as done by older clients.
    pub fn size_only(expected_size: u64) -> Self {
        Self {
            expected_size: Some(expected_size),
            verify_hash: false,
        }
    }

    /// Set the expected size.
    pub fn with_expected_size(mut self, expected_size: Option<u64>) -> Self {
        self.expected_size = expected_size;
        self
    }

    /// Enable or disable the hash recheck.
    pub fn with_hash_check(mut self, verify_hash: bool) -> Self {
        self.verify_hash = verify_hash;
        self
    }
}

/// Order chunks by sequence and concatenate them.
///
/// Arrival order is irrelevant. The set must hold exactly sequences `1..=n`;
/// a gap or duplicate fails before any bytes are joined. Nothing is returned
/// unless every requested check passes.
pub fn reassemble(set: ChunkSet, verification: &Verification) -> crate::Result<Bytes> {
    set.validate_contiguous(None)?;

    let expected_hash = *set.hash();
    let total = set.total_size();
    let mut chunks: Vec<Chunk> = set.into_chunks();
    chunks.sort_unstable_by_key(|chunk| chunk.sequence);

    if let Some(expected) = verification.expected_size
        && expected != total
    {
        return Err(crate::Error::SizeMismatch {
            expected,
            actual: total,
        });
    }

    let mut out = BytesMut::with_capacity(total as usize);
    for chunk in &chunks {
        out.extend_from_slice(&chunk.data);
    }
    let out = out.freeze();

    if verification.verify_hash {
        let actual = ContentHash::compute(&out);
        if actual != expected_hash {
            return Err(crate::Error::HashMismatch {
                expected: expected_hash.to_hex(),
                actual: actual.to_hex(),
            });
        }
    }

    tracing::debug!(
        hash = %expected_hash,
        chunks = chunks.len(),
        bytes = out.len(),
        "reassembled chunk set"
    );
    Ok(out)
}
