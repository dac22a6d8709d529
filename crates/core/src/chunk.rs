//! Chunk types and fixed-size splitting.

use crate::hash::ContentHash;
use bytes::Bytes;
use std::collections::BTreeSet;
use std::fmt;

/// A chunk with its data.
///
/// Sequences start at 1. Only the final chunk of a file may be shorter than
/// the chunk size it was split with.
#[derive(Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the file (1-based).
    pub sequence: u32,
    /// The chunk data.
    pub data: Bytes,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(sequence: u32, data: Bytes) -> Self {
        Self { sequence, data }
    }

    /// Get the chunk size.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("sequence", &self.sequence)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Most gaps listed in an [`crate::Error::IncompleteSet`].
pub const MAX_REPORTED_MISSING: usize = 16;

/// Calculate the number of chunks a buffer of `size` bytes splits into.
pub fn expected_chunk_count(size: u64, chunk_size: u64) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size) as usize
}

/// Chunk count for `size` bytes, rejecting counts a `u32` sequence cannot number.
pub fn checked_chunk_count(size: u64, chunk_size: u64) -> crate::Result<u32> {
    if chunk_size == 0 {
        return Err(crate::Error::InvalidChunkSize(chunk_size));
    }
    let count = size.div_ceil(chunk_size);
    u32::try_from(count).map_err(|_| crate::Error::TooManyChunks { count })
}

/// Split data into chunks of the given size.
///
/// The chunks partition `data` in order: chunk `n` covers bytes
/// `[(n-1)*chunk_size, min(n*chunk_size, len))`. Empty input yields no chunks.
/// Slicing is zero-copy.
pub fn split(data: &Bytes, chunk_size: u64) -> crate::Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(crate::Error::InvalidChunkSize(chunk_size));
    }
    let count = checked_chunk_count(data.len() as u64, chunk_size)?;
    let step = usize::try_from(chunk_size).unwrap_or(usize::MAX);

    let mut chunks = Vec::with_capacity(count as usize);
    let mut offset = 0usize;
    for sequence in 1..=count {
        let end = offset.saturating_add(step).min(data.len());
        chunks.push(Chunk::new(sequence, data.slice(offset..end)));
        offset = end;
    }
    Ok(chunks)
}

/// All chunks belonging to one content hash.
///
/// Members are kept in whatever order they were added; ordering by sequence
/// happens only in [`crate::reassemble`].
#[derive(Clone, Debug)]
pub struct ChunkSet {
    hash: ContentHash,
    chunks: Vec<Chunk>,
}

impl ChunkSet {
    /// Create a chunk set from already tagged chunks.
    pub fn new(hash: ContentHash, chunks: Vec<Chunk>) -> Self {
        Self { hash, chunks }
    }

    /// Hash the whole buffer, then split it.
    ///
    /// The hash is taken before splitting so it does not depend on `chunk_size`.
    pub fn from_data(data: &Bytes, chunk_size: u64) -> crate::Result<Self> {
        let hash = ContentHash::compute(data);
        let chunks = split(data, chunk_size)?;
        Ok(Self { hash, chunks })
    }

    /// The content hash every member is tagged with.
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the set has no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Sum of all chunk sizes.
    pub fn total_size(&self) -> u64 {
        self.chunks.iter().map(Chunk::size).sum()
    }

    /// Consume the set, returning its members in insertion order.
    pub fn into_chunks(self) -> Vec<Chunk> {
        self.chunks
    }

    /// Check that sequences are exactly `1..=n`.
    ///
    /// `n` is `expected_count` when given, otherwise the highest sequence seen.
    pub fn validate_contiguous(&self, expected_count: Option<usize>) -> crate::Result<()> {
        let mut seen = BTreeSet::new();
        for chunk in &self.chunks {
            if chunk.sequence == 0 {
                return Err(crate::Error::InvalidTag(format!(
                    "chunk sequence must be positive in chunk set for {}",
                    self.hash
                )));
            }
            if !seen.insert(chunk.sequence) {
                return Err(crate::Error::DuplicateSequence {
                    hash: self.hash.to_hex(),
                    sequence: chunk.sequence,
                });
            }
        }
        check_contiguous(&self.hash, &seen, expected_count)
    }
}

/// Check a set of observed sequences against `1..=n`.
///
/// Sequences outside `1..=n` also fail the check. The error lists at most
/// [`MAX_REPORTED_MISSING`] gaps.
pub fn check_contiguous(
    hash: &ContentHash,
    sequences: &BTreeSet<u32>,
    expected_count: Option<usize>,
) -> crate::Result<()> {
    let count = match expected_count {
        Some(n) => u32::try_from(n).map_err(|_| crate::Error::TooManyChunks { count: n as u64 })?,
        None => sequences.last().copied().unwrap_or(0),
    };
    let in_range = if count == 0 {
        0
    } else {
        sequences.range(1..=count).count()
    };
    let missing_count = count as usize - in_range;
    if missing_count == 0 && in_range == sequences.len() {
        return Ok(());
    }

    let missing = (1..=count)
        .filter(|s| !sequences.contains(s))
        .take(MAX_REPORTED_MISSING)
        .collect();
    Err(crate::Error::IncompleteSet {
        hash: hash.to_hex(),
        found: sequences.len(),
        missing,
        missing_count,
    })
}
