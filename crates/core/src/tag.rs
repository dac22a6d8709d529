//! Transport tags.
//!
//! A chunk carries its (content hash, sequence) pair in the two free-text
//! fields every channel message has: the caption holds the hash, the
//! attachment filename holds the sequence. Channels are shared with other
//! traffic, so decoding must reject anything that is not exactly a tag.

use crate::hash::ContentHash;
use std::fmt;

/// Prefix written in front of the hex hash in every chunk caption.
pub const CAPTION_PREFIX: &str = "File Hash: ";

/// Markdown-bold form of the caption prefix, still accepted when decoding.
const BOLD_CAPTION_PREFIX: &str = "**File Hash:** ";

/// Prefix of every chunk attachment filename.
pub const FILENAME_PREFIX: &str = "chunk-";

/// Default extension for chunk attachment filenames.
pub const DEFAULT_CHUNK_EXTENSION: &str = "bin";

/// The (content hash, sequence) pair identifying one chunk in a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkTag {
    /// Hash of the whole file the chunk belongs to.
    pub hash: ContentHash,
    /// 1-based position of the chunk.
    pub sequence: u32,
}

impl ChunkTag {
    /// Create a new tag.
    pub fn new(hash: ContentHash, sequence: u32) -> Self {
        Self { hash, sequence }
    }

    /// Caption text for this tag.
    pub fn caption(&self) -> String {
        encode_caption(&self.hash)
    }

    /// Attachment filename for this tag.
    pub fn filename(&self, extension: &str) -> String {
        encode_filename(self.sequence, extension)
    }

    /// Decode a tag from a message caption and attachment filename.
    pub fn decode(caption: &str, filename: &str) -> crate::Result<Self> {
        Ok(Self {
            hash: decode_caption(caption)?,
            sequence: decode_filename(filename)?,
        })
    }
}

impl fmt::Display for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.hash, self.sequence)
    }
}

/// Encode a caption: `File Hash: <hex>`.
pub fn encode_caption(hash: &ContentHash) -> String {
    format!("{CAPTION_PREFIX}{}", hash.to_hex())
}

/// Decode the content hash out of a caption.
pub fn decode_caption(caption: &str) -> crate::Result<ContentHash> {
    let caption = caption.trim();
    let hex = caption
        .strip_prefix(CAPTION_PREFIX)
        .or_else(|| caption.strip_prefix(BOLD_CAPTION_PREFIX))
        .ok_or_else(|| crate::Error::InvalidTag(format!("caption has no hash prefix: {caption:?}")))?;
    ContentHash::from_hex(hex.trim())
        .map_err(|e| crate::Error::InvalidTag(format!("caption hash: {e}")))
}

/// Encode an attachment filename: `chunk-<sequence>.<extension>`.
pub fn encode_filename(sequence: u32, extension: &str) -> String {
    if extension.is_empty() {
        format!("{FILENAME_PREFIX}{sequence}")
    } else {
        format!("{FILENAME_PREFIX}{sequence}.{extension}")
    }
}

/// Decode the sequence number out of an attachment filename.
///
/// Any extension is accepted. The sequence must be a positive decimal integer.
pub fn decode_filename(filename: &str) -> crate::Result<u32> {
    let rest = filename.strip_prefix(FILENAME_PREFIX).ok_or_else(|| {
        crate::Error::InvalidTag(format!("filename has no chunk prefix: {filename:?}"))
    })?;
    let digits = rest.split_once('.').map_or(rest, |(digits, _)| digits);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(crate::Error::InvalidTag(format!(
            "filename has no sequence number: {filename:?}"
        )));
    }
    let sequence: u32 = digits
        .parse()
        .map_err(|e| crate::Error::InvalidTag(format!("filename sequence: {e}")))?;
    if sequence == 0 {
        return Err(crate::Error::InvalidTag(format!(
            "filename sequence must be positive: {filename:?}"
        )));
    }
    Ok(sequence)
}
