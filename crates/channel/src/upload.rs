//! Concurrent chunk upload.

use crate::error::{ChunkFailure, TransferError, TransferResult};
use crate::session::Session;
use crate::traits::OutgoingAttachment;
use chanstore_core::config::TransferConfig;
use chanstore_core::tag::DEFAULT_CHUNK_EXTENSION;
use chanstore_core::{ChunkSet, ChunkTag, ContentHash};
use futures::stream::{self, StreamExt};
use tracing::instrument;

/// Options for uploading a chunk set.
#[derive(Clone, Debug)]
pub struct UploadOptions {
    /// Maximum number of sends in flight.
    pub max_concurrency: usize,
    /// Extension for chunk filenames.
    pub chunk_extension: String,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            chunk_extension: DEFAULT_CHUNK_EXTENSION.to_string(),
        }
    }
}

impl From<&TransferConfig> for UploadOptions {
    fn from(config: &TransferConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            chunk_extension: config.chunk_extension.clone(),
        }
    }
}

/// Result of a completed upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Content hash the chunks were tagged with.
    pub hash: ContentHash,
    /// Number of chunks sent.
    pub chunks_sent: usize,
    /// Total attachment bytes sent.
    pub bytes_sent: u64,
}

/// Pushes every chunk of a set to a session's channel.
#[derive(Clone, Debug, Default)]
pub struct Uploader {
    options: UploadOptions,
}

impl Uploader {
    /// Create an uploader.
    pub fn new(options: UploadOptions) -> Self {
        Self { options }
    }

    /// Send all chunks concurrently, tagged with the set's hash.
    ///
    /// Every send runs to completion before the outcome is decided. If any
    /// send failed the upload fails with [`TransferError::Upload`], which
    /// names the failed sequences and how many chunks were sent anyway.
    /// Sent chunks are never removed.
    #[instrument(skip(self, session, set), fields(hash = %set.hash(), chunks = set.len()))]
    pub async fn upload(&self, session: &Session, set: ChunkSet) -> TransferResult<UploadReceipt> {
        let hash = *set.hash();
        let total = set.len();
        let max_concurrency = self.options.max_concurrency.max(1);
        let extension = self.options.chunk_extension.as_str();

        let outcomes: Vec<_> = stream::iter(set.into_chunks())
            .map(|chunk| {
                let tag = ChunkTag::new(hash, chunk.sequence);
                let size = chunk.size();
                let attachment = OutgoingAttachment {
                    filename: tag.filename(extension),
                    caption: tag.caption(),
                    data: chunk.data,
                };
                async move { (tag.sequence, size, session.send(attachment).await) }
            })
            .buffer_unordered(max_concurrency)
            .collect()
            .await;

        let mut chunks_sent = 0;
        let mut bytes_sent = 0;
        let mut failures = Vec::new();
        for (sequence, size, outcome) in outcomes {
            match outcome {
                Ok(message_id) => {
                    tracing::trace!(sequence, message_id = %message_id, "chunk sent");
                    chunks_sent += 1;
                    bytes_sent += size;
                }
                Err(error) => {
                    tracing::warn!(sequence, error = %error, "chunk send failed");
                    failures.push(ChunkFailure { sequence, error });
                }
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|f| f.sequence);
            return Err(TransferError::Upload {
                hash: hash.to_hex(),
                total,
                sent: chunks_sent,
                failures,
            });
        }

        tracing::info!(chunks = chunks_sent, bytes = bytes_sent, "chunk set uploaded");
        Ok(UploadReceipt {
            hash,
            chunks_sent,
            bytes_sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryBackend;
    use crate::traits::{Backend, ChannelId, Connection, Credentials};
    use bytes::Bytes;

    async fn session() -> (MemoryBackend, Session) {
        let backend = MemoryBackend::new();
        backend.add_token("t");
        backend.add_channel("c");
        let session = Session::open(&backend, &Credentials::new("t"), &ChannelId::new("c"))
            .await
            .unwrap();
        (backend, session)
    }

    #[tokio::test]
    async fn test_upload_tags_every_chunk() {
        let (backend, session) = session().await;
        let data = Bytes::from_static(b"0123456789abcdefghij");
        let set = ChunkSet::from_data(&data, 8).unwrap();
        let hash = *set.hash();

        let receipt = Uploader::default().upload(&session, set).await.unwrap();
        assert_eq!(receipt.hash, hash);
        assert_eq!(receipt.chunks_sent, 3);
        assert_eq!(receipt.bytes_sent, 20);
        assert_eq!(backend.message_count("c"), 3);

        let conn = backend.connect(&Credentials::new("t")).await.unwrap();
        let page = conn
            .history_page(&ChannelId::new("c"), None, 10)
            .await
            .unwrap();
        let mut names: Vec<String> = page
            .messages
            .iter()
            .map(|m| {
                assert_eq!(m.caption, format!("File Hash: {hash}"));
                m.attachment.as_ref().unwrap().filename.clone()
            })
            .collect();
        names.sort();
        assert_eq!(names, vec!["chunk-1.bin", "chunk-2.bin", "chunk-3.bin"]);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_uses_configured_extension() {
        let (backend, session) = session().await;
        let set = ChunkSet::from_data(&Bytes::from_static(b"abc"), 8).unwrap();
        let uploader = Uploader::new(UploadOptions {
            max_concurrency: 1,
            chunk_extension: "txt".to_string(),
        });
        uploader.upload(&session, set).await.unwrap();

        let conn = backend.connect(&Credentials::new("t")).await.unwrap();
        let page = conn
            .history_page(&ChannelId::new("c"), None, 10)
            .await
            .unwrap();
        assert_eq!(
            page.messages[0].attachment.as_ref().unwrap().filename,
            "chunk-1.txt"
        );
    }

    #[tokio::test]
    async fn test_upload_empty_set_sends_nothing() {
        let (backend, session) = session().await;
        let set = ChunkSet::from_data(&Bytes::new(), 8).unwrap();
        let receipt = Uploader::default().upload(&session, set).await.unwrap();
        assert_eq!(receipt.chunks_sent, 0);
        assert!(receipt.hash.is_empty_content());
        assert_eq!(backend.stats().messages_sent, 0);
    }

    #[tokio::test]
    async fn test_upload_on_closed_session_reports_every_chunk() {
        let (_backend, session) = session().await;
        session.close().await.unwrap();
        let set = ChunkSet::from_data(&Bytes::from_static(b"abcdefgh"), 4).unwrap();

        let err = Uploader::default().upload(&session, set).await.unwrap_err();
        assert_eq!(err.kind(), "upload_error");
        assert_eq!(err.failed_sequences(), vec![1, 2]);
    }
}
