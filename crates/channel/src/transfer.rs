//! Whole-file upload and retrieval, one session per call.

use crate::error::{TransferError, TransferResult};
use crate::locate::{LocateOptions, Locator};
use crate::session::Session;
use crate::traits::{Backend, ChannelId, Credentials};
use crate::upload::{UploadOptions, UploadReceipt, Uploader};
use bytes::Bytes;
use chanstore_core::config::TransferConfig;
use chanstore_core::{ChunkSet, ContentHash, Verification, checked_chunk_count, reassemble};
use std::sync::Arc;
use tracing::instrument;

/// A reassembled file and how many chunks it was rebuilt from.
#[derive(Debug, Clone)]
pub struct RetrieveReceipt {
    pub data: Bytes,
    pub chunks_downloaded: usize,
}

/// Splits, uploads, locates and reassembles files over a messaging backend.
#[derive(Clone)]
pub struct TransferClient {
    backend: Arc<dyn Backend>,
    config: TransferConfig,
}

impl TransferClient {
    /// Create a client over a backend.
    pub fn new(backend: Arc<dyn Backend>, config: TransferConfig) -> Self {
        Self { backend, config }
    }

    /// Transfer configuration in use.
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Name of the backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Hash and split `data`, then upload every chunk to the channel.
    ///
    /// The returned receipt carries the content hash needed for retrieval.
    #[instrument(skip(self, credentials, data), fields(size = data.len()))]
    pub async fn upload(
        &self,
        credentials: &Credentials,
        channel_id: &ChannelId,
        data: &Bytes,
    ) -> TransferResult<UploadReceipt> {
        let set = ChunkSet::from_data(data, self.config.chunk_size)?;
        tracing::debug!(hash = %set.hash(), chunks = set.len(), "file chunked");

        let session = Session::open(self.backend.as_ref(), credentials, channel_id).await?;
        let result = Uploader::new(UploadOptions::from(&self.config))
            .upload(&session, set)
            .await;
        close_session(&session).await;
        result
    }

    /// Locate the chunks tagged with `hash` and reassemble them.
    ///
    /// `expected_size`, when known, bounds the history scan and is checked
    /// against the reassembled length. The hash is rechecked unless disabled
    /// in configuration.
    pub async fn retrieve(
        &self,
        credentials: &Credentials,
        channel_id: &ChannelId,
        hash: &ContentHash,
        expected_size: Option<u64>,
    ) -> TransferResult<Bytes> {
        self.retrieve_with_receipt(credentials, channel_id, hash, expected_size)
            .await
            .map(|receipt| receipt.data)
    }

    /// Like [`TransferClient::retrieve`], also reporting the chunks downloaded.
    ///
    /// An `expected_size` needing more chunks than a sequence can number is
    /// rejected before any connection is made.
    #[instrument(skip(self, credentials), fields(hash = %hash))]
    pub async fn retrieve_with_receipt(
        &self,
        credentials: &Credentials,
        channel_id: &ChannelId,
        hash: &ContentHash,
        expected_size: Option<u64>,
    ) -> TransferResult<RetrieveReceipt> {
        let expected_count = expected_size
            .map(|size| checked_chunk_count(size, self.config.chunk_size))
            .transpose()?
            .map(|count| count as usize);
        let locator =
            Locator::new(LocateOptions::from(&self.config).with_expected_count(expected_count));

        let session = Session::open(self.backend.as_ref(), credentials, channel_id).await?;
        let located = locator.locate(&session, hash).await;
        close_session(&session).await;
        let set = located?;
        let chunks_downloaded = set.len();

        let verification = Verification::default()
            .with_expected_size(expected_size)
            .with_hash_check(self.config.verify_hash);
        let data = reassemble(set, &verification).map_err(TransferError::from)?;
        tracing::info!(bytes = data.len(), chunks = chunks_downloaded, "file retrieved");
        Ok(RetrieveReceipt {
            data,
            chunks_downloaded,
        })
    }
}

/// Close a session after its work is done.
///
/// A close failure after the work finished is logged, not returned.
async fn close_session(session: &Session) {
    if let Err(e) = session.close().await {
        tracing::warn!(
            channel_id = %session.channel().id,
            error = %e,
            "failed to close session"
        );
    }
}
