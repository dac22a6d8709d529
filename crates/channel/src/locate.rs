//! Locating a chunk set in channel history.

use crate::error::{ChannelError, TransferError, TransferResult};
use crate::session::Session;
use crate::traits::AttachmentRef;
use chanstore_core::chunk::check_contiguous;
use chanstore_core::config::TransferConfig;
use chanstore_core::{Chunk, ChunkSet, ChunkTag, ContentHash};
use futures::TryStreamExt;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use tracing::instrument;

/// Options for scanning history.
#[derive(Clone, Debug)]
pub struct LocateOptions {
    /// Messages requested per history page.
    pub page_size: usize,
    /// Stop after this many pages.
    pub max_pages: Option<u32>,
    /// Maximum number of downloads in flight.
    pub max_concurrency: usize,
    /// Number of chunks the set should have, when the file size is known.
    pub expected_count: Option<usize>,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: None,
            max_concurrency: 8,
            expected_count: None,
        }
    }
}

impl From<&TransferConfig> for LocateOptions {
    fn from(config: &TransferConfig) -> Self {
        Self {
            page_size: config.history_page_size,
            max_pages: config.max_history_pages,
            max_concurrency: config.max_concurrency,
            expected_count: None,
        }
    }
}

impl LocateOptions {
    /// Set the expected chunk count.
    pub fn with_expected_count(mut self, expected_count: Option<usize>) -> Self {
        self.expected_count = expected_count;
        self
    }
}

/// Finds and downloads the chunks tagged with a content hash.
#[derive(Clone, Debug, Default)]
pub struct Locator {
    options: LocateOptions,
}

impl Locator {
    /// Create a locator.
    pub fn new(options: LocateOptions) -> Self {
        Self { options }
    }

    /// Scan history newest first and collect the chunks tagged with `hash`.
    ///
    /// Messages without an attachment or whose caption and filename do not
    /// decode as a tag are skipped. When a sequence appears more than once the
    /// newest copy wins. Scanning stops when history ends, the page budget is
    /// spent, or every expected sequence has been seen.
    #[instrument(skip(self, session), fields(hash = %hash, channel_id = %session.channel().id))]
    pub async fn locate(&self, session: &Session, hash: &ContentHash) -> TransferResult<ChunkSet> {
        if hash.is_empty_content() {
            // Empty content has no chunks to find.
            return Ok(ChunkSet::new(*hash, Vec::new()));
        }

        let (found, messages_scanned) = self.scan(session, hash).await?;

        if found.is_empty() {
            return Err(TransferError::NotFound {
                hash: hash.to_hex(),
                messages_scanned,
            });
        }

        let sequences: BTreeSet<u32> = found.keys().copied().collect();
        check_contiguous(hash, &sequences, self.options.expected_count)?;

        tracing::debug!(
            chunks = found.len(),
            messages_scanned,
            "chunk set located, downloading"
        );

        let chunks = self.download(session, found).await?;
        Ok(ChunkSet::new(*hash, chunks))
    }

    async fn scan(
        &self,
        session: &Session,
        hash: &ContentHash,
    ) -> TransferResult<(BTreeMap<u32, AttachmentRef>, u64)> {
        let mut found: BTreeMap<u32, AttachmentRef> = BTreeMap::new();
        let mut messages_scanned = 0u64;

        let mut pages = session.history(self.options.page_size, self.options.max_pages);
        while let Some(page) = pages.try_next().await? {
            for message in page.messages {
                messages_scanned += 1;
                let Some(attachment) = message.attachment else {
                    continue;
                };
                let Ok(tag) = ChunkTag::decode(&message.caption, &attachment.filename) else {
                    continue;
                };
                if tag.hash != *hash {
                    continue;
                }
                if found.contains_key(&tag.sequence) {
                    tracing::debug!(sequence = tag.sequence, "ignoring older duplicate chunk");
                    continue;
                }
                found.insert(tag.sequence, attachment);
            }

            if let Some(expected) = self.options.expected_count
                && expected > 0
                && let Ok(last) = u32::try_from(expected)
                && found.range(1..=last).count() == expected
            {
                tracing::debug!(messages_scanned, "all expected chunks seen, stopping scan");
                break;
            }
        }

        Ok((found, messages_scanned))
    }

    async fn download(
        &self,
        session: &Session,
        found: BTreeMap<u32, AttachmentRef>,
    ) -> TransferResult<Vec<Chunk>> {
        let max_concurrency = self.options.max_concurrency.max(1);

        let outcomes: Vec<_> = stream::iter(found)
            .map(|(sequence, attachment)| async move {
                let outcome = session.download(&attachment).await;
                if let Ok(data) = &outcome
                    && data.len() as u64 != attachment.size
                {
                    tracing::warn!(
                        sequence,
                        reported = attachment.size,
                        actual = data.len(),
                        "attachment size differs from reported size"
                    );
                }
                (sequence, outcome)
            })
            .buffer_unordered(max_concurrency)
            .collect()
            .await;

        // Every download has finished; report the lowest failed sequence.
        let mut chunks = Vec::with_capacity(outcomes.len());
        let mut failed: Option<(u32, ChannelError)> = None;
        for (sequence, outcome) in outcomes {
            match outcome {
                Ok(data) => chunks.push(Chunk::new(sequence, data)),
                Err(error) => {
                    tracing::warn!(sequence, error = %error, "chunk download failed");
                    if failed.as_ref().is_none_or(|(lowest, _)| sequence < *lowest) {
                        failed = Some((sequence, error));
                    }
                }
            }
        }
        match failed {
            Some((sequence, source)) => Err(TransferError::Download { sequence, source }),
            None => Ok(chunks),
        }
    }
}
