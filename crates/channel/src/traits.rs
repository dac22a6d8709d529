//! Messaging backend trait definitions.

use crate::error::ChannelResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed stream of history pages.
pub type HistoryStream<'a> = Pin<Box<dyn Stream<Item = ChannelResult<HistoryPage>> + Send + 'a>>;

/// Largest history page any backend is asked for.
pub const MAX_HISTORY_PAGE_SIZE: usize = 100;

/// Backend credential (a bot token).
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    /// Wrap a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// The raw token.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Identifier of a channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(String);

impl ChannelId {
    /// Create a channel id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a message within a channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    /// Create a message id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Channel id.
    pub id: ChannelId,
    /// Display name, if the backend reports one.
    pub name: Option<String>,
}

/// An attachment to send.
#[derive(Clone, Debug)]
pub struct OutgoingAttachment {
    /// Attachment filename.
    pub filename: String,
    /// Message text sent alongside the attachment.
    pub caption: String,
    /// Attachment bytes.
    pub data: Bytes,
}

/// A byte-fetchable reference to an attachment in history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Attachment filename.
    pub filename: String,
    /// Size reported by the backend.
    pub size: u64,
    /// Backend-specific fetch location (a URL for REST backends).
    pub url: String,
}

/// A message from channel history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Message id.
    pub id: MessageId,
    /// Message text.
    pub caption: String,
    /// First attachment, if any.
    pub attachment: Option<AttachmentRef>,
}

/// One page of channel history, newest message first.
#[derive(Clone, Debug, Default)]
pub struct HistoryPage {
    /// Messages in this page.
    pub messages: Vec<Message>,
    /// Cursor for the next (older) page. None on the last page.
    pub next_before: Option<MessageId>,
}

/// Messaging backend: produces authenticated connections.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Authenticate and return a ready connection.
    ///
    /// Readiness is awaited here; a returned connection is usable immediately.
    async fn connect(&self, credentials: &Credentials) -> ChannelResult<Arc<dyn Connection>>;

    /// Get the name of this backend.
    ///
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;
}

/// One authenticated backend connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Resolve a channel the credential can access.
    async fn fetch_channel(&self, channel_id: &ChannelId) -> ChannelResult<ChannelInfo>;

    /// Send one attachment with a caption.
    async fn send(
        &self,
        channel_id: &ChannelId,
        attachment: OutgoingAttachment,
    ) -> ChannelResult<MessageId>;

    /// Fetch up to `limit` messages older than `before` (newest first).
    async fn history_page(
        &self,
        channel_id: &ChannelId,
        before: Option<&MessageId>,
        limit: usize,
    ) -> ChannelResult<HistoryPage>;

    /// Fetch attachment bytes.
    async fn download(&self, attachment: &AttachmentRef) -> ChannelResult<Bytes>;

    /// Release the connection. Must be safe to call more than once.
    async fn close(&self) -> ChannelResult<()>;
}

/// Extension trait providing a paged history stream over [`Connection::history_page`].
///
/// DO NOT IMPLEMENT THIS TRAIT MANUALLY. It is provided for every connection
/// by a blanket implementation.
pub trait ConnectionHistoryExt: Connection {
    /// Stream history pages from newest to oldest.
    ///
    /// Stops after the last page, or after `max_pages` pages when set.
    fn history<'a>(
        &'a self,
        channel_id: &'a ChannelId,
        page_size: usize,
        max_pages: Option<u32>,
    ) -> HistoryStream<'a> {
        let page_size = page_size.clamp(1, MAX_HISTORY_PAGE_SIZE);

        Box::pin(async_stream::try_stream! {
            let mut before: Option<MessageId> = None;
            let mut pages = 0u32;
            loop {
                if max_pages.is_some_and(|max| pages >= max) {
                    tracing::debug!(channel_id = %channel_id, pages, "history page budget exhausted");
                    break;
                }
                let page = self.history_page(channel_id, before.as_ref(), page_size).await?;
                pages += 1;
                before = page.next_before.clone();
                let last = before.is_none();
                yield page;
                if last {
                    break;
                }
            }
        })
    }
}

impl<T: Connection + ?Sized> ConnectionHistoryExt for T {}
