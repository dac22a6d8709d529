//! Process-local messaging backend.
//!
//! Channels live in memory for the lifetime of the backend value. History is
//! served newest first with numeric message ids, the same shape the REST
//! backend produces.

use crate::error::{ChannelError, ChannelResult};
use crate::traits::{
    AttachmentRef, Backend, ChannelId, ChannelInfo, Connection, Credentials, HistoryPage, Message,
    MessageId, OutgoingAttachment,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

const URL_SCHEME: &str = "memory://";

/// Counters observed by tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub messages_sent: u64,
    pub history_pages: u64,
    pub downloads: u64,
}

#[derive(Debug)]
struct StoredMessage {
    id: u64,
    caption: String,
    attachment: Option<(String, Bytes)>,
}

#[derive(Debug, Default)]
struct MemoryChannel {
    /// Oldest first.
    messages: Vec<StoredMessage>,
}

#[derive(Debug, Default)]
struct MemoryState {
    open_access: bool,
    tokens: HashSet<String>,
    channels: HashMap<String, MemoryChannel>,
    next_id: u64,
    stats: MemoryStats,
}

impl MemoryState {
    fn next_message_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn channel_mut(&mut self, channel_id: &str) -> ChannelResult<&mut MemoryChannel> {
        if self.open_access {
            return Ok(self.channels.entry(channel_id.to_string()).or_default());
        }
        self.channels
            .get_mut(channel_id)
            .ok_or_else(|| ChannelError::ChannelNotFound(channel_id.to_string()))
    }
}

/// In-memory backend.
///
/// Cloning yields a handle to the same channels.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    /// Create a backend that only accepts registered tokens and channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that accepts any non-empty token and creates
    /// channels on first use.
    pub fn open_access() -> Self {
        let backend = Self::default();
        backend.lock().open_access = true;
        backend
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock_state(&self.state)
    }

    /// Register a token that `connect` will accept.
    pub fn add_token(&self, token: impl Into<String>) {
        self.lock().tokens.insert(token.into());
    }

    /// Create an empty channel.
    pub fn add_channel(&self, channel_id: impl Into<String>) {
        self.lock().channels.entry(channel_id.into()).or_default();
    }

    /// Append a message directly, bypassing any connection.
    pub fn post_message(
        &self,
        channel_id: &str,
        caption: impl Into<String>,
        attachment: Option<(String, Bytes)>,
    ) -> ChannelResult<MessageId> {
        let mut state = self.lock();
        let id = state.next_message_id();
        state.channel_mut(channel_id)?.messages.push(StoredMessage {
            id,
            caption: caption.into(),
            attachment,
        });
        Ok(MessageId::new(id.to_string()))
    }

    /// Number of messages in a channel.
    pub fn message_count(&self, channel_id: &str) -> usize {
        self.lock()
            .channels
            .get(channel_id)
            .map_or(0, |c| c.messages.len())
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> MemoryStats {
        self.lock().stats
    }
}

fn lock_state(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("memory backend mutex was poisoned, recovering with into_inner()");
        poisoned.into_inner()
    })
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn connect(&self, credentials: &Credentials) -> ChannelResult<Arc<dyn Connection>> {
        {
            let mut state = self.lock();
            let accepted = if state.open_access {
                !credentials.token().is_empty()
            } else {
                state.tokens.contains(credentials.token())
            };
            if !accepted {
                return Err(ChannelError::Authentication(
                    "token rejected by memory backend".to_string(),
                ));
            }
            state.stats.connections_opened += 1;
        }
        Ok(Arc::new(MemoryConnection {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn lock(&self) -> ChannelResult<MutexGuard<'_, MemoryState>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::SessionClosed);
        }
        Ok(lock_state(&self.state))
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn fetch_channel(&self, channel_id: &ChannelId) -> ChannelResult<ChannelInfo> {
        let mut state = self.lock()?;
        state.channel_mut(channel_id.as_str())?;
        Ok(ChannelInfo {
            id: channel_id.clone(),
            name: Some(format!("memory-{channel_id}")),
        })
    }

    async fn send(
        &self,
        channel_id: &ChannelId,
        attachment: OutgoingAttachment,
    ) -> ChannelResult<MessageId> {
        let mut state = self.lock()?;
        let id = state.next_message_id();
        state
            .channel_mut(channel_id.as_str())?
            .messages
            .push(StoredMessage {
                id,
                caption: attachment.caption,
                attachment: Some((attachment.filename, attachment.data)),
            });
        state.stats.messages_sent += 1;
        Ok(MessageId::new(id.to_string()))
    }

    async fn history_page(
        &self,
        channel_id: &ChannelId,
        before: Option<&MessageId>,
        limit: usize,
    ) -> ChannelResult<HistoryPage> {
        let before = before
            .map(|id| {
                id.as_str().parse::<u64>().map_err(|_| {
                    ChannelError::InvalidResponse(format!("invalid message id: {id}"))
                })
            })
            .transpose()?;

        let mut state = self.lock()?;
        state.stats.history_pages += 1;
        let channel = state.channel_mut(channel_id.as_str())?;

        let mut older = channel
            .messages
            .iter()
            .rev()
            .filter(|m| before.is_none_or(|b| m.id < b))
            .peekable();

        let mut messages = Vec::new();
        while messages.len() < limit {
            let Some(stored) = older.next() else { break };
            messages.push(Message {
                id: MessageId::new(stored.id.to_string()),
                caption: stored.caption.clone(),
                attachment: stored
                    .attachment
                    .as_ref()
                    .map(|(filename, data)| AttachmentRef {
                        filename: filename.clone(),
                        size: data.len() as u64,
                        url: format!("{URL_SCHEME}{channel_id}/{}", stored.id),
                    }),
            });
        }

        let next_before = if older.peek().is_some() {
            messages.last().map(|m| m.id.clone())
        } else {
            None
        };

        Ok(HistoryPage {
            messages,
            next_before,
        })
    }

    async fn download(&self, attachment: &AttachmentRef) -> ChannelResult<Bytes> {
        let not_found = || ChannelError::AttachmentNotFound(attachment.url.clone());

        let (channel_id, message_id) = attachment
            .url
            .strip_prefix(URL_SCHEME)
            .and_then(|rest| rest.rsplit_once('/'))
            .ok_or_else(not_found)?;
        let message_id: u64 = message_id.parse().map_err(|_| not_found())?;

        let mut state = self.lock()?;
        let data = state
            .channels
            .get(channel_id)
            .and_then(|c| c.messages.iter().find(|m| m.id == message_id))
            .and_then(|m| m.attachment.as_ref())
            .map(|(_, data)| data.clone())
            .ok_or_else(not_found)?;
        state.stats.downloads += 1;
        Ok(data)
    }

    async fn close(&self) -> ChannelResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            lock_state(&self.state).stats.connections_closed += 1;
        }
        Ok(())
    }
}
