//! Backend wrappers that inject failures and record behavior.

use async_trait::async_trait;
use bytes::Bytes;
use chanstore_channel::{
    AttachmentRef, Backend, ChannelError, ChannelId, ChannelInfo, ChannelResult, Connection,
    Credentials, HistoryPage, MemoryBackend, MessageId, OutgoingAttachment,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Observations shared by every connection of a [`FaultyBackend`].
#[derive(Debug, Default)]
pub struct CallLog {
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub sends_completed: AtomicUsize,
    pub close_calls: AtomicUsize,
}

impl CallLog {
    #[allow(dead_code)]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn sends_completed(&self) -> usize {
        self.sends_completed.load(Ordering::SeqCst)
    }
}

/// Memory backend wrapper failing chosen sends and downloads.
///
/// Failing sends return immediately; the others wait `send_delay` first, so
/// a failure is always observed while other sends are still in flight.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct FaultyBackend {
    inner: MemoryBackend,
    failing_sends: HashSet<String>,
    failing_downloads: HashSet<String>,
    send_delay: Duration,
    lookup_delay: Duration,
    calls: Arc<CallLog>,
}

#[allow(dead_code)]
impl FaultyBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            failing_sends: HashSet::new(),
            failing_downloads: HashSet::new(),
            send_delay: Duration::ZERO,
            lookup_delay: Duration::ZERO,
            calls: Arc::new(CallLog::default()),
        }
    }

    /// Fail every send of an attachment with this filename.
    pub fn fail_send(mut self, filename: &str) -> Self {
        self.failing_sends.insert(filename.to_string());
        self
    }

    /// Fail every download of an attachment with this filename.
    pub fn fail_download(mut self, filename: &str) -> Self {
        self.failing_downloads.insert(filename.to_string());
        self
    }

    /// Delay successful sends.
    pub fn send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Delay channel lookups after connecting.
    pub fn lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = delay;
        self
    }

    pub fn calls(&self) -> Arc<CallLog> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Backend for FaultyBackend {
    async fn connect(&self, credentials: &Credentials) -> ChannelResult<Arc<dyn Connection>> {
        let inner = self.inner.connect(credentials).await?;
        Ok(Arc::new(FaultyConnection {
            inner,
            failing_sends: self.failing_sends.clone(),
            failing_downloads: self.failing_downloads.clone(),
            send_delay: self.send_delay,
            lookup_delay: self.lookup_delay,
            calls: Arc::clone(&self.calls),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}

struct FaultyConnection {
    inner: Arc<dyn Connection>,
    failing_sends: HashSet<String>,
    failing_downloads: HashSet<String>,
    send_delay: Duration,
    lookup_delay: Duration,
    calls: Arc<CallLog>,
}

#[async_trait]
impl Connection for FaultyConnection {
    async fn fetch_channel(&self, channel_id: &ChannelId) -> ChannelResult<ChannelInfo> {
        if !self.lookup_delay.is_zero() {
            tokio::time::sleep(self.lookup_delay).await;
        }
        self.inner.fetch_channel(channel_id).await
    }

    async fn send(
        &self,
        channel_id: &ChannelId,
        attachment: OutgoingAttachment,
    ) -> ChannelResult<MessageId> {
        if self.failing_sends.contains(&attachment.filename) {
            return Err(ChannelError::Status {
                status: 500,
                message: format!("injected failure for {}", attachment.filename),
            });
        }

        let now = self.calls.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        let result = self.inner.send(channel_id, attachment).await;
        self.calls.in_flight.fetch_sub(1, Ordering::SeqCst);
        if result.is_ok() {
            self.calls.sends_completed.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    async fn history_page(
        &self,
        channel_id: &ChannelId,
        before: Option<&MessageId>,
        limit: usize,
    ) -> ChannelResult<HistoryPage> {
        self.inner.history_page(channel_id, before, limit).await
    }

    async fn download(&self, attachment: &AttachmentRef) -> ChannelResult<Bytes> {
        if self.failing_downloads.contains(&attachment.filename) {
            return Err(ChannelError::AttachmentNotFound(attachment.url.clone()));
        }
        self.inner.download(attachment).await
    }

    async fn close(&self) -> ChannelResult<()> {
        self.calls.close_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}
