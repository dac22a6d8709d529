//! One ephemeral backend connection bound to a resolved channel.

use crate::error::{ChannelError, ChannelResult};
use crate::traits::{
    AttachmentRef, Backend, ChannelId, ChannelInfo, Connection, ConnectionHistoryExt, Credentials,
    HistoryStream, MessageId, OutgoingAttachment,
};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::instrument;

/// An open connection to one channel.
///
/// A session is created per upload or retrieval call and never shared
/// between calls. Call [`Session::close`] when done; a session dropped
/// while still open spawns its close on the current runtime.
pub struct Session {
    connection: Arc<dyn Connection>,
    channel: ChannelInfo,
    backend_name: &'static str,
    closed: AtomicBool,
    runtime_handle: Option<tokio::runtime::Handle>,
}

impl Session {
    /// Authenticate and resolve the destination channel.
    ///
    /// If the channel cannot be resolved the connection is closed before the
    /// error is returned. If the returned future is dropped before it
    /// completes, the connection is closed on the current runtime.
    #[instrument(skip(backend, credentials), fields(backend = backend.backend_name()))]
    pub async fn open(
        backend: &dyn Backend,
        credentials: &Credentials,
        channel_id: &ChannelId,
    ) -> ChannelResult<Self> {
        let runtime_handle = tokio::runtime::Handle::try_current().ok();
        let pending = PendingConnection {
            connection: backend.connect(credentials).await?,
            channel_id: channel_id.clone(),
            runtime_handle: runtime_handle.clone(),
            armed: true,
        };

        let channel = match pending.connection.fetch_channel(channel_id).await {
            Ok(channel) => channel,
            Err(e) => {
                let connection = pending.disarm();
                if let Err(close_err) = connection.close().await {
                    tracing::warn!(error = %close_err, "failed to close connection after channel lookup failure");
                }
                return Err(e);
            }
        };

        tracing::debug!(channel_id = %channel.id, "session opened");

        Ok(Self {
            connection: pending.disarm(),
            channel,
            backend_name: backend.backend_name(),
            closed: AtomicBool::new(false),
            runtime_handle,
        })
    }

    /// The resolved channel.
    pub fn channel(&self) -> &ChannelInfo {
        &self.channel
    }

    /// Name of the backend this session talks to.
    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// Whether [`Session::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> ChannelResult<()> {
        if self.is_closed() {
            return Err(ChannelError::SessionClosed);
        }
        Ok(())
    }

    /// Send one attachment to the session's channel.
    pub async fn send(&self, attachment: OutgoingAttachment) -> ChannelResult<MessageId> {
        self.ensure_open()?;
        self.connection.send(&self.channel.id, attachment).await
    }

    /// Stream channel history newest first.
    pub fn history(&self, page_size: usize, max_pages: Option<u32>) -> HistoryStream<'_> {
        if let Err(e) = self.ensure_open() {
            return Box::pin(futures::stream::once(async move { Err(e) }));
        }
        self.connection
            .history(&self.channel.id, page_size, max_pages)
    }

    /// Fetch attachment bytes.
    pub async fn download(&self, attachment: &AttachmentRef) -> ChannelResult<Bytes> {
        self.ensure_open()?;
        self.connection.download(attachment).await
    }

    /// Close the underlying connection.
    ///
    /// Only the first call reaches the backend; later calls return `Ok(())`.
    /// Already sent messages are left in place.
    pub async fn close(&self) -> ChannelResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(channel_id = %self.channel.id, "closing session");
        self.connection.close().await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("channel", &self.channel)
            .field("backend", &self.backend_name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        spawn_close(
            self.runtime_handle.as_ref(),
            Arc::clone(&self.connection),
            self.channel.id.clone(),
        );
    }
}

/// A connection whose channel lookup has not finished yet.
struct PendingConnection {
    connection: Arc<dyn Connection>,
    channel_id: ChannelId,
    runtime_handle: Option<tokio::runtime::Handle>,
    armed: bool,
}

impl PendingConnection {
    /// Take the connection, leaving closing it to the caller.
    fn disarm(mut self) -> Arc<dyn Connection> {
        self.armed = false;
        Arc::clone(&self.connection)
    }
}

impl Drop for PendingConnection {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::debug!(channel_id = %self.channel_id, "session open cancelled");
        spawn_close(
            self.runtime_handle.as_ref(),
            Arc::clone(&self.connection),
            self.channel_id.clone(),
        );
    }
}

/// Close a connection from a destructor.
fn spawn_close(
    handle: Option<&tokio::runtime::Handle>,
    connection: Arc<dyn Connection>,
    channel_id: ChannelId,
) {
    let Some(handle) = handle else {
        tracing::warn!(
            channel_id = %channel_id,
            "session dropped without runtime handle - connection left open"
        );
        return;
    };
    handle.spawn(async move {
        if let Err(e) = connection.close().await {
            tracing::error!(channel_id = %channel_id, error = %e, "failed to close dropped session");
        } else {
            tracing::info!(channel_id = %channel_id, "closed dropped session");
        }
    });
}
