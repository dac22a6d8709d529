//! Chunked file transfer over a messaging channel.
//!
//! This crate provides:
//! - The messaging backend contract ([`Backend`], [`Connection`])
//! - Sessions with guaranteed teardown
//! - Concurrent chunk upload and history-scanning location
//! - Backends: Discord-compatible REST and in-memory

pub mod backends;
pub mod error;
pub mod locate;
pub mod session;
pub mod traits;
pub mod transfer;
pub mod upload;

pub use backends::{
    memory::{MemoryBackend, MemoryStats},
    rest::{RestBackend, RestConfig},
};
pub use error::{ChannelError, ChannelResult, ChunkFailure, TransferError, TransferResult};
pub use locate::{LocateOptions, Locator};
pub use session::Session;
pub use traits::{
    AttachmentRef, Backend, ChannelId, ChannelInfo, Connection, ConnectionHistoryExt, Credentials,
    HistoryPage, HistoryStream, Message, MessageId, OutgoingAttachment,
};
pub use transfer::{RetrieveReceipt, TransferClient};
pub use upload::{UploadOptions, UploadReceipt, Uploader};

use chanstore_core::config::BackendConfig;
use std::sync::Arc;

/// Create a messaging backend from configuration.
pub fn from_config(config: &BackendConfig) -> ChannelResult<Arc<dyn Backend>> {
    config.validate().map_err(ChannelError::Config)?;

    match config {
        BackendConfig::Rest {
            api_base,
            request_timeout_secs,
            user_agent,
        } => {
            let backend = RestBackend::new(RestConfig {
                api_base: api_base.clone(),
                request_timeout: std::time::Duration::from_secs(*request_timeout_secs),
                user_agent: user_agent.clone(),
            })?;
            Ok(Arc::new(backend))
        }
        BackendConfig::Memory => Ok(Arc::new(MemoryBackend::open_access())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_rest_ok() {
        let backend = from_config(&BackendConfig::default()).unwrap();
        assert_eq!(backend.backend_name(), "rest");
    }

    #[test]
    fn from_config_memory_ok() {
        let backend = from_config(&BackendConfig::Memory).unwrap();
        assert_eq!(backend.backend_name(), "memory");
    }

    #[test]
    fn from_config_rejects_invalid_base() {
        let config = BackendConfig::Rest {
            api_base: "discord.com".to_string(),
            request_timeout_secs: 10,
            user_agent: None,
        };
        match from_config(&config) {
            Ok(_) => panic!("expected error"),
            Err(ChannelError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
