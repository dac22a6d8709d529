//! Server test utilities.

use super::fixtures::{CHANNEL, TOKEN};
use chanstore_channel::MemoryBackend;
use chanstore_core::config::AppConfig;
use chanstore_server::{AppState, create_router};
use std::sync::Arc;

/// A test server over an in-memory messaging backend.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub backend: MemoryBackend,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server with a 16-byte chunk size.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a test server with custom config modifications.
    pub fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        chanstore_server::metrics::register_metrics();

        let mut config = AppConfig::for_testing();
        modifier(&mut config);

        let backend = MemoryBackend::new();
        backend.add_token(TOKEN);
        backend.add_channel(CHANNEL);

        let state = AppState::new(config, Arc::new(backend.clone()));
        let router = create_router(state.clone());

        Self {
            router,
            state,
            backend,
        }
    }

    /// Chunk size the server splits uploads with.
    pub fn chunk_size(&self) -> u64 {
        self.state.config.transfer.chunk_size
    }
}
