//! Application state shared across handlers.

use chanstore_channel::{Backend, TransferClient};
use chanstore_core::config::AppConfig;
use std::sync::Arc;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Transfer client over the configured backend.
    pub client: TransferClient,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn new(config: AppConfig, backend: Arc<dyn Backend>) -> Self {
        if let Err(error) = config.validate() {
            panic!("Invalid configuration: {}", error);
        }

        let client = TransferClient::new(backend, config.transfer.clone());
        Self {
            config: Arc::new(config),
            client,
        }
    }
}
