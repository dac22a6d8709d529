//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:1234").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted request body size in bytes for uploads.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Allow cross-origin requests from any origin (default: true).
    /// The browser front end is usually served from a different origin.
    #[serde(default = "default_permissive_cors")]
    pub permissive_cors: bool,
}

fn default_bind() -> String {
    "127.0.0.1:1234".to_string()
}

fn default_max_upload_size() -> u64 {
    512 * 1024 * 1024
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_permissive_cors() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_size: default_max_upload_size(),
            metrics_enabled: default_metrics_enabled(),
            permissive_cors: default_permissive_cors(),
        }
    }
}

/// Chunked transfer configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferConfig {
    /// Chunk size in bytes. Fixed per deployment, never negotiated per call.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Maximum concurrent chunk sends or downloads within one call.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Messages requested per history page.
    #[serde(default = "default_history_page_size")]
    pub history_page_size: usize,
    /// Stop scanning history after this many pages (default: scan everything).
    #[serde(default)]
    pub max_history_pages: Option<u32>,
    /// Recompute the content hash after reassembly (default: true).
    #[serde(default = "default_verify_hash")]
    pub verify_hash: bool,
    /// Extension used for chunk attachment filenames.
    #[serde(default = "default_chunk_extension")]
    pub chunk_extension: String,
}

fn default_chunk_size() -> u64 {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_max_concurrency() -> usize {
    8
}

fn default_history_page_size() -> usize {
    100
}

fn default_verify_hash() -> bool {
    true
}

fn default_chunk_extension() -> String {
    crate::tag::DEFAULT_CHUNK_EXTENSION.to_string()
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_concurrency: default_max_concurrency(),
            history_page_size: default_history_page_size(),
            max_history_pages: None,
            verify_hash: default_verify_hash(),
            chunk_extension: default_chunk_extension(),
        }
    }
}

impl TransferConfig {
    /// Validate transfer configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("transfer.chunk_size must be greater than zero".to_string());
        }
        if self.chunk_size > crate::MAX_CHUNK_SIZE {
            return Err(format!(
                "transfer.chunk_size {} exceeds maximum {}",
                self.chunk_size,
                crate::MAX_CHUNK_SIZE
            ));
        }
        if self.max_concurrency == 0 {
            return Err("transfer.max_concurrency must be greater than zero".to_string());
        }
        if self.history_page_size == 0 {
            return Err("transfer.history_page_size must be greater than zero".to_string());
        }
        if self.max_history_pages == Some(0) {
            return Err("transfer.max_history_pages must be greater than zero when set".to_string());
        }
        if self.chunk_extension.contains(['/', '\\', '.']) {
            return Err(format!(
                "transfer.chunk_extension must be a bare extension, got {:?}",
                self.chunk_extension
            ));
        }
        Ok(())
    }
}

/// Messaging backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Discord-compatible REST API.
    Rest {
        /// API base URL including version.
        #[serde(default = "default_api_base")]
        api_base: String,
        /// Per-request timeout in seconds. The only timeout a transfer has.
        #[serde(default = "default_request_timeout_secs")]
        request_timeout_secs: u64,
        /// User agent sent with every request.
        #[serde(default)]
        user_agent: Option<String>,
    },
    /// Process-local channels (for development and tests).
    Memory,
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Rest {
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: None,
        }
    }
}

impl BackendConfig {
    /// Validate backend configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            BackendConfig::Rest {
                api_base,
                request_timeout_secs,
                ..
            } => {
                if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
                    return Err(format!(
                        "backend.api_base must be an http(s) URL, got {api_base:?}"
                    ));
                }
                if *request_timeout_secs == 0 {
                    return Err("backend.request_timeout_secs must be greater than zero".to_string());
                }
                Ok(())
            }
            BackendConfig::Memory => Ok(()),
        }
    }

    /// Request timeout, if the backend has one.
    pub fn request_timeout(&self) -> Option<Duration> {
        match self {
            BackendConfig::Rest {
                request_timeout_secs,
                ..
            } => Some(Duration::from_secs(*request_timeout_secs)),
            BackendConfig::Memory => None,
        }
    }
}

/// Top-level application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Transfer configuration.
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Messaging backend configuration.
    #[serde(default)]
    pub backend: BackendConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses the in-memory backend and a tiny chunk size
    /// so multi-chunk paths run on small inputs.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            transfer: TransferConfig {
                chunk_size: 16,
                ..TransferConfig::default()
            },
            backend: BackendConfig::Memory,
        }
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> crate::Result<()> {
        self.transfer.validate().map_err(crate::Error::Config)?;
        self.backend.validate().map_err(crate::Error::Config)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_config_defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.chunk_size, 10 * 1024 * 1024);
        assert!(config.verify_hash);
        assert!(config.max_history_pages.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_transfer_config_rejects_zero_chunk_size() {
        let config = TransferConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transfer_config_rejects_zero_concurrency() {
        let config = TransferConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transfer_config_rejects_dotted_extension() {
        let config = TransferConfig {
            chunk_extension: ".bin".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_config_deserialize_rest_defaults() {
        let json = r#"{"type": "rest"}"#;
        let config: BackendConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config, BackendConfig::default());
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_backend_config_deserialize_memory() {
        let json = r#"{"type": "memory"}"#;
        let config: BackendConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config, BackendConfig::Memory);
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn test_backend_config_rejects_non_http_base() {
        let config = BackendConfig::Rest {
            api_base: "ftp://example.com".to_string(),
            request_timeout_secs: 10,
            user_agent: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_app_config_empty_json_uses_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:1234");
        assert_eq!(config.transfer, TransferConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_for_testing_is_valid() {
        assert!(AppConfig::for_testing().validate().is_ok());
    }
}
