//! HTTP gateway for chanstore.
//!
//! This crate exposes the chunked transfer layer over HTTP:
//! - Multipart file upload to a channel
//! - File retrieval by content hash
//! - Health and Prometheus metrics endpoints

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
