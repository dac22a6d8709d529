//! Prometheus metrics for the chanstore gateway.
//!
//! Exposes counters for chunk traffic and failures, plus request latency.
//! Metrics never carry tokens, channel ids, or content hashes.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Upload metrics
pub static FILES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chanstore_files_uploaded_total",
        "Total number of files fully uploaded",
    )
    .expect("metric creation failed")
});

pub static CHUNKS_SENT: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("chanstore_chunks_sent_total", "Total number of chunks sent")
        .expect("metric creation failed")
});

pub static CHUNK_SEND_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chanstore_chunk_send_failures_total",
        "Total number of chunk sends that failed",
    )
    .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chanstore_bytes_uploaded_total",
        "Total attachment bytes sent",
    )
    .expect("metric creation failed")
});

// Retrieval metrics
pub static FILES_RETRIEVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chanstore_files_retrieved_total",
        "Total number of files retrieved and verified",
    )
    .expect("metric creation failed")
});

pub static CHUNKS_DOWNLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chanstore_chunks_downloaded_total",
        "Total number of chunks downloaded for successful retrievals",
    )
    .expect("metric creation failed")
});

pub static BYTES_RETRIEVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chanstore_bytes_retrieved_total",
        "Total bytes returned by successful retrievals",
    )
    .expect("metric creation failed")
});

// Timing metrics
pub static UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "chanstore_upload_duration_seconds",
            "Time taken to upload a whole file",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

pub static RETRIEVE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "chanstore_retrieve_duration_seconds",
            "Time taken to locate and reassemble a whole file",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

// Error metrics
pub static UPLOAD_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("chanstore_upload_errors_total", "Total upload errors by kind"),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static RETRIEVE_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "chanstore_retrieve_errors_total",
            "Total retrieval errors by kind",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// This function is idempotent - subsequent calls after the first are no-ops.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(FILES_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CHUNKS_SENT.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CHUNK_SEND_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(FILES_RETRIEVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CHUNKS_DOWNLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_RETRIEVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RETRIEVE_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RETRIEVE_ERRORS.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record an upload error by kind.
pub fn record_upload_error(kind: &str) {
    UPLOAD_ERRORS.with_label_values(&[kind]).inc();
}

/// Record a retrieval error by kind.
pub fn record_retrieve_error(kind: &str) {
    RETRIEVE_ERRORS.with_label_values(&[kind]).inc();
}
