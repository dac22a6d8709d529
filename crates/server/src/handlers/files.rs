//! File upload and retrieval endpoints.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chanstore_channel::{ChannelId, Credentials, TransferError};
use chanstore_core::ContentHash;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Details of an uploaded file.
#[derive(Debug, Serialize)]
pub struct FileDetails {
    pub filename: String,
    pub filehash: String,
    pub size: u64,
    pub mimetype: String,
}

/// Response for a successful upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub file_details: FileDetails,
}

struct UploadedFile {
    filename: String,
    mimetype: String,
    data: Bytes,
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(format!("invalid multipart body: {}", e.body_text()))
    }
}

fn required(value: Option<String>, name: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("missing {name}")))
}

/// POST /api/upload - Chunk and upload a file to a channel.
///
/// Multipart fields: `file`, `botToken`, `channelId`.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut file: Option<UploadedFile> = None;
    let mut bot_token: Option<String> = None;
    let mut channel_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let mimetype = field.content_type().unwrap_or(DEFAULT_MIME_TYPE).to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some(UploadedFile {
                    filename,
                    mimetype,
                    data,
                });
            }
            "botToken" => bot_token = Some(field.text().await.map_err(multipart_error)?),
            "channelId" => channel_id = Some(field.text().await.map_err(multipart_error)?),
            other => tracing::debug!(field = %other, "ignoring unknown multipart field"),
        }
    }

    let file = file.ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;
    let credentials = Credentials::new(required(bot_token, "botToken")?);
    let channel_id = ChannelId::new(required(channel_id, "channelId")?);

    tracing::info!(
        filename = %file.filename,
        size = file.data.len(),
        channel_id = %channel_id,
        "upload requested"
    );

    let started = Instant::now();
    let result = state
        .client
        .upload(&credentials, &channel_id, &file.data)
        .await;
    metrics::UPLOAD_DURATION.observe(started.elapsed().as_secs_f64());

    let receipt = match result {
        Ok(receipt) => receipt,
        Err(e) => {
            metrics::record_upload_error(e.kind());
            if let TransferError::Upload { sent, failures, .. } = &e {
                metrics::CHUNKS_SENT.inc_by(*sent as u64);
                metrics::CHUNK_SEND_FAILURES.inc_by(failures.len() as u64);
            }
            return Err(e.into());
        }
    };

    metrics::FILES_UPLOADED.inc();
    metrics::CHUNKS_SENT.inc_by(receipt.chunks_sent as u64);
    metrics::BYTES_UPLOADED.inc_by(receipt.bytes_sent);

    Ok(Json(UploadResponse {
        message: "File uploaded successfully".to_string(),
        file_details: FileDetails {
            filename: file.filename,
            filehash: receipt.hash.to_hex(),
            size: file.data.len() as u64,
            mimetype: file.mimetype,
        },
    }))
}

/// Query parameters for retrieval.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveQuery {
    /// Expected size in bytes.
    pub file_size: Option<u64>,
    /// Filename for the `Content-Disposition` header.
    pub file_name: Option<String>,
    pub bot_token: Option<String>,
    pub channel_id: Option<String>,
}

/// Make a filename safe for a quoted header parameter.
fn disposition_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}

/// GET /api/retrieve/{file_hash} - Locate, reassemble and return a file.
pub async fn retrieve_file(
    State(state): State<AppState>,
    Path(file_hash): Path<String>,
    Query(query): Query<RetrieveQuery>,
) -> ApiResult<Response> {
    let credentials = Credentials::new(required(query.bot_token, "botToken")?);
    let channel_id = ChannelId::new(required(query.channel_id, "channelId")?);
    let hash = ContentHash::from_hex(&file_hash).map_err(|e| {
        metrics::record_retrieve_error("invalid_argument");
        ApiError::Transfer(e.into())
    })?;

    tracing::info!(
        hash = %hash,
        expected_size = ?query.file_size,
        channel_id = %channel_id,
        "retrieve requested"
    );

    let started = Instant::now();
    let result = state
        .client
        .retrieve_with_receipt(&credentials, &channel_id, &hash, query.file_size)
        .await;
    metrics::RETRIEVE_DURATION.observe(started.elapsed().as_secs_f64());

    let receipt = result.inspect_err(|e| metrics::record_retrieve_error(e.kind()))?;
    let data = receipt.data;

    metrics::FILES_RETRIEVED.inc();
    metrics::CHUNKS_DOWNLOADED.inc_by(receipt.chunks_downloaded as u64);
    metrics::BYTES_RETRIEVED.inc_by(data.len() as u64);

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_MIME_TYPE));
    if let Some(name) = query.file_name.as_deref().filter(|n| !n.is_empty()) {
        let value = format!("attachment; filename=\"{}\"", disposition_filename(name));
        let value = HeaderValue::from_str(&value)
            .map_err(|e| ApiError::Internal(format!("invalid content disposition: {e}")))?;
        headers.insert(CONTENT_DISPOSITION, value);
    }

    Ok((StatusCode::OK, headers, Body::from(data)).into_response())
}
