//! Discord-compatible REST messaging backend.

use crate::error::{ChannelError, ChannelResult};
use crate::traits::{
    AttachmentRef, Backend, ChannelId, ChannelInfo, Connection, Credentials, HistoryPage, Message,
    MessageId, OutgoingAttachment,
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::instrument;

const DEFAULT_USER_AGENT: &str = concat!("chanstore/", env!("CARGO_PKG_VERSION"));

/// REST backend configuration.
#[derive(Clone, Debug)]
pub struct RestConfig {
    /// API base URL including the version segment.
    pub api_base: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// User agent override.
    pub user_agent: Option<String>,
}

/// Messaging backend speaking the Discord REST API.
pub struct RestBackend {
    http: reqwest::Client,
    api_base: Arc<str>,
}

impl RestBackend {
    /// Create a new REST backend.
    pub fn new(config: RestConfig) -> ChannelResult<Self> {
        let user_agent = config
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachments: Vec<AttachmentResponse>,
}

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    filename: String,
    #[serde(default)]
    size: u64,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    retry_after: Option<f64>,
}

/// Turn a non-success response into a [`ChannelError`].
async fn status_error(response: reqwest::Response) -> ChannelError {
    let status = response.status();
    let header_retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok());
    let body = response.text().await.unwrap_or_default();
    let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();
    let message = parsed
        .as_ref()
        .and_then(|b| b.message.clone())
        .unwrap_or(body);

    match status {
        StatusCode::UNAUTHORIZED => ChannelError::Authentication(message),
        StatusCode::TOO_MANY_REQUESTS => ChannelError::RateLimited {
            retry_after_secs: parsed
                .and_then(|b| b.retry_after)
                .or(header_retry_after)
                .unwrap_or(0.0),
        },
        _ => ChannelError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl Backend for RestBackend {
    #[instrument(skip(self, credentials))]
    async fn connect(&self, credentials: &Credentials) -> ChannelResult<Arc<dyn Connection>> {
        let authorization = format!("Bot {}", credentials.token());
        let response = self
            .http
            .get(format!("{}/users/@me", self.api_base))
            .header(AUTHORIZATION, &authorization)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status_error(response).await {
                ChannelError::Status { status, message } if status == 403 => {
                    ChannelError::Authentication(message)
                }
                other => other,
            });
        }

        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidResponse(format!("invalid user response: {e}")))?;
        tracing::debug!(user_id = %user.id, username = ?user.username, "authenticated");

        Ok(Arc::new(RestConnection {
            http: self.http.clone(),
            api_base: Arc::clone(&self.api_base),
            authorization,
            closed: AtomicBool::new(false),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}

struct RestConnection {
    http: reqwest::Client,
    api_base: Arc<str>,
    authorization: String,
    closed: AtomicBool,
}

impl RestConnection {
    fn ensure_open(&self) -> ChannelResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::SessionClosed);
        }
        Ok(())
    }

    fn channel_url(&self, channel_id: &ChannelId, suffix: &str) -> String {
        format!("{}/channels/{}{}", self.api_base, channel_id, suffix)
    }

    async fn get(&self, url: String, query: &[(&str, String)]) -> ChannelResult<reqwest::Response> {
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, &self.authorization)
            .query(query)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(status_error(response).await)
        }
    }
}

fn into_message(message: MessageResponse) -> Message {
    Message {
        id: MessageId::new(message.id),
        caption: message.content,
        attachment: message.attachments.into_iter().next().map(|a| AttachmentRef {
            filename: a.filename,
            size: a.size,
            url: a.url,
        }),
    }
}

#[async_trait]
impl Connection for RestConnection {
    async fn fetch_channel(&self, channel_id: &ChannelId) -> ChannelResult<ChannelInfo> {
        self.ensure_open()?;
        let response = self
            .get(self.channel_url(channel_id, ""), &[])
            .await
            .map_err(|e| match e {
                ChannelError::Status { status, .. } if status == 403 || status == 404 => {
                    ChannelError::ChannelNotFound(channel_id.to_string())
                }
                other => other,
            })?;
        let channel: ChannelResponse = response.json().await.map_err(|e| {
            ChannelError::InvalidResponse(format!("invalid channel response: {e}"))
        })?;
        Ok(ChannelInfo {
            id: ChannelId::new(channel.id),
            name: channel.name,
        })
    }

    #[instrument(skip(self, attachment), fields(filename = %attachment.filename, size = attachment.data.len()))]
    async fn send(
        &self,
        channel_id: &ChannelId,
        attachment: OutgoingAttachment,
    ) -> ChannelResult<MessageId> {
        self.ensure_open()?;
        let payload = json!({
            "content": attachment.caption,
            "attachments": [{ "id": 0, "filename": attachment.filename }],
        });
        let file = Part::bytes(attachment.data.to_vec())
            .file_name(attachment.filename)
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .text("payload_json", payload.to_string())
            .part("files[0]", file);

        let response = self
            .http
            .post(self.channel_url(channel_id, "/messages"))
            .header(AUTHORIZATION, &self.authorization)
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let message: MessageResponse = response.json().await.map_err(|e| {
            ChannelError::InvalidResponse(format!("invalid message response: {e}"))
        })?;
        Ok(MessageId::new(message.id))
    }

    async fn history_page(
        &self,
        channel_id: &ChannelId,
        before: Option<&MessageId>,
        limit: usize,
    ) -> ChannelResult<HistoryPage> {
        self.ensure_open()?;
        let mut query = vec![("limit", limit.to_string())];
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }

        let response = self
            .get(self.channel_url(channel_id, "/messages"), &query)
            .await?;
        let messages: Vec<MessageResponse> = response.json().await.map_err(|e| {
            ChannelError::InvalidResponse(format!("invalid history response: {e}"))
        })?;

        // A short page is the last one.
        let full = messages.len() >= limit;
        let messages: Vec<Message> = messages.into_iter().map(into_message).collect();
        let next_before = if full {
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
        self.ensure_open()?;
        // Attachment URLs point at the CDN, which takes no bot authorization.
        let response = self.http.get(&attachment.url).send().await?;
        match response.status() {
            s if s.is_success() => Ok(response.bytes().await?),
            StatusCode::NOT_FOUND => Err(ChannelError::AttachmentNotFound(attachment.url.clone())),
            _ => Err(status_error(response).await),
        }
    }

    async fn close(&self) -> ChannelResult<()> {
        // Requests are stateless; closing only refuses further use.
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ConnectionHistoryExt;
    use futures::TryStreamExt;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use std::net::TcpListener;

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn backend(server: &MockServer) -> RestBackend {
        RestBackend::new(RestConfig {
            api_base: server.url("/api/v10"),
            request_timeout: Duration::from_secs(5),
            user_agent: None,
        })
        .unwrap()
    }

    fn mock_login(server: &MockServer) {
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v10/users/@me")
                .header("authorization", "Bot good");
            then.status(200)
                .json_body(json!({ "id": "1", "username": "bot" }));
        });
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_token() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v10/users/@me");
            then.status(401)
                .json_body(json!({ "message": "401: Unauthorized", "code": 0 }));
        });

        let err = backend(&server)
            .connect(&Credentials::new("bad"))
            .await
            .err()
            .unwrap();
        match err {
            ChannelError::Authentication(message) => assert_eq!(message, "401: Unauthorized"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_channel_maps_missing_and_forbidden() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start();
        mock_login(&server);
        server.mock(|when, then| {
            when.method(GET).path("/api/v10/channels/404");
            then.status(404).json_body(json!({ "message": "Unknown Channel" }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v10/channels/403");
            then.status(403).json_body(json!({ "message": "Missing Access" }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v10/channels/7");
            then.status(200)
                .json_body(json!({ "id": "7", "name": "storage" }));
        });

        let conn = backend(&server)
            .connect(&Credentials::new("good"))
            .await
            .unwrap();
        for id in ["404", "403"] {
            let err = conn.fetch_channel(&ChannelId::new(id)).await.unwrap_err();
            assert!(matches!(err, ChannelError::ChannelNotFound(ref c) if c == id));
        }
        let info = conn.fetch_channel(&ChannelId::new("7")).await.unwrap();
        assert_eq!(info.name.as_deref(), Some("storage"));
    }

    #[tokio::test]
    async fn test_send_posts_multipart_message() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start();
        mock_login(&server);
        let send = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v10/channels/7/messages")
                .header("authorization", "Bot good")
                .body_contains("payload_json")
                .body_contains("File Hash: abc")
                .body_contains("chunk-1.bin")
                .body_contains("chunk bytes");
            then.status(200).json_body(json!({ "id": "900", "content": "" }));
        });

        let conn = backend(&server)
            .connect(&Credentials::new("good"))
            .await
            .unwrap();
        let id = conn
            .send(
                &ChannelId::new("7"),
                OutgoingAttachment {
                    filename: "chunk-1.bin".into(),
                    caption: "File Hash: abc".into(),
                    data: Bytes::from_static(b"chunk bytes"),
                },
            )
            .await
            .unwrap();
        assert_eq!(id.as_str(), "900");
        send.assert();
    }

    #[tokio::test]
    async fn test_rate_limit_is_reported_not_retried() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start();
        mock_login(&server);
        let limited = server.mock(|when, then| {
            when.method(POST).path("/api/v10/channels/7/messages");
            then.status(429)
                .json_body(json!({ "message": "You are being rate limited.", "retry_after": 1.5 }));
        });

        let conn = backend(&server)
            .connect(&Credentials::new("good"))
            .await
            .unwrap();
        let err = conn
            .send(
                &ChannelId::new("7"),
                OutgoingAttachment {
                    filename: "chunk-1.bin".into(),
                    caption: "x".into(),
                    data: Bytes::from_static(b"x"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::RateLimited { retry_after_secs } if retry_after_secs == 1.5));
        limited.assert_hits(1);
    }

    #[tokio::test]
    async fn test_history_pages_with_before_cursor() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start();
        mock_login(&server);
        let attachment_url = server.url("/cdn/chunk-1.bin");
        // Registered first so the cursor request matches it before the catch-all.
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v10/channels/7/messages")
                .query_param("limit", "2")
                .query_param("before", "20");
            then.status(200)
                .json_body(json!([{ "id": "10", "content": "oldest" }]));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v10/channels/7/messages")
                .query_param("limit", "2");
            then.status(200).json_body(json!([
                { "id": "30", "content": "newest", "attachments": [] },
                { "id": "20", "content": "File Hash: x", "attachments": [
                    { "id": "1", "filename": "chunk-1.bin", "size": 5, "url": attachment_url }
                ] }
            ]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/cdn/chunk-1.bin");
            then.status(200).body("hello");
        });

        let conn = backend(&server)
            .connect(&Credentials::new("good"))
            .await
            .unwrap();
        let channel = ChannelId::new("7");
        let pages: Vec<HistoryPage> = conn.history(&channel, 2, Some(5)).try_collect().await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].next_before.as_ref().map(|m| m.as_str()), Some("20"));
        assert!(pages[1].next_before.is_none());

        let attachment = pages[0].messages[1].attachment.clone().unwrap();
        assert_eq!(attachment.size, 5);
        let data = conn.download(&attachment).await.unwrap();
        assert_eq!(&data[..], b"hello");
    }

    #[tokio::test]
    async fn test_closed_connection_refuses_requests() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start();
        mock_login(&server);

        let conn = backend(&server)
            .connect(&Credentials::new("good"))
            .await
            .unwrap();
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        let err = conn.fetch_channel(&ChannelId::new("7")).await.unwrap_err();
        assert!(matches!(err, ChannelError::SessionClosed));
    }
}
