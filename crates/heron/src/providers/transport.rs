//! Outbound request plumbing for the chat completions client.
//!
//! Upstream SDK convention serializes empty-string fields with `omitempty`
//! semantics, but the chat completions endpoint rejects tool messages that
//! lack a `content` field. `ToolContentNormalizer` repairs such payloads at
//! the transport seam, so every sender composed behind it emits compliant
//! bodies without the conversion layer having to know.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_LENGTH};
use reqwest::{Body, Client, Method, Request, Response};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request body is streamed and cannot be inspected")]
    UnreadableBody,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// The seam between request construction and the wire. Implementations must
/// be safe to share across concurrent in-flight requests.
#[async_trait]
pub trait RequestSender: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}

/// Leaf sender backed directly by a reqwest client.
pub struct ClientSender {
    client: Client,
}

impl ClientSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RequestSender for ClientSender {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        Ok(self.client.execute(request).await?)
    }
}

/// Wraps a sender and patches tool messages that are missing the `content`
/// field before the request leaves the process. Holds no state besides the
/// delegate, so one instance serves any number of concurrent requests.
pub struct ToolContentNormalizer<S> {
    inner: S,
}

impl<S> ToolContentNormalizer<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: RequestSender> RequestSender for ToolContentNormalizer<S> {
    async fn send(&self, mut request: Request) -> Result<Response, TransportError> {
        normalize_request(&mut request)?;
        self.inner.send(request).await
    }
}

/// Rewrites the request body in place when it is a chat payload containing
/// tool messages without `content`. Requests that are not POST, have no
/// body, or do not parse as the expected shape pass through untouched.
pub fn normalize_request(request: &mut Request) -> Result<(), TransportError> {
    if request.method() != &Method::POST {
        return Ok(());
    }
    let body = match request.body() {
        Some(body) => body,
        None => return Ok(()),
    };
    // Chat payloads are small and buffered; a streaming body here means the
    // caller handed us something we cannot rewrite without consuming it.
    let bytes = body.as_bytes().ok_or(TransportError::UnreadableBody)?;

    if let Some(patched) = fill_missing_tool_content(bytes) {
        let content_length = HeaderValue::from(patched.len() as u64);
        *request.body_mut() = Some(Body::from(patched));
        request.headers_mut().insert(CONTENT_LENGTH, content_length);
    }
    Ok(())
}

/// Returns the re-encoded payload when at least one tool message was
/// patched, None when the body should be forwarded as-is. Parse failures
/// fall into the None case: normalization is best-effort and must never
/// drop or corrupt a request it does not understand.
fn fill_missing_tool_content(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut payload: Value = serde_json::from_slice(bytes).ok()?;
    let messages = payload.get_mut("messages")?.as_array_mut()?;

    let mut patched = false;
    for message in messages.iter_mut() {
        let object = match message.as_object_mut() {
            Some(object) => object,
            None => continue,
        };
        if object.get("role").and_then(Value::as_str) != Some("tool") {
            continue;
        }
        // Presence of the key is all the endpoint checks; a null or
        // non-string value is left alone.
        if !object.contains_key("content") {
            object.insert("content".to_string(), Value::String(String::new()));
            patched = true;
        }
    }

    if !patched {
        return None;
    }
    serde_json::to_vec(&payload).ok()
}
