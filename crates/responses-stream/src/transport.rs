use std::pin::Pin;

use bytes::Bytes;
use futures::StreamExt as _;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::errors::StreamError;

/// Response body as a stream of raw chunks.
pub type ByteStream = Pin<Box<dyn futures::Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Outbound request. Cloning is cheap, so the executor resends the same
/// value on retry.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Creates a `POST` with a JSON body.
    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Result<Self, StreamError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| StreamError::Validation(format!("failed to serialize request body: {e}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(Self {
            method: Method::POST,
            url: url.into(),
            headers,
            body: Some(Bytes::from(bytes)),
        })
    }

    /// Adds or replaces a header.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, StreamError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| StreamError::Validation(format!("invalid header name `{name}`: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| StreamError::Validation(format!("invalid header value: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets `Authorization: Bearer <token>`, marked sensitive.
    pub fn bearer_auth(self, token: &str) -> Result<Self, StreamError> {
        let mut request = self.header("authorization", &format!("Bearer {token}"))?;
        if let Some(value) = request.headers.get_mut(reqwest::header::AUTHORIZATION) {
            value.set_sensitive(true);
        }
        Ok(request)
    }
}

/// Response head plus an unread body.
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drains the body into a string (lossy UTF-8).
    pub async fn text(mut self) -> Result<String, StreamError> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Sends one request; no retries at this layer.
///
/// Implementations map connect/DNS/timeout/reset failures to
/// [`StreamError::Network`] and return non-2xx responses as `Ok`.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, StreamError>;
}

/// Production transport backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a client with the given overall request timeout.
    pub fn new(timeout: std::time::Duration) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StreamError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, StreamError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        let response = builder
            .send()
            .await
            .map_err(|e| StreamError::network(format!("request failed: {e}")))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| StreamError::network(format!("body read failed: {e}")))),
        );
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
