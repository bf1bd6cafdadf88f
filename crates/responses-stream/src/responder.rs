use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::errors::StreamError;
use crate::executor::RequestExecutor;
use crate::request::ResponseRequest;
use crate::response::{ParsedResponse, Response};
use crate::stream::ResponseStream;
use crate::telemetry::TelemetrySink;
use crate::transport::{HttpRequest, HttpTransport, ReqwestTransport};

/// Client entry point: builds requests from a [`ClientConfig`] and runs them
/// one-shot or as streams.
#[derive(Clone)]
pub struct Responder {
    config: ClientConfig,
    executor: RequestExecutor,
}

impl Responder {
    /// Creates a responder backed by `reqwest`.
    pub fn new(config: ClientConfig) -> Result<Self, StreamError> {
        config.validate()?;
        let transport = ReqwestTransport::new(config.timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Creates a responder using `OPENAI_API_KEY` and friends.
    pub fn from_env() -> Result<Self, StreamError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Creates a responder over a custom transport (proxies, tests).
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(transport, config.retry_policy.clone());
        Self { config, executor }
    }

    /// Replaces the telemetry sink used by every request.
    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.executor = self.executor.with_telemetry(sink);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    fn http_request(
        &self,
        request: &ResponseRequest,
        stream: bool,
    ) -> Result<HttpRequest, StreamError> {
        let body = request.to_body(stream)?;
        let http = HttpRequest::post_json(self.config.responses_url(), &body)?
            .bearer_auth(&self.config.api_key)?;
        if stream {
            http.header("accept", "text/event-stream")
        } else {
            Ok(http)
        }
    }

    /// Sends a non-streaming request and returns the full response.
    pub async fn respond(&self, request: &ResponseRequest) -> Result<Response, StreamError> {
        let http = self.http_request(request, false)?;
        debug!(model = request.model(), "sending response request");
        self.executor.execute_buffered(&http).await?.json()
    }

    /// One-shot structured call; the output text is decoded into `T`.
    pub async fn respond_parsed<T: DeserializeOwned>(
        &self,
        request: &ResponseRequest,
    ) -> Result<ParsedResponse<T>, StreamError> {
        self.respond(request).await?.parse()
    }

    /// Blocking variant of [`Responder::respond`] for synchronous callers.
    /// Returns a `Config` error when called inside a Tokio runtime.
    pub fn respond_blocking(&self, request: &ResponseRequest) -> Result<Response, StreamError> {
        let http = self.http_request(request, false)?;
        self.executor.execute_blocking(&http)?.json()
    }

    /// Prepares a text stream. Nothing is sent until the stream starts.
    pub fn stream(&self, request: &ResponseRequest) -> Result<ResponseStream, StreamError> {
        let http = self.http_request(request, true)?;
        Ok(ResponseStream::new(self.executor.clone(), http))
    }

    /// Prepares a stream whose final text is decoded into `T`.
    pub fn stream_parsed<T>(
        &self,
        request: &ResponseRequest,
    ) -> Result<ResponseStream<T>, StreamError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        if !request.has_structured_format() {
            warn!(model = request.model(), "structured stream requested without a json_schema format");
        }
        let http = self.http_request(request, true)?;
        Ok(ResponseStream::structured(self.executor.clone(), http))
    }
}
