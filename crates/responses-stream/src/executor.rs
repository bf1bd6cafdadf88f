use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use tracing::{debug, warn};

use crate::errors::StreamError;
use crate::retry::RetryPolicy;
use crate::telemetry::{NoopTelemetry, TelemetrySink};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Fully read response returned by the buffered and blocking entry points.
#[derive(Clone, Debug)]
pub struct BufferedResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BufferedResponse {
    /// Decodes the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, StreamError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| StreamError::Protocol(format!("invalid JSON response body: {e}")))
    }
}

/// Sends requests through an [`HttpTransport`], retrying transient failures
/// according to a shared [`RetryPolicy`].
///
/// Retries resend the identical request, so a non-idempotent call can be
/// applied more than once server-side.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    policy: Arc<RetryPolicy>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy: Arc::new(policy),
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    /// Replaces the telemetry sink.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends `request`, retrying while the policy allows. Returns the first
    /// 2xx response with its body unread, or the last classified error.
    pub async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, StreamError> {
        let request_id = uuid::Uuid::new_v4();
        let started = Instant::now();
        self.telemetry.on_start(request_id, &request.url);

        let mut attempt = 0_u32;
        loop {
            let error = match self.transport.send(request).await {
                Ok(response) if response.is_success() => {
                    debug!(request_id = %request_id, attempt, status = response.status, "request succeeded");
                    self.telemetry
                        .on_complete(request_id, response.status, started.elapsed());
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status;
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<unreadable body>".to_string());
                    StreamError::HttpStatus { status, body }
                }
                Err(err) => err,
            };

            if attempt < self.policy.max_retries() && self.policy.should_retry(&error) {
                attempt += 1;
                let delay = self.policy.delay_for_attempt(attempt);
                warn!(request_id = %request_id, attempt, delay_ms = delay.as_millis() as u64, error = %error, "transient failure, retrying");
                self.telemetry.on_retry(request_id, attempt, delay, &error);
                tokio::time::sleep(delay).await;
                continue;
            }

            self.telemetry.on_fail(request_id, &error, started.elapsed());
            return Err(error);
        }
    }

    /// Like [`RequestExecutor::execute`] but reads the whole body.
    pub async fn execute_buffered(
        &self,
        request: &HttpRequest,
    ) -> Result<BufferedResponse, StreamError> {
        let response = self.execute(request).await?;
        let status = response.status;
        let headers = response.headers.clone();
        let body = response.text().await?;
        Ok(BufferedResponse {
            status,
            headers,
            body: Bytes::from(body),
        })
    }

    /// Runs [`RequestExecutor::execute_buffered`] to completion on a private
    /// current-thread runtime.
    ///
    /// Must be called from synchronous code; inside a Tokio runtime it
    /// returns a `Config` error instead of blocking a worker.
    pub fn execute_blocking(&self, request: &HttpRequest) -> Result<BufferedResponse, StreamError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(StreamError::Config(
                "execute_blocking called from inside an async runtime; use execute instead".into(),
            ));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StreamError::Config(format!("failed to build blocking runtime: {e}")))?;
        runtime.block_on(self.execute_buffered(request))
    }

    /// Runs [`RequestExecutor::execute`] on a background task.
    pub fn spawn(
        &self,
        request: HttpRequest,
    ) -> tokio::task::JoinHandle<Result<HttpResponse, StreamError>> {
        let executor = self.clone();
        tokio::spawn(async move { executor.execute(&request).await })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures::{StreamExt, stream};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub(crate) enum Scripted {
        Status(u16, &'static str),
        Body(Vec<&'static str>),
        /// Yields the chunks, then keeps the body open forever.
        OpenBody(Vec<&'static str>),
        /// Yields the chunks, then fails the body read.
        BodyThenError(Vec<&'static str>),
        NetworkFailure,
    }

    /// Replays scripted outcomes in order and counts calls.
    pub(crate) struct ScriptedTransport {
        pub calls: Arc<AtomicUsize>,
        script: Mutex<VecDeque<Scripted>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(script: Vec<Scripted>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait::async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, _request: &HttpRequest) -> Result<HttpResponse, StreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().expect("script lock").pop_front();
            match next {
                Some(Scripted::Status(status, body)) => Ok(HttpResponse {
                    status,
                    headers: HeaderMap::new(),
                    body: Box::pin(stream::iter(vec![Ok(Bytes::from_static(body.as_bytes()))])),
                }),
                Some(Scripted::Body(chunks)) => Ok(HttpResponse {
                    status: 200,
                    headers: HeaderMap::new(),
                    body: Box::pin(stream::iter(
                        chunks
                            .into_iter()
                            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                            .collect::<Vec<_>>(),
                    )),
                }),
                Some(Scripted::OpenBody(chunks)) => Ok(HttpResponse {
                    status: 200,
                    headers: HeaderMap::new(),
                    body: Box::pin(
                        stream::iter(
                            chunks
                                .into_iter()
                                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                                .collect::<Vec<_>>(),
                        )
                        .chain(stream::pending()),
                    ),
                }),
                Some(Scripted::BodyThenError(chunks)) => Ok(HttpResponse {
                    status: 200,
                    headers: HeaderMap::new(),
                    body: Box::pin(stream::iter(
                        chunks
                            .into_iter()
                            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                            .chain(std::iter::once(Err(StreamError::network("body reset"))))
                            .collect::<Vec<_>>(),
                    )),
                }),
                Some(Scripted::NetworkFailure) => Err(StreamError::network("connection reset")),
                None => Err(StreamError::Protocol("script exhausted".into())),
            }
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(max_retries)
            .initial_delay(Duration::from_millis(10))
            .max_delay(Duration::from_millis(40))
            .build()
            .expect("policy")
    }

    fn request() -> HttpRequest {
        HttpRequest::post_json("http://localhost/v1/responses", &serde_json::json!({}))
            .expect("request")
    }

    #[tokio::test(start_paused = true)]
    async fn retries_503_then_succeeds() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Scripted::Status(503, "busy"),
            Scripted::Body(vec!["ok"]),
        ]));
        let calls = transport.calls.clone();
        let executor = RequestExecutor::new(transport, fast_policy(1));
        let response = executor.execute(&request()).await.expect("response");
        assert_eq!(response.status, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_status_is_surfaced_immediately() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Scripted::Status(400, "bad request"),
            Scripted::Body(vec!["never"]),
        ]));
        let calls = transport.calls.clone();
        let executor = RequestExecutor::new(transport, fast_policy(3));
        let err = executor.execute(&request()).await.expect_err("should fail");
        assert_eq!(
            err,
            StreamError::HttpStatus {
                status: 400,
                body: "bad request".into()
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn network_failures_exhaust_retries() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Scripted::NetworkFailure,
            Scripted::NetworkFailure,
            Scripted::NetworkFailure,
        ]));
        let calls = transport.calls.clone();
        let executor = RequestExecutor::new(transport, fast_policy(2));
        let err = executor.execute(&request()).await.expect_err("should fail");
        assert!(matches!(err, StreamError::Network { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_policy_makes_one_attempt() {
        let transport = Arc::new(ScriptedTransport::new(vec![Scripted::Status(429, "slow down")]));
        let calls = transport.calls.clone();
        let executor = RequestExecutor::new(transport, RetryPolicy::disabled());
        let err = executor.execute(&request()).await.expect_err("should fail");
        assert_eq!(err.status(), Some(429));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[derive(Default)]
    struct RecordingTelemetry {
        retries: AtomicUsize,
        completes: AtomicUsize,
    }

    impl TelemetrySink for RecordingTelemetry {
        fn on_retry(&self, _: uuid::Uuid, _: u32, _: Duration, _: &StreamError) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }

        fn on_complete(&self, _: uuid::Uuid, _: u16, _: Duration) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn telemetry_sees_retry_and_completion() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let transport = Arc::new(ScriptedTransport::new(vec![
            Scripted::NetworkFailure,
            Scripted::Body(vec!["{\"a\":1}"]),
        ]));
        let executor =
            RequestExecutor::new(transport, fast_policy(1)).with_telemetry(telemetry.clone());
        let buffered = executor.execute_buffered(&request()).await.expect("buffered");
        assert_eq!(
            buffered.json::<serde_json::Value>().expect("json"),
            serde_json::json!({"a":1})
        );
        assert_eq!(telemetry.retries.load(Ordering::SeqCst), 1);
        assert_eq!(telemetry.completes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_runs_in_background() {
        let transport = Arc::new(ScriptedTransport::new(vec![Scripted::Body(vec!["x"])]));
        let executor = RequestExecutor::new(transport, fast_policy(0));
        let handle = executor.spawn(request());
        let response = handle.await.expect("join").expect("response");
        assert_eq!(response.text().await.expect("text"), "x");
    }

    #[test]
    fn execute_blocking_works_outside_runtime() {
        let transport = Arc::new(ScriptedTransport::new(vec![Scripted::Body(vec!["he", "llo"])]));
        let executor = RequestExecutor::new(transport, fast_policy(0));
        let buffered = executor.execute_blocking(&request()).expect("blocking");
        assert_eq!(&buffered.body[..], b"hello");
    }

    #[tokio::test]
    async fn execute_blocking_refuses_inside_runtime() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let executor = RequestExecutor::new(transport, fast_policy(0));
        assert!(matches!(
            executor.execute_blocking(&request()),
            Err(StreamError::Config(_))
        ));
    }
}
