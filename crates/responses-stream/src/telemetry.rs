use std::time::Duration;

use tracing::{info, warn};

use crate::errors::StreamError;

/// Fire-and-forget receiver for request lifecycle notifications.
///
/// Every method defaults to a no-op. Implementations must not block; they
/// run inline on the executor or the stream worker.
pub trait TelemetrySink: Send + Sync {
    fn on_start(&self, _request_id: uuid::Uuid, _url: &str) {}

    fn on_retry(&self, _request_id: uuid::Uuid, _attempt: u32, _delay: Duration, _error: &StreamError) {}

    fn on_complete(&self, _request_id: uuid::Uuid, _status: u16, _elapsed: Duration) {}

    fn on_fail(&self, _request_id: uuid::Uuid, _error: &StreamError, _elapsed: Duration) {}
}

/// Discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {}

/// Writes notifications as `tracing` records.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn on_start(&self, request_id: uuid::Uuid, url: &str) {
        info!(request_id = %request_id, url, "request started");
    }

    fn on_retry(&self, request_id: uuid::Uuid, attempt: u32, delay: Duration, error: &StreamError) {
        warn!(request_id = %request_id, attempt, delay_ms = delay.as_millis() as u64, error = %error, "request retry scheduled");
    }

    fn on_complete(&self, request_id: uuid::Uuid, status: u16, elapsed: Duration) {
        info!(request_id = %request_id, status, elapsed_ms = elapsed.as_millis() as u64, "request completed");
    }

    fn on_fail(&self, request_id: uuid::Uuid, error: &StreamError, elapsed: Duration) {
        warn!(request_id = %request_id, error = %error, elapsed_ms = elapsed.as_millis() as u64, "request failed");
    }
}
