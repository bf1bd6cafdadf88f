/// Errors surfaced by the client, the request executor, and stream sessions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Transport failed before a status line was received (DNS, connect,
    /// timeout, reset) or while reading the body.
    #[error("network error: {message}")]
    Network { message: String },
    /// Server answered with a non-2xx status.
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    /// In-band `error` frame sent by the server.
    #[error("streaming error [{}]: {message}", code.as_deref().unwrap_or("unknown"))]
    Streaming {
        code: Option<String>,
        message: String,
    },
    /// Terminal `response.failed` event.
    #[error("response failed: {message}")]
    ResponseFailed { message: String },
    /// Final output could not be decoded into the requested type.
    #[error("failed to parse structured output: {0}")]
    StructuredParse(String),
    /// An auto-executed tool returned an error.
    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },
    /// Response shape or event sequencing was invalid.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    /// `start()` was called on a session that already left `NotStarted`.
    #[error("stream already started")]
    AlreadyStarted,
    /// The session was cancelled by the caller.
    #[error("stream cancelled")]
    Cancelled,
}

impl StreamError {
    pub(crate) fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Returns the HTTP status when this is a status error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for 4xx status errors.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(400..=499))
    }

    /// True for 5xx status errors.
    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(500..=599))
    }
}

/// Non-fatal failure to turn one SSE payload into a [`crate::StreamEvent`].
///
/// The session logs these and keeps reading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeFailure {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("payload has no string `type` field")]
    MissingType,
    #[error("invalid `{event_type}` payload: {message}")]
    InvalidPayload { event_type: String, message: String },
}

/// Error returned by a tool body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ToolError {
    pub message: String,
}

impl ToolError {
    /// Creates a tool error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(value: serde_json::Error) -> Self {
        Self::new(format!("invalid tool arguments: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_helpers_classify_ranges() {
        let not_found = StreamError::HttpStatus {
            status: 404,
            body: String::new(),
        };
        let unavailable = StreamError::HttpStatus {
            status: 503,
            body: String::new(),
        };
        assert!(not_found.is_client_error());
        assert!(!not_found.is_server_error());
        assert!(unavailable.is_server_error());
        assert_eq!(StreamError::network("reset").status(), None);
    }

    #[test]
    fn streaming_error_display_falls_back_to_unknown_code() {
        let err = StreamError::Streaming {
            code: None,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "streaming error [unknown]: boom");
    }
}
