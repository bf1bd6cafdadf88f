//! Streaming client for the Responses API.
//!
//! A [`Responder`] turns a [`ResponseRequest`] into either a one-shot
//! [`Response`] or a [`ResponseStream`]: a single-use session that reads the
//! server-sent event body on a Tokio task, decodes each frame into a typed
//! [`StreamEvent`], and fans it out to registered observers. Opening the
//! connection is retried with exponential backoff per [`RetryPolicy`].
//!
//! # Streaming text
//!
//! ```no_run
//! use responses_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), StreamError> {
//! let responder = Responder::from_env()?;
//! let request = ResponseRequest::new("gpt-5-nano")
//!     .instructions("Answer briefly.")
//!     .user_text("Say hello");
//!
//! let text = responder
//!     .stream(&request)?
//!     .on_text_delta(|delta| print!("{delta}"))
//!     .on_error(|err| eprintln!("stream error: {err}"))
//!     .text()
//!     .await?;
//! println!("\n{text}");
//! # Ok(())
//! # }
//! ```

/// Client configuration and environment loading.
pub mod config;
/// Public error types.
pub mod errors;
/// Typed stream events and the event-type registry.
pub mod events;
/// Retrying request executor.
pub mod executor;
/// Optional tracing subscriber setup.
pub mod observability;
/// Best-effort parsing of incomplete JSON objects.
pub mod partial_json;
/// Common imports for typical usage.
pub mod prelude;
/// Request body builder.
pub mod request;
/// Client entry point.
pub mod responder;
/// Response object model.
pub mod response;
/// Exponential backoff policy.
pub mod retry;
/// Server-sent event line framing.
pub mod sse;
/// Stream session, observers and cancellation.
pub mod stream;
/// Request lifecycle notifications.
pub mod telemetry;
/// Function tools and auto-execution.
pub mod tools;
/// HTTP transport seam.
pub mod transport;

pub use config::ClientConfig;
pub use errors::{DecodeFailure, StreamError, ToolError};
pub use events::{StreamEvent, decode_event};
pub use executor::{BufferedResponse, RequestExecutor};
pub use request::{FunctionToolDefinition, ReasoningEffort, ResponseRequest};
pub use responder::Responder;
pub use response::{ParsedResponse, Response, ResponseStatus};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use stream::{CancelHandle, ResponseStream, StreamState};
pub use telemetry::{NoopTelemetry, TelemetrySink, TracingTelemetry};
pub use tools::{
    FunctionTool, FunctionToolCall, FunctionToolCallOutput, FunctionToolStore, ToolExecutor,
    typed_tool,
};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
