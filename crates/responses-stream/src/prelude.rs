//! Common imports for typical client usage.
pub use crate::{
    CancelHandle, ClientConfig, FunctionToolCallOutput, FunctionToolDefinition, FunctionToolStore,
    ParsedResponse, ReasoningEffort, Responder, Response, ResponseRequest, ResponseStream,
    RetryPolicy, StreamError, StreamEvent, StreamState, typed_tool,
};
