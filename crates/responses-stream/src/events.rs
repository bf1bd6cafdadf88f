//! Typed Responses API stream events.
//!
//! Every payload is a JSON object with a `type` discriminator and a
//! `sequence_number`. [`decode_event`] looks the discriminator up in a
//! static registry generated alongside the [`StreamEvent`] enum, so adding a
//! variant and its decoder is a single table entry.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::DecodeFailure;
use crate::response::Response;

/// `response.created`, `.queued`, `.in_progress`, `.completed`, `.failed`,
/// `.incomplete`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResponseLifecycleEvent {
    pub sequence_number: u64,
    pub response: Response,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OutputItemEvent {
    pub sequence_number: u64,
    pub output_index: u32,
    #[serde(default)]
    pub item: Value,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ContentPartEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub item_id: String,
    pub output_index: u32,
    pub content_index: u32,
    #[serde(default)]
    pub part: Value,
}

/// Text fragment for `output_text`, `refusal`, function/MCP arguments,
/// code interpreter code, custom tool input and reasoning text.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DeltaEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub output_index: u32,
    #[serde(default)]
    pub content_index: Option<u32>,
    pub delta: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextDoneEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub output_index: u32,
    #[serde(default)]
    pub content_index: Option<u32>,
    #[serde(default)]
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnnotationAddedEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub item_id: String,
    pub output_index: u32,
    pub content_index: u32,
    pub annotation_index: u32,
    #[serde(default)]
    pub annotation: Value,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RefusalDoneEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub item_id: String,
    pub output_index: u32,
    pub content_index: u32,
    #[serde(default)]
    pub refusal: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionCallArgumentsDoneEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub item_id: String,
    pub output_index: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// Progress marker for hosted tool calls (search, code interpreter, image
/// generation, MCP).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolCallProgressEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub item_id: String,
    pub output_index: u32,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CodeDoneEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub item_id: String,
    pub output_index: u32,
    #[serde(default)]
    pub code: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReasoningSummaryPartEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub item_id: String,
    pub output_index: u32,
    pub summary_index: u32,
    #[serde(default)]
    pub part: Value,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReasoningSummaryTextDeltaEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub item_id: String,
    pub output_index: u32,
    pub summary_index: u32,
    pub delta: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReasoningSummaryTextDoneEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub item_id: String,
    pub output_index: u32,
    pub summary_index: u32,
    #[serde(default)]
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PartialImageEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub item_id: String,
    pub output_index: u32,
    pub partial_image_index: u32,
    #[serde(default)]
    pub partial_image_b64: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct McpArgumentsDoneEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub item_id: String,
    pub output_index: u32,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CustomToolInputDoneEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub item_id: String,
    pub output_index: u32,
    #[serde(default)]
    pub input: String,
}

/// Protocol-level `error` frame.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StreamingErrorEvent {
    #[serde(default)]
    pub sequence_number: u64,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub param: Option<String>,
}

/// Event whose `type` has no registered decoder. The raw payload is kept.
#[derive(Clone, Debug, PartialEq)]
pub struct UnknownEvent {
    pub event_type: String,
    pub sequence_number: u64,
    pub payload: Value,
}

type DecodeFn = fn(Value) -> Result<StreamEvent, serde_json::Error>;

macro_rules! stream_events {
    ($($tag:literal => $variant:ident($payload:ty)),+ $(,)?) => {
        /// Closed set of stream events, keyed by the wire `type` string.
        #[derive(Clone, Debug, PartialEq)]
        pub enum StreamEvent {
            $($variant($payload),)+
            /// Forward-compatible catch-all for tags added after this crate.
            Unknown(UnknownEvent),
        }

        impl StreamEvent {
            /// Wire discriminator of this event.
            pub fn event_type(&self) -> &str {
                match self {
                    $(Self::$variant(_) => $tag,)+
                    Self::Unknown(e) => &e.event_type,
                }
            }

            pub fn sequence_number(&self) -> u64 {
                match self {
                    $(Self::$variant(e) => e.sequence_number,)+
                    Self::Unknown(e) => e.sequence_number,
                }
            }
        }

        static EVENT_DECODERS: &[(&str, DecodeFn)] = &[
            $(($tag, |value| decode_as::<$payload>(value).map(StreamEvent::$variant)),)+
        ];
    };
}

stream_events! {
    "response.created" => ResponseCreated(ResponseLifecycleEvent),
    "response.queued" => ResponseQueued(ResponseLifecycleEvent),
    "response.in_progress" => ResponseInProgress(ResponseLifecycleEvent),
    "response.completed" => ResponseCompleted(ResponseLifecycleEvent),
    "response.failed" => ResponseFailed(ResponseLifecycleEvent),
    "response.incomplete" => ResponseIncomplete(ResponseLifecycleEvent),

    "response.output_item.added" => OutputItemAdded(OutputItemEvent),
    "response.output_item.done" => OutputItemDone(OutputItemEvent),
    "response.content_part.added" => ContentPartAdded(ContentPartEvent),
    "response.content_part.done" => ContentPartDone(ContentPartEvent),

    "response.output_text.delta" => OutputTextDelta(DeltaEvent),
    "response.output_text.done" => OutputTextDone(TextDoneEvent),
    "response.output_text.annotation.added" => OutputTextAnnotationAdded(AnnotationAddedEvent),
    "response.refusal.delta" => RefusalDelta(DeltaEvent),
    "response.refusal.done" => RefusalDone(RefusalDoneEvent),

    "response.function_call_arguments.delta" => FunctionCallArgumentsDelta(DeltaEvent),
    "response.function_call_arguments.done" => FunctionCallArgumentsDone(FunctionCallArgumentsDoneEvent),

    "response.file_search_call.in_progress" => FileSearchCallInProgress(ToolCallProgressEvent),
    "response.file_search_call.searching" => FileSearchCallSearching(ToolCallProgressEvent),
    "response.file_search_call.completed" => FileSearchCallCompleted(ToolCallProgressEvent),
    "response.web_search_call.in_progress" => WebSearchCallInProgress(ToolCallProgressEvent),
    "response.web_search_call.searching" => WebSearchCallSearching(ToolCallProgressEvent),
    "response.web_search_call.completed" => WebSearchCallCompleted(ToolCallProgressEvent),

    "response.code_interpreter_call.in_progress" => CodeInterpreterCallInProgress(ToolCallProgressEvent),
    "response.code_interpreter_call.interpreting" => CodeInterpreterCallInterpreting(ToolCallProgressEvent),
    "response.code_interpreter_call.completed" => CodeInterpreterCallCompleted(ToolCallProgressEvent),
    "response.code_interpreter_call_code.delta" => CodeInterpreterCallCodeDelta(DeltaEvent),
    "response.code_interpreter_call_code.done" => CodeInterpreterCallCodeDone(CodeDoneEvent),

    "response.reasoning_summary_part.added" => ReasoningSummaryPartAdded(ReasoningSummaryPartEvent),
    "response.reasoning_summary_part.done" => ReasoningSummaryPartDone(ReasoningSummaryPartEvent),
    "response.reasoning_summary_text.delta" => ReasoningSummaryTextDelta(ReasoningSummaryTextDeltaEvent),
    "response.reasoning_summary_text.done" => ReasoningSummaryTextDone(ReasoningSummaryTextDoneEvent),
    "response.reasoning_text.delta" => ReasoningTextDelta(DeltaEvent),
    "response.reasoning_text.done" => ReasoningTextDone(TextDoneEvent),

    "response.image_generation_call.in_progress" => ImageGenerationCallInProgress(ToolCallProgressEvent),
    "response.image_generation_call.generating" => ImageGenerationCallGenerating(ToolCallProgressEvent),
    "response.image_generation_call.partial_image" => ImageGenerationCallPartialImage(PartialImageEvent),
    "response.image_generation_call.completed" => ImageGenerationCallCompleted(ToolCallProgressEvent),

    "response.mcp_call.in_progress" => McpCallInProgress(ToolCallProgressEvent),
    "response.mcp_call.completed" => McpCallCompleted(ToolCallProgressEvent),
    "response.mcp_call.failed" => McpCallFailed(ToolCallProgressEvent),
    "response.mcp_call_arguments.delta" => McpCallArgumentsDelta(DeltaEvent),
    "response.mcp_call_arguments.done" => McpCallArgumentsDone(McpArgumentsDoneEvent),
    "response.mcp_list_tools.in_progress" => McpListToolsInProgress(ToolCallProgressEvent),
    "response.mcp_list_tools.completed" => McpListToolsCompleted(ToolCallProgressEvent),
    "response.mcp_list_tools.failed" => McpListToolsFailed(ToolCallProgressEvent),

    "response.custom_tool_call_input.delta" => CustomToolCallInputDelta(DeltaEvent),
    "response.custom_tool_call_input.done" => CustomToolCallInputDone(CustomToolInputDoneEvent),

    "error" => Error(StreamingErrorEvent),
}

fn decode_as<P: DeserializeOwned>(value: Value) -> Result<P, serde_json::Error> {
    serde_json::from_value(value)
}

impl StreamEvent {
    /// True for events that end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ResponseCompleted(_) | Self::ResponseFailed(_) | Self::Error(_)
        )
    }
}

/// True when `event_type` has a registered decoder.
pub fn is_known_event_type(event_type: &str) -> bool {
    EVENT_DECODERS.iter().any(|(tag, _)| *tag == event_type)
}

/// Decodes one SSE payload. Unregistered discriminators become
/// [`StreamEvent::Unknown`]; malformed payloads are reported as
/// [`DecodeFailure`] so the caller can skip them.
pub fn decode_event(payload: &str) -> Result<StreamEvent, DecodeFailure> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| DecodeFailure::InvalidJson(e.to_string()))?;
    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeFailure::MissingType)?
        .to_owned();
    let Some((_, decode)) = EVENT_DECODERS.iter().find(|(tag, _)| *tag == event_type) else {
        let sequence_number = value
            .get("sequence_number")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        return Ok(StreamEvent::Unknown(UnknownEvent {
            event_type,
            sequence_number,
            payload: value,
        }));
    };
    decode(value).map_err(|e| DecodeFailure::InvalidPayload {
        event_type,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_text_delta() {
        let event = decode_event(
            r#"{"type":"response.output_text.delta","sequence_number":4,"item_id":"msg_1","output_index":0,"content_index":0,"delta":"He"}"#,
        )
        .expect("decode");
        assert_eq!(event.event_type(), "response.output_text.delta");
        assert_eq!(event.sequence_number(), 4);
        match event {
            StreamEvent::OutputTextDelta(delta) => {
                assert_eq!(delta.delta, "He");
                assert_eq!(delta.content_index, Some(0));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn decodes_completed_with_embedded_response() {
        let event = decode_event(
            r#"{"type":"response.completed","sequence_number":9,"response":{"id":"resp_1","status":"completed","output":[]}}"#,
        )
        .expect("decode");
        assert!(event.is_terminal());
        let StreamEvent::ResponseCompleted(completed) = event else {
            panic!("expected completed");
        };
        assert_eq!(completed.response.id, "resp_1");
    }

    #[test]
    fn decodes_function_call_arguments_done() {
        let event = decode_event(
            r#"{"type":"response.function_call_arguments.done","sequence_number":3,"item_id":"fc_1","output_index":1,"name":"get_weather","arguments":"{\"city\":\"Oslo\"}"}"#,
        )
        .expect("decode");
        let StreamEvent::FunctionCallArgumentsDone(done) = event else {
            panic!("expected arguments done");
        };
        assert_eq!(done.name, "get_weather");
        assert_eq!(done.arguments, r#"{"city":"Oslo"}"#);
    }

    #[test]
    fn decodes_error_frame() {
        let event = decode_event(r#"{"type":"error","sequence_number":2,"code":"server_error","message":"boom"}"#)
            .expect("decode");
        assert_eq!(
            event,
            StreamEvent::Error(StreamingErrorEvent {
                sequence_number: 2,
                code: Some("server_error".into()),
                message: "boom".into(),
                param: None,
            })
        );
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let event = decode_event(
            r#"{"type":"response.web_search_call.searching","sequence_number":1,"item_id":"ws_1","output_index":0,"brand_new":true}"#,
        )
        .expect("decode");
        assert!(matches!(event, StreamEvent::WebSearchCallSearching(_)));
    }

    #[test]
    fn unknown_type_decodes_to_unknown_variant() {
        let event = decode_event(r#"{"type":"response.some_future_event","sequence_number":7,"x":1}"#)
            .expect("unknown");
        assert_eq!(event.event_type(), "response.some_future_event");
        assert_eq!(event.sequence_number(), 7);
        assert!(!event.is_terminal());
        let StreamEvent::Unknown(unknown) = event else {
            panic!("expected unknown variant");
        };
        assert_eq!(unknown.payload["x"], 1);
    }

    #[test]
    fn invalid_json_and_missing_type_are_decode_failures() {
        assert!(matches!(decode_event("{not json"), Err(DecodeFailure::InvalidJson(_))));
        assert_eq!(decode_event(r#"{"sequence_number":1}"#), Err(DecodeFailure::MissingType));
        assert!(matches!(
            decode_event(r#"{"type":"response.output_text.delta","sequence_number":1}"#),
            Err(DecodeFailure::InvalidPayload { .. })
        ));
    }

    #[test]
    fn registry_tags_are_unique_and_round_trip() {
        let mut seen = std::collections::HashSet::new();
        for (tag, _) in EVENT_DECODERS {
            assert!(seen.insert(*tag), "duplicate tag {tag}");
            assert!(is_known_event_type(tag));
        }
        assert_eq!(seen.len(), 49);
        assert!(!is_known_event_type("response.some_future_event"));
    }
}
