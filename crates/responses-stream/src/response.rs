use serde::de::DeserializeOwned;

use crate::errors::StreamError;

/// Lifecycle status of a response object.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Incomplete,
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// Error body embedded in a failed response.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResponseErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Token accounting.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Response object carried by lifecycle events and returned by one-shot
/// calls. Output items stay as raw JSON; unknown top-level fields are kept
/// in `extra`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub status: Option<ResponseStatus>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub output: Vec<serde_json::Value>,
    #[serde(default)]
    pub error: Option<ResponseErrorBody>,
    #[serde(default)]
    pub incomplete_details: Option<serde_json::Value>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Response {
    /// Concatenated text of every `message` output item, falling back to a
    /// top-level `output_text` field.
    pub fn output_text(&self) -> Option<String> {
        let mut parts = Vec::new();
        for item in &self.output {
            if item.get("type").and_then(|v| v.as_str()) != Some("message") {
                continue;
            }
            if let Some(content) = item.get("content").and_then(|v| v.as_array()) {
                for c in content {
                    if let Some(text) = c.get("text").and_then(|v| v.as_str()) {
                        parts.push(text);
                    }
                }
            }
        }
        if !parts.is_empty() {
            return Some(parts.concat());
        }
        self.extra
            .get("output_text")
            .and_then(|v| v.as_str())
            .map(ToOwned::to_owned)
    }

    /// Message from the embedded error body, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_ref()
            .map(|e| e.message.as_str())
            .filter(|m| !m.is_empty())
    }

    /// Decodes the output text into `T`.
    pub fn parse<T: DeserializeOwned>(self) -> Result<ParsedResponse<T>, StreamError> {
        let text = self
            .output_text()
            .ok_or_else(|| StreamError::StructuredParse("response has no output text".into()))?;
        let parsed = parse_structured(&text)?;
        Ok(ParsedResponse {
            response: self,
            parsed,
        })
    }
}

/// A terminal response plus its decoded structured output.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedResponse<T> {
    pub response: Response,
    pub parsed: T,
}

pub(crate) fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, StreamError> {
    serde_json::from_str(text.trim()).map_err(|e| StreamError::StructuredParse(e.to_string()))
}
