use serde_json::{Value, json};

use crate::errors::StreamError;

/// Reasoning effort hint for models that support it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

/// Function the model may call, as advertised in the request `tools` list.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionToolDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
    pub strict: bool,
}

impl FunctionToolDefinition {
    pub fn new(name: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters,
            strict: true,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
struct JsonSchemaFormat {
    name: String,
    schema: Value,
}

/// Builder for a Responses API request body.
///
/// ```
/// use responses_stream::ResponseRequest;
///
/// let request = ResponseRequest::new("gpt-5-nano")
///     .instructions("Answer briefly.")
///     .user_text("Say hello")
///     .store(false);
/// let body = request.to_body(true).unwrap();
/// assert_eq!(body["stream"], true);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseRequest {
    model: String,
    instructions: Option<String>,
    input: Vec<Value>,
    text_format: Option<JsonSchemaFormat>,
    tools: Vec<FunctionToolDefinition>,
    temperature: Option<f64>,
    max_output_tokens: Option<u32>,
    store: Option<bool>,
    reasoning_effort: Option<ReasoningEffort>,
    previous_response_id: Option<String>,
}

impl ResponseRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            instructions: None,
            input: Vec::new(),
            text_format: None,
            tools: Vec::new(),
            temperature: None,
            max_output_tokens: None,
            store: None,
            reasoning_effort: None,
            previous_response_id: None,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// System-level instructions sent in the `instructions` field.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn user_text(self, text: impl Into<String>) -> Self {
        self.message("user", text)
    }

    pub fn developer_text(self, text: impl Into<String>) -> Self {
        self.message("developer", text)
    }

    fn message(mut self, role: &str, text: impl Into<String>) -> Self {
        self.input.push(json!({
            "role": role,
            "content": text.into(),
        }));
        self
    }

    /// Appends a raw input item, e.g. a `function_call_output`.
    pub fn input_item(mut self, item: Value) -> Self {
        self.input.push(item);
        self
    }

    /// Requests strict JSON output matching `schema`.
    pub fn json_schema(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.text_format = Some(JsonSchemaFormat {
            name: name.into(),
            schema,
        });
        self
    }

    pub fn has_structured_format(&self) -> bool {
        self.text_format.is_some()
    }

    pub fn function_tool(mut self, tool: FunctionToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    /// Whether the server should store the response. Sent as `false` when
    /// unset.
    pub fn store(mut self, store: bool) -> Self {
        self.store = Some(store);
        self
    }

    pub fn reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    /// Continues the conversation of a stored response.
    pub fn previous_response_id(mut self, id: impl Into<String>) -> Self {
        self.previous_response_id = Some(id.into());
        self
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.model.trim().is_empty() {
            return Err(StreamError::Validation("model must not be empty".into()));
        }
        if self.input.is_empty() {
            return Err(StreamError::Validation(
                "request needs at least one input item".into(),
            ));
        }
        if let Some(temperature) = self.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(StreamError::Validation(format!(
                "temperature must be within 0.0..=2.0, got {temperature}"
            )));
        }
        if let Some(format) = &self.text_format
            && format.name.trim().is_empty()
        {
            return Err(StreamError::Validation("json schema name must not be empty".into()));
        }
        Ok(())
    }

    /// Serializes the request body. `stream` sets the `stream` flag.
    pub fn to_body(&self, stream: bool) -> Result<Value, StreamError> {
        self.validate()?;
        let mut body = json!({
            "model": self.model,
            "input": self.input,
            "stream": stream,
            "store": self.store.unwrap_or(false),
        });
        if let Some(instructions) = self
            .instructions
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            body["instructions"] = json!(instructions);
        }
        if let Some(format) = &self.text_format {
            body["text"] = json!({
                "format": {
                    "type": "json_schema",
                    "name": format.name,
                    "schema": format.schema,
                    "strict": true,
                }
            });
        }
        if !self.tools.is_empty() {
            let tools: Vec<Value> = self
                .tools
                .iter()
                .map(|tool| {
                    let mut value = json!({
                        "type": "function",
                        "name": tool.name,
                        "parameters": tool.parameters,
                        "strict": tool.strict,
                    });
                    if let Some(description) = &tool.description {
                        value["description"] = json!(description);
                    }
                    value
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_output_tokens) = self.max_output_tokens {
            body["max_output_tokens"] = json!(max_output_tokens);
        }
        if let Some(effort) = self.reasoning_effort {
            body["reasoning"] = json!({ "effort": effort });
        }
        if let Some(previous) = &self.previous_response_id {
            body["previous_response_id"] = json!(previous);
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionToolCallOutput;

    #[test]
    fn body_has_stream_and_store_defaults() {
        let body = ResponseRequest::new("gpt-5-nano")
            .user_text("hello")
            .to_body(true)
            .expect("body");
        assert_eq!(body["stream"], true);
        assert_eq!(body["store"], false);
        assert_eq!(body["model"], "gpt-5-nano");
        assert_eq!(body["input"][0]["role"], "user");
        assert!(body.get("instructions").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn options_are_serialized_when_present() {
        let body = ResponseRequest::new("gpt-5-nano")
            .instructions("Be terse.")
            .developer_text("context")
            .user_text("hi")
            .store(true)
            .temperature(0.2)
            .max_output_tokens(64)
            .reasoning_effort(ReasoningEffort::Low)
            .previous_response_id("resp_0")
            .to_body(false)
            .expect("body");
        assert_eq!(body["stream"], false);
        assert_eq!(body["store"], true);
        assert_eq!(body["instructions"], "Be terse.");
        assert_eq!(body["input"][0]["role"], "developer");
        assert_eq!(body["max_output_tokens"], 64);
        assert_eq!(body["reasoning"]["effort"], "low");
        assert_eq!(body["previous_response_id"], "resp_0");
    }

    #[test]
    fn json_schema_and_tools_use_api_shapes() {
        let request = ResponseRequest::new("m")
            .user_text("weather?")
            .json_schema("person", json!({"type": "object"}))
            .function_tool(
                FunctionToolDefinition::new("get_weather", json!({"type": "object"}))
                    .description("Current weather"),
            )
            .input_item(
                FunctionToolCallOutput {
                    call_id: "fc_1".into(),
                    output: "sunny".into(),
                }
                .to_input_item(),
            );
        assert!(request.has_structured_format());
        let body = request.to_body(true).expect("body");
        assert_eq!(body["text"]["format"]["type"], "json_schema");
        assert_eq!(body["text"]["format"]["name"], "person");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["description"], "Current weather");
        assert_eq!(body["input"][1]["type"], "function_call_output");
    }

    #[test]
    fn validation_rejects_empty_model_input_and_bad_temperature() {
        assert!(matches!(
            ResponseRequest::new(" ").user_text("x").to_body(true),
            Err(StreamError::Validation(_))
        ));
        assert!(matches!(
            ResponseRequest::new("m").to_body(true),
            Err(StreamError::Validation(_))
        ));
        assert!(
            ResponseRequest::new("m")
                .user_text("x")
                .temperature(3.5)
                .validate()
                .is_err()
        );
    }
}
