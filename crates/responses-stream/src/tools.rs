use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::errors::{StreamError, ToolError};

/// A completed function call detected in the stream.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FunctionToolCall {
    pub call_id: String,
    pub name: String,
    /// Raw JSON arguments as sent by the model.
    pub arguments: String,
}

/// Result of running a tool, ready to be sent back as a
/// `function_call_output` item.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FunctionToolCallOutput {
    pub call_id: String,
    pub output: String,
}

impl FunctionToolCallOutput {
    /// Serializes as a `function_call_output` input item.
    pub fn to_input_item(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function_call_output",
            "call_id": self.call_id,
            "output": self.output,
        })
    }
}

/// Lookup-and-invoke seam used by stream sessions to auto-execute tools.
///
/// `execute` runs inline on the stream worker; a slow tool delays delivery
/// of every later event in that session.
pub trait ToolExecutor: Send + Sync {
    fn contains(&self, name: &str) -> bool;

    fn execute(&self, call: &FunctionToolCall) -> Result<FunctionToolCallOutput, ToolError>;
}

/// A named function the model may call.
pub trait FunctionTool: Send + Sync {
    fn name(&self) -> &str;

    /// Runs the tool on raw JSON arguments and returns its text output.
    fn call(&self, arguments: &str) -> Result<String, ToolError>;
}

struct TypedTool<P, F> {
    name: String,
    handler: F,
    _params: std::marker::PhantomData<fn(P)>,
}

impl<P, F> FunctionTool for TypedTool<P, F>
where
    P: DeserializeOwned,
    F: Fn(P) -> Result<String, ToolError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, arguments: &str) -> Result<String, ToolError> {
        let arguments = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };
        let params: P = serde_json::from_str(arguments)?;
        (self.handler)(params)
    }
}

/// Builds a tool whose JSON arguments are decoded into `P` before `handler`
/// runs.
pub fn typed_tool<P, F>(name: impl Into<String>, handler: F) -> Arc<dyn FunctionTool>
where
    P: DeserializeOwned + 'static,
    F: Fn(P) -> Result<String, ToolError> + Send + Sync + 'static,
{
    Arc::new(TypedTool {
        name: name.into(),
        handler,
        _params: std::marker::PhantomData,
    })
}

/// Name-keyed set of tools.
#[derive(Clone, Default)]
pub struct FunctionToolStore {
    tools: HashMap<String, Arc<dyn FunctionTool>>,
}

impl FunctionToolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool; names must be unique within the store.
    pub fn add(mut self, tool: Arc<dyn FunctionTool>) -> Result<Self, StreamError> {
        let name = tool.name().to_string();
        if name.trim().is_empty() {
            return Err(StreamError::Validation("tool name must not be empty".into()));
        }
        if self.tools.contains_key(&name) {
            return Err(StreamError::Config(format!(
                "duplicate tool registration: {name}"
            )));
        }
        self.tools.insert(name, tool);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl ToolExecutor for FunctionToolStore {
    fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    fn execute(&self, call: &FunctionToolCall) -> Result<FunctionToolCallOutput, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::new(format!("no tool stored for function name '{}'", call.name)))?;
        let output = tool.call(&call.arguments)?;
        Ok(FunctionToolCallOutput {
            call_id: call.call_id.clone(),
            output,
        })
    }
}
