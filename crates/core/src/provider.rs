//! Provider trait: the abstraction over model backends.
//!
//! A Provider knows how to send a transcript to a model and get one
//! response back. The turn loop only ever calls [`Provider::chat`];
//! authentication, retries and transport belong to the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::ToolDefinition;

/// Per-request chat settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    /// The model to use (provider default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// System prompt prepended by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Ask the provider to surface structured tool calls in the response.
    /// The turn loop always sets this.
    #[serde(default)]
    pub include_tools_in_response: bool,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// A provider-native structured function call (`{name, args}`), the
/// shape Gemini-style backends return. Carries no id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,

    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// An OpenAI-style tool call: `{id, type, function: {name, arguments}}`,
/// where `arguments` is a JSON document encoded as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    pub id: String,

    #[serde(rename = "type", default = "default_call_type")]
    pub kind: String,

    pub function: FunctionPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionPayload {
    pub name: String,

    /// Raw JSON arguments as emitted by the model
    #[serde(default)]
    pub arguments: String,
}

fn default_call_type() -> String {
    "function".into()
}

impl OpenAiToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: default_call_type(),
            function: FunctionPayload {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One complete model response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The response text
    pub content: String,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Provider-native structured calls
    #[serde(default, rename = "functionCalls", alias = "function_calls", skip_serializing_if = "Vec::is_empty")]
    pub function_calls: Vec<FunctionCall>,

    /// OpenAI-style structured calls
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<OpenAiToolCall>,
}

impl ChatResponse {
    /// A plain text response with no structured calls.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_function_call(
        mut self,
        name: impl Into<String>,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        self.function_calls.push(FunctionCall {
            name: name.into(),
            args,
        });
        self
    }

    pub fn with_tool_call(mut self, call: OpenAiToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn has_structured_calls(&self) -> bool {
        !self.function_calls.is_empty() || !self.tool_calls.is_empty()
    }
}

/// The core Provider trait.
///
/// The turn loop calls `chat()` without knowing which backend answers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "gemini", "ollama").
    fn name(&self) -> &str;

    /// Send the transcript and get a complete response.
    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> std::result::Result<ChatResponse, ProviderError>;
}
