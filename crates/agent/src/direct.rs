//! Running tools without a model in the loop.

use std::sync::Arc;

use tracing::debug;
use turnloop_core::tool::{Arguments, ToolCall, ToolDefinition, ToolRegistry, ToolResult};

use crate::extractor::{PatternTextParser, TextCallParser};

/// Executes tools named in operator text or requested by name.
pub struct ToolExecutionService {
    registry: Arc<ToolRegistry>,
    parser: Box<dyn TextCallParser>,
}

impl ToolExecutionService {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self::with_parser(registry, PatternTextParser::new())
    }

    pub fn with_parser(registry: Arc<ToolRegistry>, parser: impl TextCallParser + 'static) -> Self {
        Self {
            registry,
            parser: Box::new(parser),
        }
    }

    /// Parse `input` for tool calls, run them in order, and render one
    /// line per result.
    pub async fn execute_from_text(&self, input: &str) -> String {
        let calls = self.parser.parse(input, &self.registry);
        if calls.is_empty() {
            return format!(
                "No valid tool calls found. Available tools: {}",
                self.registry.names().join(", ")
            );
        }

        debug!(count = calls.len(), "Executing tool calls from text");
        let results = self.registry.invoke_all(&calls).await;
        results.iter().map(render).collect::<Vec<_>>().join("\n")
    }

    pub async fn execute_manual(&self, name: &str, arguments: Arguments) -> ToolResult {
        self.registry.invoke(&ToolCall::new(name, arguments)).await
    }

    pub fn available_tools(&self) -> Vec<ToolDefinition> {
        self.registry.list()
    }

    pub fn describe_tool(&self, name: &str) -> Option<String> {
        self.registry.get(name).map(ToolDefinition::describe)
    }
}

/// `✅ name: <pretty json>` or `❌ name: <error>`.
pub fn render(result: &ToolResult) -> String {
    match (result.result(), result.error()) {
        (_, Some(error)) => format!("❌ {}: {error}", result.name),
        (Some(value), None) => format!(
            "✅ {}: {}",
            result.name,
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        ),
        (None, None) => format!("✅ {}: null", result.name),
    }
}
