//! Tool trait and registry: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world: read and
//! write files, run commands, do math. The turn loop never calls a tool
//! directly; it goes through [`ToolRegistry::invoke`], which always returns
//! a [`ToolResult`] and never an error.

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ToolError;

/// Tool arguments: field name → untyped JSON value.
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// Generate a fresh tool call id.
pub fn generate_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Declaration of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// JSON type name ("string", "number", "boolean", ...)
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub description: String,

    /// Value used when the caller omits the field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

/// JSON-Schema-shaped parameter declaration for a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type", default = "object_kind")]
    pub kind: String,

    #[serde(default)]
    pub properties: BTreeMap<String, ParameterSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

fn object_kind() -> String {
    "object".into()
}

impl ParameterSchema {
    /// An empty object schema.
    pub fn object() -> Self {
        Self {
            kind: object_kind(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// Add an optional parameter.
    pub fn param(mut self, name: &str, kind: &str, description: &str) -> Self {
        self.properties.insert(
            name.to_string(),
            ParameterSpec {
                kind: kind.to_string(),
                description: description.to_string(),
                default: None,
            },
        );
        self
    }

    /// Add an optional parameter with a declared default.
    pub fn param_with_default(
        mut self,
        name: &str,
        kind: &str,
        description: &str,
        default: serde_json::Value,
    ) -> Self {
        self.properties.insert(
            name.to_string(),
            ParameterSpec {
                kind: kind.to_string(),
                description: description.to_string(),
                default: Some(default),
            },
        );
        self
    }

    /// Mark an already declared (or new) parameter as required.
    pub fn require(mut self, name: &str) -> Self {
        if !self.required.iter().any(|r| r == name) {
            self.required.push(name.to_string());
        }
        self
    }

    /// Add a required parameter.
    pub fn required_param(self, name: &str, kind: &str, description: &str) -> Self {
        self.param(name, kind, description).require(name)
    }

    pub fn default_for(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.get(name).and_then(|p| p.default.as_ref())
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self::object()
    }
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name (unique registry key)
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    pub parameters: ParameterSchema,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: ParameterSchema) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Human-readable summary listing every parameter.
    pub fn describe(&self) -> String {
        let mut out = format!("{}: {}\n", self.name, self.description);
        if !self.parameters.properties.is_empty() {
            out.push_str("Parameters:\n");
            for (key, spec) in &self.parameters.properties {
                let required = if self.parameters.is_required(key) { " (required)" } else { "" };
                let _ = write!(out, "  - {key}: {}{required}", spec.description);
                if let Some(default) = &spec.default {
                    let _ = write!(out, " [default: {default}]");
                }
                out.push('\n');
            }
        }
        out
    }
}

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID (the provider's id, or generated)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a key/value mapping
    #[serde(default)]
    pub arguments: Arguments,
}

impl ToolCall {
    /// A call with a freshly generated id.
    pub fn new(name: impl Into<String>, arguments: Arguments) -> Self {
        Self::with_id(generate_call_id(), name, arguments)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Either the success payload or the failure description, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Result(serde_json::Value),
    Error(String),
}

/// The result of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The id of the originating call
    pub id: String,

    pub name: String,

    #[serde(flatten)]
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(call: &ToolCall, value: serde_json::Value) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            outcome: ToolOutcome::Result(value),
        }
    }

    pub fn failure(call: &ToolCall, error: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            outcome: ToolOutcome::Error(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error(_))
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ToolOutcome::Error(e) => Some(e),
            ToolOutcome::Result(_) => None,
        }
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            ToolOutcome::Result(v) => Some(v),
            ToolOutcome::Error(_) => None,
        }
    }
}

/// The core Tool trait.
///
/// Each built-in tool (read_file, run_command, calculate, ...) implements
/// this trait. Handlers may fail; the registry turns failures into
/// [`ToolResult`] errors.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// Parameter declaration.
    fn parameters(&self) -> ParameterSchema;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: Arguments) -> std::result::Result<serde_json::Value, ToolError>;

    /// Convert this tool into a ToolDefinition.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

type Handler = Box<dyn Fn(Arguments) -> BoxFuture<'static, Result<serde_json::Value, ToolError>> + Send + Sync>;

/// A tool backed by a closure, for ad-hoc registration.
struct FnTool {
    definition: ToolDefinition,
    handler: Handler,
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    fn parameters(&self) -> ParameterSchema {
        self.definition.parameters.clone()
    }

    async fn execute(&self, arguments: Arguments) -> Result<serde_json::Value, ToolError> {
        (self.handler)(arguments).await
    }
}

struct Entry {
    definition: ToolDefinition,
    tool: Arc<dyn Tool>,
}

/// A registry of available tools, keyed and listed by name.
///
/// The turn loop uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Know which names to look for in free text
/// 3. Invoke tools when the model requests them
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let definition = tool.to_definition();
        debug!(tool = %definition.name, "Registering tool");
        self.tools.insert(definition.name.clone(), Entry { definition, tool });
    }

    /// Register a closure as a tool.
    pub fn register_fn<F, Fut>(&mut self, definition: ToolDefinition, handler: F)
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send + 'static,
    {
        let handler: Handler = Box::new(move |args| handler(args).boxed());
        self.register(FnTool { definition, handler });
    }

    /// Remove a tool. Returns whether it was present.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn clear(&mut self) {
        self.tools.clear();
    }

    /// Look up a tool definition by name.
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|e| &e.definition)
    }

    /// All tool definitions, sorted by name.
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|e| e.definition.clone()).collect()
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Whether the tool exists and every required argument is present.
    pub fn validate_call(&self, call: &ToolCall) -> bool {
        self.get(&call.name).is_some_and(|def| {
            def.parameters
                .required
                .iter()
                .all(|r| call.arguments.contains_key(r))
        })
    }

    /// Execute a tool call. Never fails: unknown tools, handler errors and
    /// handler panics all come back as an error [`ToolResult`].
    pub async fn invoke(&self, call: &ToolCall) -> ToolResult {
        let Some(entry) = self.tools.get(&call.name) else {
            return ToolResult::failure(call, ToolError::NotFound(call.name.clone()).to_string());
        };

        let execution = AssertUnwindSafe(entry.tool.execute(call.arguments.clone())).catch_unwind();
        match execution.await {
            Ok(Ok(value)) => ToolResult::success(call, value),
            Ok(Err(e)) => {
                debug!(tool = %call.name, error = %e, "Tool returned an error");
                ToolResult::failure(call, e.to_string())
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                warn!(tool = %call.name, %message, "Tool panicked");
                ToolResult::failure(
                    call,
                    ToolError::Panicked {
                        tool_name: call.name.clone(),
                        message,
                    }
                    .to_string(),
                )
            }
        }
    }

    /// Execute calls one after another, in order.
    pub async fn invoke_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.invoke(call).await);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters(&self) -> ParameterSchema {
            ParameterSchema::object().required_param("text", "string", "Text to echo")
        }
        async fn execute(&self, arguments: Arguments) -> Result<serde_json::Value, ToolError> {
            let text = arguments
                .get("text")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;
            Ok(json!(text))
        }
    }

    struct PanickyTool;

    #[async_trait]
    impl Tool for PanickyTool {
        fn name(&self) -> &str { "panicky" }
        fn description(&self) -> &str { "Always panics" }
        fn parameters(&self) -> ParameterSchema { ParameterSchema::object() }
        async fn execute(&self, _arguments: Arguments) -> Result<serde_json::Value, ToolError> {
            panic!("boom");
        }
    }

    fn args(value: serde_json::Value) -> Arguments {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn reregistering_replaces_entry() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(EchoTool);
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn unregister_and_clear() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(PanickyTool);
        assert!(registry.unregister("echo"));
        assert!(!registry.unregister("echo"));
        assert_eq!(registry.names(), vec!["panicky"]);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn schema_serializes_as_json_schema() {
        let schema = ParameterSchema::object()
            .required_param("path", "string", "Path to read")
            .param_with_default("recursive", "boolean", "Recurse", json!(false));
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["type"], "object");
        assert_eq!(value["required"], json!(["path"]));
        assert_eq!(value["properties"]["recursive"]["default"], json!(false));
        assert_eq!(schema.default_for("recursive"), Some(&json!(false)));
        assert_eq!(schema.default_for("path"), None);
    }

    #[test]
    fn describe_lists_parameters() {
        let text = EchoTool.to_definition().describe();
        assert!(text.starts_with("echo: Echoes back the input"));
        assert!(text.contains("- text: Text to echo (required)"));
    }

    #[test]
    fn validate_call_checks_required_args() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        assert!(registry.validate_call(&ToolCall::new("echo", args(json!({"text": "hi"})))));
        assert!(!registry.validate_call(&ToolCall::new("echo", Arguments::new())));
        assert!(!registry.validate_call(&ToolCall::new("missing", Arguments::new())));
    }

    #[test]
    fn tool_result_serializes_exactly_one_of_result_or_error() {
        let call = ToolCall::with_id("call_1", "echo", Arguments::new());
        let ok = serde_json::to_value(ToolResult::success(&call, json!(4))).unwrap();
        assert_eq!(ok["result"], json!(4));
        assert!(ok.get("error").is_none());

        let err = serde_json::to_value(ToolResult::failure(&call, "nope")).unwrap();
        assert_eq!(err["error"], "nope");
        assert!(err.get("result").is_none());
        assert_eq!(err["id"], "call_1");
    }

    #[tokio::test]
    async fn invoke_known_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let call = ToolCall::with_id("call_1", "echo", args(json!({"text": "hello world"})));
        let result = registry.invoke(&call).await;
        assert!(!result.is_error());
        assert_eq!(result.result(), Some(&json!("hello world")));
        assert_eq!(result.id, "call_1");
    }

    #[tokio::test]
    async fn invoke_missing_tool_returns_error_result() {
        let registry = ToolRegistry::new();
        let call = ToolCall::new("nonexistent", Arguments::new());
        let result = registry.invoke(&call).await;
        assert_eq!(result.error(), Some("Tool 'nonexistent' not found"));
    }

    #[tokio::test]
    async fn handler_error_becomes_error_result() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let result = registry.invoke(&ToolCall::new("echo", Arguments::new())).await;
        assert!(result.error().unwrap().contains("Missing 'text'"));
    }

    #[tokio::test]
    async fn handler_panic_becomes_error_result() {
        let mut registry = ToolRegistry::new();
        registry.register(PanickyTool);
        let result = registry.invoke(&ToolCall::new("panicky", Arguments::new())).await;
        let error = result.error().unwrap();
        assert!(error.contains("panicked"));
        assert!(error.contains("boom"));
    }

    #[tokio::test]
    async fn closure_tools_are_invocable() {
        let mut registry = ToolRegistry::new();
        registry.register_fn(
            ToolDefinition::new("double", "Doubles n", ParameterSchema::object().required_param("n", "number", "n")),
            |args| async move {
                let n = args.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(json!(n * 2))
            },
        );
        let results = registry
            .invoke_all(&[
                ToolCall::new("double", args(json!({"n": 21}))),
                ToolCall::new("triple", Arguments::new()),
            ])
            .await;
        assert_eq!(results[0].result(), Some(&json!(42)));
        assert!(results[1].is_error());
    }
}
