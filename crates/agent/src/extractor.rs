//! Turning one model response into tool calls.
//!
//! Three channels are read, in order, and concatenated without
//! deduplication:
//!
//! 1. provider-native function calls (`{name, args}`), fresh ids
//! 2. OpenAI-style tool calls, provider ids kept, JSON-string arguments
//! 3. free text, through a [`TextCallParser`]
//!
//! Only the second channel can fail: arguments that are not a JSON object
//! abort the turn loop.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use regex::Regex;
use serde_json::Value;
use tracing::debug;
use turnloop_core::error::ExtractionError;
use turnloop_core::provider::{ChatResponse, OpenAiToolCall};
use turnloop_core::tool::{Arguments, ToolCall, ToolRegistry};

/// Recovers tool calls from unstructured model text.
///
/// The default is [`PatternTextParser`]; swap in another implementation
/// (e.g. a grammar-based one) without touching the turn loop.
pub trait TextCallParser: Send + Sync {
    fn parse(&self, content: &str, registry: &ToolRegistry) -> Vec<ToolCall>;
}

static ARGUMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\w+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^,\s]+))"#).expect("argument regex")
});
static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").expect("integer regex"));
static DECIMAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\d+$").expect("decimal regex"));
static FILE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^\s]+\.[a-zA-Z]+)").expect("file token regex"));
static WRITE_TO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)write\s+(.+?)\s+to\s+([^\s]+)").expect("write regex"));
static RUN_QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)run\s+(?:command\s+)?["`']([^"`']+)["`']"#).expect("run regex")
});
static CALCULATE_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)calculate\s+(.+)").expect("calculate regex"));

/// Parse `key="v", key='v', key=v` into arguments.
///
/// Unquoted values are coerced: digits become integers, `d.d` floats,
/// `true`/`false` booleans. Quoted values stay strings verbatim.
pub fn parse_call_arguments(text: &str) -> Arguments {
    let mut args = Arguments::new();
    for caps in ARGUMENT.captures_iter(text) {
        let key = caps[1].to_string();
        let value = if let Some(quoted) = caps.get(2).or_else(|| caps.get(3)) {
            Value::String(quoted.as_str().to_string())
        } else {
            caps.get(4).map(|m| coerce(m.as_str())).unwrap_or(Value::Null)
        };
        args.insert(key, value);
    }
    args
}

fn coerce(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ if INTEGER.is_match(raw) => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        _ if DECIMAL.is_match(raw) => raw
            .parse::<f64>()
            .ok()
            .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
            .unwrap_or_else(|| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}

/// Fallback values for required fields that neither the text nor the
/// declaration supplies.
fn builtin_fallback(field: &str) -> Option<Value> {
    match field {
        "path" => Some(Value::String(".".into())),
        "recursive" => Some(Value::Bool(false)),
        "create_directories" => Some(Value::Bool(true)),
        _ => None,
    }
}

/// Regex-based free-text parser.
///
/// For every registered tool (registry order) it collects, in this order:
/// - call shapes `name(arg=value, ...)`, case-insensitive
/// - intent shapes `I need to | I will | Let me [use] name [with ...]`
///   ending at `.` or end of text, with arguments inferred from the
///   whole response
///
/// The two patterns of each tool name are compiled once and cached.
#[derive(Debug, Default)]
pub struct PatternTextParser {
    shapes: RwLock<HashMap<String, Arc<Shapes>>>,
}

#[derive(Debug)]
struct Shapes {
    call: Regex,
    intent: Regex,
}

impl PatternTextParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn shapes(&self, name: &str) -> Option<Arc<Shapes>> {
        if let Some(shapes) = self.shapes.read().unwrap_or_else(|e| e.into_inner()).get(name) {
            return Some(shapes.clone());
        }
        let shapes = Arc::new(Shapes {
            call: Self::call_shape(name)?,
            intent: Self::intent_shape(name)?,
        });
        self.shapes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), shapes.clone());
        Some(shapes)
    }

    fn call_shape(name: &str) -> Option<Regex> {
        Regex::new(&format!(r"(?i){}\s*\(([^)]*)\)", regex::escape(name))).ok()
    }

    fn intent_shape(name: &str) -> Option<Regex> {
        Regex::new(&format!(
            r"(?i)(?:I need to|I will|Let me)\s+(?:use\s+)?{}(?:\s+with\s+(.+?))?(?:\.|$)",
            regex::escape(name)
        ))
        .ok()
    }

    /// Infer arguments for an intent mention from tool-specific cues in
    /// the full response, then fill missing required fields.
    pub fn infer_arguments(name: &str, content: &str, registry: &ToolRegistry) -> Arguments {
        let mut args = Arguments::new();
        let Some(definition) = registry.get(name) else {
            return args;
        };

        match name {
            "read_file" => {
                if let Some(caps) = FILE_TOKEN.captures(content) {
                    args.insert("path".into(), Value::String(caps[1].to_string()));
                }
            }
            "write_file" => {
                if let Some(caps) = WRITE_TO.captures(content) {
                    args.insert("content".into(), Value::String(caps[1].to_string()));
                    args.insert("path".into(), Value::String(caps[2].to_string()));
                }
            }
            "run_command" => {
                if let Some(caps) = RUN_QUOTED.captures(content) {
                    args.insert("command".into(), Value::String(caps[1].to_string()));
                }
            }
            "calculate" => {
                if let Some(caps) = CALCULATE_CLAUSE.captures(content) {
                    args.insert("expression".into(), Value::String(caps[1].trim().to_string()));
                }
            }
            _ => {}
        }

        for field in &definition.parameters.required {
            if args.contains_key(field) {
                continue;
            }
            let fill = definition
                .parameters
                .default_for(field)
                .cloned()
                .or_else(|| builtin_fallback(field));
            if let Some(value) = fill {
                args.insert(field.clone(), value);
            }
        }

        args
    }
}

impl TextCallParser for PatternTextParser {
    fn parse(&self, content: &str, registry: &ToolRegistry) -> Vec<ToolCall> {
        let mut calls = Vec::new();
        if content.trim().is_empty() {
            return calls;
        }

        for name in registry.names() {
            let Some(shapes) = self.shapes(name) else {
                continue;
            };
            for caps in shapes.call.captures_iter(content) {
                let args = parse_call_arguments(caps.get(1).map_or("", |m| m.as_str()));
                calls.push(ToolCall::new(name, args));
            }
            for _ in shapes.intent.find_iter(content) {
                let args = Self::infer_arguments(name, content, registry);
                calls.push(ToolCall::new(name, args));
            }
        }

        calls
    }
}

/// Combines the structured channels with a free-text parser.
pub struct ToolCallExtractor {
    parser: Box<dyn TextCallParser>,
}

impl ToolCallExtractor {
    pub fn new(parser: impl TextCallParser + 'static) -> Self {
        Self {
            parser: Box::new(parser),
        }
    }

    pub fn extract(
        &self,
        response: &ChatResponse,
        registry: &ToolRegistry,
    ) -> Result<Vec<ToolCall>, ExtractionError> {
        let mut calls: Vec<ToolCall> = response
            .function_calls
            .iter()
            .map(|fc| ToolCall::new(&fc.name, fc.args.clone()))
            .collect();

        for tc in &response.tool_calls {
            calls.push(Self::from_openai(tc)?);
        }

        let structured = calls.len();
        calls.extend(self.parser.parse(&response.content, registry));
        debug!(structured, text = calls.len() - structured, "Extracted tool calls");

        Ok(calls)
    }

    fn from_openai(tc: &OpenAiToolCall) -> Result<ToolCall, ExtractionError> {
        let raw = tc.function.arguments.trim();
        let invalid = |reason: String| ExtractionError::InvalidArguments {
            tool_name: tc.function.name.clone(),
            call_id: tc.id.clone(),
            reason,
        };

        let arguments = if raw.is_empty() {
            Arguments::new()
        } else {
            match serde_json::from_str::<Value>(raw).map_err(|e| invalid(e.to_string()))? {
                Value::Object(map) => map,
                other => return Err(invalid(format!("expected a JSON object, got {other}"))),
            }
        };

        Ok(ToolCall::with_id(&tc.id, &tc.function.name, arguments))
    }
}

impl Default for ToolCallExtractor {
    fn default() -> Self {
        Self::new(PatternTextParser::new())
    }
}
