//! Built-in tool implementations for TurnLoop.
//!
//! Tools give the agent the ability to interact with the world:
//! read, write and list files, run allowlisted commands, do math and
//! read the clock. File tools go through a [`PathPolicy`].

pub mod calculate;
pub mod current_time;
pub mod list_files;
pub mod path_policy;
pub mod read_file;
pub mod run_command;
pub mod write_file;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use turnloop_config::ToolsConfig;
use turnloop_core::error::ToolError;
use turnloop_core::tool::{Arguments, ToolRegistry};

pub use path_policy::{PathPolicy, PathPolicyError};

/// Create a registry with every built-in tool, configured from `config`.
///
/// Security defaults come from [`ToolsConfig::default`]:
/// - run_command: only a short list of read-mostly programs, started
///   without a shell
/// - file tools and command arguments: sensitive paths (~/.ssh, /etc, ...)
///   are blocked
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let policy = Arc::new(PathPolicy::new(&config.allowed_roots, &config.forbidden_paths));

    let mut registry = ToolRegistry::new();
    registry.register(read_file::ReadFileTool::new(policy.clone()));
    registry.register(write_file::WriteFileTool::new(policy.clone()));
    registry.register(list_files::ListFilesTool::new(policy.clone()));
    registry.register(run_command::RunCommandTool::new(
        config.allowed_commands.clone(),
        Duration::from_secs(config.command_timeout_secs),
        policy,
    ));
    registry.register(calculate::CalculateTool);
    registry.register(current_time::CurrentTimeTool);
    registry
}

/// A required string argument.
pub(crate) fn required_str<'a>(args: &'a Arguments, name: &str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{name}' argument")))
}

pub(crate) fn optional_str<'a>(args: &'a Arguments, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Booleans may arrive as JSON booleans or as the strings "true"/"false".
pub(crate) fn flag(args: &Arguments, name: &str, default: bool) -> bool {
    match args.get(name) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => default,
        },
        _ => default,
    }
}
