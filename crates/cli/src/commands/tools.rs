//! `turnloop tools`: inspect and invoke built-in tools.

use std::sync::Arc;

use serde_json::Value;
use turnloop_agent::ToolExecutionService;
use turnloop_agent::direct::render;
use turnloop_config::AppConfig;
use turnloop_core::tool::Arguments;

fn service(config: &AppConfig) -> ToolExecutionService {
    ToolExecutionService::new(Arc::new(turnloop_tools::default_registry(&config.tools)))
}

/// Parse `--args`: must be a JSON object.
fn parse_arguments(raw: &str) -> Result<Arguments, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("--args must be a JSON object, got {other}")),
        Err(e) => Err(format!("--args is not valid JSON: {e}")),
    }
}

pub fn list(config: &AppConfig) {
    let tools = service(config).available_tools();
    println!("🔧 Available tools ({})", tools.len());
    println!();
    for def in tools {
        let required = if def.parameters.required.is_empty() {
            String::new()
        } else {
            format!("  [requires: {}]", def.parameters.required.join(", "))
        };
        println!("  {:<18} {}{required}", def.name, def.description);
    }
}

pub fn describe(config: &AppConfig, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let text = service(config)
        .describe_tool(name)
        .ok_or_else(|| format!("Unknown tool '{name}' (see `turnloop tools list`)"))?;
    print!("{text}");
    Ok(())
}

pub async fn call(config: &AppConfig, name: &str, raw_args: &str) -> Result<(), Box<dyn std::error::Error>> {
    let arguments = parse_arguments(raw_args)?;
    let result = service(config).execute_manual(name, arguments).await;
    println!("{}", render(&result));
    match result.error() {
        Some(e) => Err(e.to_string().into()),
        None => Ok(()),
    }
}

pub async fn exec(config: &AppConfig, text: &str) {
    println!("{}", service(config).execute_from_text(text).await);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_must_be_an_object() {
        assert_eq!(parse_arguments("{}").unwrap().len(), 0);
        assert_eq!(parse_arguments(r#"{"expression": "2+2"}"#).unwrap()["expression"], "2+2");
        assert!(parse_arguments("[1]").unwrap_err().contains("JSON object"));
        assert!(parse_arguments("{oops").unwrap_err().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn manual_call_reports_tool_errors() {
        let config = AppConfig::default();
        assert!(call(&config, "calculate", r#"{"expression": "2+2"}"#).await.is_ok());
        assert!(call(&config, "calculate", r#"{"expression": "2+"}"#).await.is_err());
        assert!(call(&config, "no_such_tool", "{}").await.is_err());
    }

    #[test]
    fn describe_unknown_tool_fails() {
        assert!(describe(&AppConfig::default(), "read_file").is_ok());
        assert!(describe(&AppConfig::default(), "teleport").is_err());
    }
}
