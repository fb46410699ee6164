//! `get_current_time`: the current date and time.

use async_trait::async_trait;
use chrono::{Local, SecondsFormat, Utc};
use serde_json::{Value, json};
use turnloop_core::error::ToolError;
use turnloop_core::tool::{Arguments, ParameterSchema, Tool};

use crate::optional_str;

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .param_with_default("format", "string", "Format: iso, local, or timestamp", json!("iso"))
            .param_with_default("timezone", "string", "Timezone: utc or local", json!("local"))
    }

    async fn execute(&self, arguments: Arguments) -> Result<Value, ToolError> {
        let format = optional_str(&arguments, "format").unwrap_or("iso").to_ascii_lowercase();
        let utc = optional_str(&arguments, "timezone").is_some_and(|tz| tz.eq_ignore_ascii_case("utc"));

        let now = Utc::now();
        let rendered = match format.as_str() {
            "timestamp" => now.timestamp_millis().to_string(),
            "local" if utc => now.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            "local" => now.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
            "iso" => now.to_rfc3339_opts(SecondsFormat::Millis, true),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "Unknown format '{other}' (expected iso, local or timestamp)"
                )));
            }
        };

        Ok(json!(rendered))
    }
}
