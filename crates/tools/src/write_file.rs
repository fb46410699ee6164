//! `write_file`: create or overwrite files with path validation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use turnloop_core::error::ToolError;
use turnloop_core::tool::{Arguments, ParameterSchema, Tool};

use crate::path_policy::PathPolicy;
use crate::{flag, required_str};

pub struct WriteFileTool {
    policy: Arc<PathPolicy>,
}

impl WriteFileTool {
    pub fn new(policy: Arc<PathPolicy>) -> Self {
        Self { policy }
    }

    pub fn unrestricted() -> Self {
        Self::new(Arc::new(PathPolicy::unrestricted()))
    }

    fn failed(reason: String) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: "write_file".into(),
            reason,
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .required_param("path", "string", "Path to the file to write")
            .required_param("content", "string", "Content to write to the file")
            .param_with_default(
                "create_directories",
                "boolean",
                "Create parent directories if they don't exist",
                json!(true),
            )
    }

    async fn execute(&self, arguments: Arguments) -> Result<Value, ToolError> {
        let path = required_str(&arguments, "path")?;
        let content = match arguments.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => {
                return Err(ToolError::InvalidArguments("Missing 'content' argument".into()));
            }
            // Coerced scalars are written as their text.
            Some(other) => other.to_string(),
        };
        let create_directories = flag(&arguments, "create_directories", true);

        let resolved = self.policy.check(path).map_err(|e| ToolError::PermissionDenied {
            tool_name: "write_file".into(),
            reason: e.to_string(),
        })?;

        if create_directories {
            if let Some(parent) = resolved.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Self::failed(format!("Failed to write file {path}: {e}")))?;
            }
        }

        tokio::fs::write(&resolved, content.as_bytes())
            .await
            .map_err(|e| Self::failed(format!("Failed to write file {path}: {e}")))?;

        tracing::debug!(path = %resolved.display(), bytes = content.len(), "Wrote file");
        Ok(json!(format!("File written successfully to {path}")))
    }
}
