//! `read_file`: read file contents with path validation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use turnloop_core::error::ToolError;
use turnloop_core::tool::{Arguments, ParameterSchema, Tool};

use crate::path_policy::PathPolicy;
use crate::required_str;

pub struct ReadFileTool {
    policy: Arc<PathPolicy>,
}

impl ReadFileTool {
    pub fn new(policy: Arc<PathPolicy>) -> Self {
        Self { policy }
    }

    pub fn unrestricted() -> Self {
        Self::new(Arc::new(PathPolicy::unrestricted()))
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object().required_param("path", "string", "Path to the file to read")
    }

    async fn execute(&self, arguments: Arguments) -> Result<Value, ToolError> {
        let path = required_str(&arguments, "path")?;

        let resolved = self.policy.check(path).map_err(|e| ToolError::PermissionDenied {
            tool_name: "read_file".into(),
            reason: e.to_string(),
        })?;

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "read_file".into(),
                reason: format!("Failed to read file {path}: {e}"),
            })?;

        Ok(json!(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(path: &str) -> Arguments {
        let mut map = Arguments::new();
        map.insert("path".into(), json!(path));
        map
    }

    #[test]
    fn tool_definition() {
        let def = ReadFileTool::unrestricted().to_definition();
        assert_eq!(def.name, "read_file");
        assert_eq!(def.parameters.required, vec!["path"]);
    }

    #[tokio::test]
    async fn reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.json");
        std::fs::write(&file, r#"{"debug": true}"#).unwrap();

        let value = ReadFileTool::unrestricted()
            .execute(args(file.to_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(value, json!(r#"{"debug": true}"#));
    }

    #[tokio::test]
    async fn missing_file_is_execution_failure() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nope.txt");
        let err = ReadFileTool::unrestricted()
            .execute(args(file.to_str().unwrap()))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to read file"));
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let result = ReadFileTool::unrestricted().execute(Arguments::new()).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn policy_violations_are_permission_denied() {
        let tool = ReadFileTool::new(Arc::new(PathPolicy::new(&[], &["/etc".into()])));
        let result = tool.execute(args("/etc/shadow")).await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));

        let result = tool.execute(args("../../../etc/passwd")).await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }
}
