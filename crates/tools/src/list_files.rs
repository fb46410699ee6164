//! `list_files`: list directory entries, optionally recursive and
//! filtered by a `*` wildcard pattern.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};
use turnloop_core::error::ToolError;
use turnloop_core::tool::{Arguments, ParameterSchema, Tool};

use crate::path_policy::PathPolicy;
use crate::{flag, optional_str};

pub struct ListFilesTool {
    policy: Arc<PathPolicy>,
}

#[derive(Debug, Serialize)]
struct Entry {
    path: String,
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<DateTime<Utc>>,
    extension: String,
}

impl ListFilesTool {
    pub fn new(policy: Arc<PathPolicy>) -> Self {
        Self { policy }
    }

    pub fn unrestricted() -> Self {
        Self::new(Arc::new(PathPolicy::unrestricted()))
    }
}

/// Compile a wildcard (`*` = any run of characters) into an anchored,
/// case-insensitive regex.
fn wildcard(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("(?i)^{body}$"))
}

async fn describe(path: &Path, name: &str) -> Entry {
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    match tokio::fs::metadata(path).await {
        Ok(meta) => Entry {
            path: path.to_string_lossy().into_owned(),
            name: name.to_string(),
            kind: if meta.is_dir() { "directory" } else { "file" },
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            extension,
        },
        Err(_) => Entry {
            path: path.to_string_lossy().into_owned(),
            name: name.to_string(),
            kind: "unknown",
            size: 0,
            modified: None,
            extension,
        },
    }
}

async fn collect(
    root: &Path,
    filter: &Regex,
    include_hidden: bool,
    recursive: bool,
) -> std::io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
    let mut first = true;

    while let Some(dir) = pending.pop() {
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            // The root must be readable; unreadable subdirectories are skipped.
            Err(e) if first => return Err(e),
            Err(_) => continue,
        };
        first = false;

        while let Some(item) = reader.next_entry().await? {
            let name = item.file_name().to_string_lossy().into_owned();
            if !include_hidden && name.starts_with('.') {
                continue;
            }
            let path = item.path();
            let is_dir = item.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir && recursive {
                pending.push(path.clone());
            }
            if filter.is_match(&name) {
                entries.push(describe(&path, &name).await);
            }
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories in a path"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .param_with_default("path", "string", "Path to list files from", json!("."))
            .param_with_default(
                "pattern",
                "string",
                "Wildcard pattern to filter names (e.g. \"*.rs\")",
                json!("*"),
            )
            .param_with_default(
                "include_hidden",
                "boolean",
                "Include hidden files and directories",
                json!(false),
            )
            .param_with_default("recursive", "boolean", "List files recursively", json!(false))
    }

    async fn execute(&self, arguments: Arguments) -> Result<Value, ToolError> {
        let path = optional_str(&arguments, "path").unwrap_or(".");
        let pattern = optional_str(&arguments, "pattern").unwrap_or("*");
        let include_hidden = flag(&arguments, "include_hidden", false);
        let recursive = flag(&arguments, "recursive", false);

        let root = self.policy.check(path).map_err(|e| ToolError::PermissionDenied {
            tool_name: "list_files".into(),
            reason: e.to_string(),
        })?;

        let filter = wildcard(pattern)
            .map_err(|e| ToolError::InvalidArguments(format!("Invalid pattern '{pattern}': {e}")))?;

        let entries = collect(&root, &filter, include_hidden, recursive)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "list_files".into(),
                reason: format!("Failed to list files in {path}: {e}"),
            })?;

        Ok(json!({
            "path": path,
            "pattern": pattern,
            "total": entries.len(),
            "files": entries,
        }))
    }
}
