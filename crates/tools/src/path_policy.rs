//! Path policy for the filesystem tools.
//!
//! Blocks traversal sequences, resolves the target as far as the
//! filesystem allows, then checks it against forbidden prefixes and
//! (when configured) allowed roots.

use std::path::{Component, Path, PathBuf};

use turnloop_config::expand_home;

/// Error returned when a path is refused.
#[derive(Debug, thiserror::Error)]
pub enum PathPolicyError {
    #[error("Path '{path}' is outside allowed roots")]
    OutsideAllowedRoots { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to resolve path '{path}': {reason}")]
    ResolveFailed { path: String, reason: String },
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    resolved: PathBuf,
}

impl Rule {
    fn new(pattern: &str) -> Self {
        let expanded = expand_home(pattern);
        // Resolve symlinked roots (e.g. /tmp -> /private/tmp) so they
        // compare equal to resolved targets.
        let resolved = expanded.canonicalize().unwrap_or(expanded);
        Self {
            pattern: pattern.to_string(),
            resolved,
        }
    }
}

/// Where the file tools may read and write.
#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    allowed_roots: Vec<Rule>,
    forbidden_paths: Vec<Rule>,
}

impl PathPolicy {
    pub fn new(allowed_roots: &[String], forbidden_paths: &[String]) -> Self {
        Self {
            allowed_roots: allowed_roots.iter().map(|p| Rule::new(p)).collect(),
            forbidden_paths: forbidden_paths.iter().map(|p| Rule::new(p)).collect(),
        }
    }

    /// No restrictions beyond the traversal check.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Validate `path` and return its resolved form.
    pub fn check(&self, path: &str) -> Result<PathBuf, PathPolicyError> {
        let input = expand_home(path);

        if input.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(PathPolicyError::PathTraversal { path: path.into() });
        }

        let resolved = resolve(&input).map_err(|e| PathPolicyError::ResolveFailed {
            path: path.into(),
            reason: e.to_string(),
        })?;

        if let Some(rule) = self
            .forbidden_paths
            .iter()
            .find(|rule| resolved.starts_with(&rule.resolved))
        {
            return Err(PathPolicyError::ForbiddenPath {
                path: path.into(),
                pattern: rule.pattern.clone(),
            });
        }

        if !self.allowed_roots.is_empty()
            && !self
                .allowed_roots
                .iter()
                .any(|rule| resolved.starts_with(&rule.resolved))
        {
            return Err(PathPolicyError::OutsideAllowedRoots { path: path.into() });
        }

        Ok(resolved)
    }
}

/// Canonicalize the path, or its parent when the path does not exist
/// yet. Falls back to an absolute, unresolved path.
fn resolve(input: &Path) -> std::io::Result<PathBuf> {
    if input.exists() {
        return input.canonicalize();
    }

    let absolute = if input.is_absolute() {
        input.to_path_buf()
    } else {
        std::env::current_dir()?.join(input)
    };

    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) if parent.exists() => Ok(parent.canonicalize()?.join(name)),
        _ => Ok(absolute),
    }
}
