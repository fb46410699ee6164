//! `run_command`: execute an allowlisted system command.
//!
//! With an allowlist configured the command line is split into words and
//! the program is started directly, without a shell. Shell operators are
//! refused and path-like arguments go through the [`PathPolicy`]. An empty
//! allowlist means unrestricted execution through the platform shell.
//!
//! A non-zero exit status is reported in the result payload, not as a
//! tool failure.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::Command;
use tracing::{debug, warn};
use turnloop_core::error::ToolError;
use turnloop_core::tool::{Arguments, ParameterSchema, Tool};

use crate::path_policy::PathPolicy;
use crate::{optional_str, required_str};

/// Characters that chain, redirect or expand in a shell.
const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '`', '$', '>', '<', '\n', '\r'];

/// How a checked command will be started.
#[derive(Debug, PartialEq, Eq)]
enum Invocation {
    /// `sh -c` / `cmd /C` with the raw command line.
    Shell,
    /// Program and arguments, no shell involved.
    Direct(Vec<String>),
}

pub struct RunCommandTool {
    /// If non-empty, only these programs may start.
    allowed_commands: Vec<String>,
    default_timeout: Duration,
    policy: Arc<PathPolicy>,
}

impl RunCommandTool {
    pub fn new(allowed_commands: Vec<String>, default_timeout: Duration, policy: Arc<PathPolicy>) -> Self {
        Self {
            allowed_commands,
            default_timeout,
            policy,
        }
    }

    fn plan(&self, command: &str, cwd: Option<&str>) -> Result<Invocation, String> {
        if let Some(dir) = cwd {
            self.policy.check(dir).map_err(|e| e.to_string())?;
        }
        if self.allowed_commands.is_empty() {
            return Ok(Invocation::Shell);
        }

        if let Some(c) = command.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
            return Err(format!("Shell operator '{}' is not allowed", c.escape_debug()));
        }

        let words = shell_words::split(command).map_err(|e| format!("Cannot parse command: {e}"))?;
        let Some(program) = words.first() else {
            return Err("Empty command".into());
        };
        if !self.allowed_commands.iter().any(|a| a == program) {
            return Err(format!("Command '{program}' not in allowlist"));
        }

        for arg in &words[1..] {
            let Some(path) = path_argument(arg) else {
                continue;
            };
            let target = match cwd {
                Some(dir) if !Path::new(path).is_absolute() && !path.starts_with('~') => {
                    Path::new(dir).join(path).to_string_lossy().into_owned()
                }
                _ => path.to_string(),
            };
            self.policy.check(&target).map_err(|e| e.to_string())?;
        }
        Ok(Invocation::Direct(words))
    }

    fn timeout_from(&self, arguments: &Arguments) -> Duration {
        arguments
            .get("timeout")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout)
    }
}

/// The path an argument refers to, if it looks like one. Handles
/// `--flag=value` forms; bare flags are skipped.
fn path_argument(arg: &str) -> Option<&str> {
    let value = if arg.starts_with('-') {
        arg.split_once('=')?.1
    } else {
        arg
    };
    let path_like = value.contains('/') || value.starts_with('~') || value.starts_with('.');
    path_like.then_some(value)
}

fn shell_command(command: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Execute an allowlisted command and return stdout/stderr"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .required_param("command", "string", "Command line to execute")
            .param("cwd", "string", "Current working directory")
            .param("timeout", "number", "Timeout in milliseconds")
    }

    async fn execute(&self, arguments: Arguments) -> Result<Value, ToolError> {
        let command = required_str(&arguments, "command")?;
        let cwd = optional_str(&arguments, "cwd");
        let timeout = self.timeout_from(&arguments);

        let invocation = self.plan(command, cwd).map_err(|reason| ToolError::PermissionDenied {
            tool_name: "run_command".into(),
            reason,
        })?;

        debug!(command = %command, ?cwd, timeout_ms = timeout.as_millis() as u64, "Executing command");

        let mut cmd = match invocation {
            Invocation::Shell => shell_command(command),
            Invocation::Direct(words) => {
                let mut c = Command::new(&words[0]);
                c.args(&words[1..]);
                c
            }
        };
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "run_command".into(),
                    reason: format!("Failed to start command: {e}"),
                });
            }
            Err(_) => {
                warn!(command = %command, "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: "run_command".into(),
                    timeout_secs: timeout.as_secs().max(1),
                });
            }
        };

        let success = output.status.success();
        let exit_code = output.status.code();
        if !success {
            warn!(command = %command, exit_code = ?exit_code, "Command failed");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(json!({
            "success": success,
            "exit_code": exit_code,
            "stdout": stdout.trim(),
            "stderr": stderr.trim(),
            "command": command,
            "cwd": cwd,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(allowed: &[&str]) -> RunCommandTool {
        guarded(allowed, &[])
    }

    fn guarded(allowed: &[&str], forbidden: &[&str]) -> RunCommandTool {
        let forbidden: Vec<String> = forbidden.iter().map(|s| s.to_string()).collect();
        RunCommandTool::new(
            allowed.iter().map(|s| s.to_string()).collect(),
            Duration::from_secs(10),
            Arc::new(PathPolicy::new(&[], &forbidden)),
        )
    }

    fn args(pairs: &[(&str, Value)]) -> Arguments {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn allowlist_check() {
        let tool = tool(&["ls", "cat", "git"]);
        assert_eq!(
            tool.plan("ls -la", None),
            Ok(Invocation::Direct(vec!["ls".into(), "-la".into()]))
        );
        assert!(tool.plan("git status", None).is_ok());
        assert!(tool.plan("rm -rf /", None).is_err());
        assert!(tool.plan("ls; rm -rf /", None).is_err());
        assert!(tool.plan("cat $(whoami)", None).is_err());
    }

    #[test]
    fn shell_operators_rejected() {
        let tool = tool(&["ls", "echo"]);
        for command in [
            "ls & touch x",
            "echo x > f",
            "echo x >> f",
            "cat < f",
            "echo $HOME",
            "ls\r\ntouch x",
            "ls | wc",
        ] {
            let err = tool.plan(command, None).unwrap_err();
            assert!(err.contains("not allowed"), "{command}: {err}");
        }
    }

    #[test]
    fn quoted_words_stay_together() {
        let tool = tool(&["grep"]);
        assert_eq!(
            tool.plan(r#"grep "two words" notes.txt"#, None),
            Ok(Invocation::Direct(vec!["grep".into(), "two words".into(), "notes.txt".into()]))
        );
        assert!(tool.plan(r#"grep "unterminated"#, None).is_err());
    }

    #[test]
    fn path_arguments_follow_policy() {
        let tool = guarded(&["cat", "ls"], &["/etc"]);
        assert!(tool.plan("cat /etc/passwd", None).unwrap_err().contains("forbidden"));
        assert!(tool.plan("ls --directory=/etc", None).is_err());
        assert!(tool.plan("ls ../..", None).unwrap_err().contains("traversal"));
        assert!(tool.plan("ls -la", None).is_ok());
        assert!(tool.plan("ls /tmp", None).is_ok());
        assert!(tool.plan("ls", Some("/etc")).is_err());
    }

    #[test]
    fn empty_allowlist_uses_the_shell() {
        assert_eq!(tool(&[]).plan("anything | goes", None), Ok(Invocation::Shell));
    }

    #[test]
    fn timeout_argument_overrides_default() {
        let t = tool(&[]);
        assert_eq!(t.timeout_from(&args(&[("timeout", json!(250))])), Duration::from_millis(250));
        assert_eq!(t.timeout_from(&args(&[("timeout", json!("1500"))])), Duration::from_millis(1500));
        assert_eq!(t.timeout_from(&Arguments::new()), Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn executes_echo() {
        let value = tool(&["echo"])
            .execute(args(&[("command", json!("echo hello"))]))
            .await
            .unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["stdout"], "hello");
        assert_eq!(value["exit_code"], 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn quoted_argument_reaches_the_program_verbatim() {
        let value = tool(&["echo"])
            .execute(args(&[("command", json!(r#"echo "a   b""#))]))
            .await
            .unwrap();
        assert_eq!(value["stdout"], "a   b");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn chained_and_redirected_commands_do_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let redirected = dir.path().join("redirected");
        let tool = tool(&["ls", "echo"]);

        let chained = tool
            .execute(args(&[("command", json!(format!("ls & touch {}", marker.display())))]))
            .await;
        assert!(matches!(chained, Err(ToolError::PermissionDenied { .. })));

        let redirect = tool
            .execute(args(&[("command", json!(format!("echo owned > {}", redirected.display())))]))
            .await;
        assert!(matches!(redirect, Err(ToolError::PermissionDenied { .. })));

        assert!(!marker.exists());
        assert!(!redirected.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_reported_not_failed() {
        let value = tool(&[])
            .execute(args(&[("command", json!("exit 3"))]))
            .await
            .unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["exit_code"], 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_in_cwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let value = tool(&["ls"])
            .execute(args(&[
                ("command", json!("ls")),
                ("cwd", json!(dir.path().to_string_lossy())),
            ]))
            .await
            .unwrap();
        assert!(value["stdout"].as_str().unwrap().contains("marker.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let result = tool(&[])
            .execute(args(&[("command", json!("sleep 5")), ("timeout", json!(100))]))
            .await;
        assert!(matches!(result, Err(ToolError::Timeout { .. })));
    }

    #[tokio::test]
    async fn blocked_command() {
        let result = tool(&["ls"])
            .execute(args(&[("command", json!("rm -rf /"))]))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }
}
