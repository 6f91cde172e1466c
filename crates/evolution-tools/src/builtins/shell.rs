//! Built-in tool for running shell commands on the local host.

use crate::Tool;
use async_trait::async_trait;
use evolution_protocol::ToolError;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const NO_OUTPUT: &str = "Command executed successfully with no output.";

/// Runs a command line through the platform shell with a timeout.
#[derive(Debug, Clone)]
pub struct ShellTool {
    timeout: Duration,
    cwd: Option<PathBuf>,
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ShellTool {
    /// Create a shell tool with the given per-command timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, cwd: None }
    }

    /// Run commands from a fixed working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    fn command(&self, command_line: &str) -> Command {
        #[cfg(windows)]
        let mut command = {
            let mut command = Command::new("cmd");
            command.arg("/C").arg(command_line);
            command
        };
        #[cfg(not(windows))]
        let mut command = {
            let mut command = Command::new("sh");
            command.arg("-c").arg(command_line);
            command
        };
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

/// Combine process output the way the shell tool reports it.
fn format_output(stdout: &str, stderr: &str, exit_code: Option<i32>) -> String {
    let mut parts = Vec::new();
    if !stdout.trim().is_empty() {
        parts.push(stdout.trim_end().to_string());
    }
    if !stderr.trim().is_empty() {
        parts.push(stderr.trim_end().to_string());
    }
    let mut output = parts.join("\n");
    match exit_code {
        Some(0) => {}
        Some(code) => output.push_str(&format!("\n[Exit code: {code}]")),
        None => output.push_str("\n[Terminated by signal]"),
    }
    let output = output.trim_start_matches('\n').to_string();
    if output.is_empty() {
        NO_OUTPUT.to_string()
    } else {
        output
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "execute_shell_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command on the local machine and return its combined output"
    }

    fn input_description(&self) -> &str {
        "The shell command line to execute"
    }

    async fn call(&self, input: &str) -> Result<String, ToolError> {
        let command_line = input.trim();
        if command_line.is_empty() {
            return Err(ToolError::InvalidInput("command must not be empty".to_string()));
        }
        info!(
            "executing shell command (command_len={}, timeout_secs={})",
            command_line.len(),
            self.timeout.as_secs()
        );

        let child = self
            .command(command_line)
            .spawn()
            .map_err(|err| ToolError::ExecutionFailed(format!("Error executing command: {err}")))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|err| {
                ToolError::ExecutionFailed(format!("Error executing command: {err}"))
            })?,
            Err(_) => {
                warn!(
                    "shell command timed out (timeout_secs={})",
                    self.timeout.as_secs()
                );
                return Err(ToolError::Timeout(self.timeout.as_secs()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            "shell command finished (status={:?}, stdout_len={}, stderr_len={})",
            output.status.code(),
            stdout.len(),
            stderr.len()
        );
        Ok(format_output(&stdout, &stderr, output.status.code()))
    }
}

#[cfg(test)]
mod tests {
    use super::{NO_OUTPUT, ShellTool, format_output};
    use crate::Tool;
    use evolution_protocol::ToolError;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn output_combines_streams_and_exit_code() {
        assert_eq!(format_output("out\n", "err\n", Some(2)), "out\nerr\n[Exit code: 2]");
        assert_eq!(format_output("", "", Some(0)), NO_OUTPUT);
        assert_eq!(format_output("", "", Some(1)), "[Exit code: 1]");
        assert_eq!(format_output("hi\n", "", Some(0)), "hi");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_commands_through_the_shell() {
        let tool = ShellTool::default();
        let output = tool.call("echo hello && echo oops 1>&2; exit 3").await.expect("run");
        assert_eq!(output, "hello\noops\n[Exit code: 3]");
        assert_eq!(tool.call("true").await.expect("run"), NO_OUTPUT);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn honours_working_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("marker.txt"), "x").expect("write");
        let tool = ShellTool::default().with_cwd(dir.path());
        assert_eq!(tool.call("ls").await.expect("run"), "marker.txt");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_commands_time_out() {
        let tool = ShellTool::new(Duration::from_millis(100));
        let err = tool.call("sleep 5").await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
    }

    #[tokio::test]
    async fn empty_commands_are_rejected() {
        let err = ShellTool::default().call("   ").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}
