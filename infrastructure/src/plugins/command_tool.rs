//! Tools that run an external command (`command` entry points)

use async_trait::async_trait;
use avakin_domain::{PluginDescriptor, PluginError, ToolInvocation, ToolOutput, ToolProvider};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default timeout for command execution (5 minutes)
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Maximum output kept for the Validator prompt
const MAX_OUTPUT_SIZE: usize = 16 * 1024;

/// Changed files, newline separated, passed to the command
pub const CHANGED_FILES_ENV: &str = "AVAKIN_CHANGED_FILES";

pub struct CommandTool {
    name: String,
    description: String,
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandTool {
    pub fn from_descriptor(descriptor: &PluginDescriptor) -> Result<Self, PluginError> {
        let section = descriptor
            .tool
            .as_ref()
            .filter(|s| !s.command.is_empty())
            .ok_or_else(|| PluginError::Activation {
                plugin: descriptor.name.clone(),
                reason: "[tool] command is empty".to_string(),
            })?;
        Ok(Self {
            name: descriptor.name.clone(),
            description: if descriptor.description.is_empty() {
                format!("Runs `{}`", section.command.join(" "))
            } else {
                descriptor.description.clone()
            },
            argv: section.command.clone(),
            timeout: Duration::from_secs(section.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }

    fn failed(&self, reason: impl Into<String>) -> PluginError {
        PluginError::Execution {
            plugin: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// stdout then stderr, truncated from the front so the tail (where test
/// runners print summaries) survives
pub(crate) fn collect_output(stdout: &str, stderr: &str) -> String {
    let mut output = stdout.trim_end().to_string();
    if !stderr.trim().is_empty() {
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(stderr.trim_end());
    }
    if output.len() > MAX_OUTPUT_SIZE {
        let mut start = output.len() - MAX_OUTPUT_SIZE;
        while !output.is_char_boundary(start) {
            start += 1;
        }
        output = format!("... (truncated)\n{}", &output[start..]);
    }
    output
}

#[async_trait]
impl ToolProvider for CommandTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, PluginError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(self.failed("no command configured"));
        };
        debug!(tool = %self.name, program = %program, "Running tool command");

        let child = Command::new(program)
            .args(args)
            .current_dir(&invocation.project_root)
            .env(CHANGED_FILES_ENV, invocation.changed_files.join("\n"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.failed(format!("cannot start {}: {}", program, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| self.failed(format!("timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| self.failed(e.to_string()))?;

        let text = collect_output(
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        );
        Ok(if output.status.success() {
            ToolOutput::success(text)
        } else {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            ToolOutput::failure(format!("exit status {}\n{}", code, text))
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use avakin_domain::{Capability, ToolSection};

    fn tool(argv: &[&str], timeout_secs: Option<u64>) -> CommandTool {
        let mut descriptor = PluginDescriptor::new("check", "1.0.0")
            .with_capability(Capability::Tool)
            .with_entry_point("command");
        descriptor.tool = Some(ToolSection {
            command: argv.iter().map(|s| s.to_string()).collect(),
            timeout_secs,
        });
        CommandTool::from_descriptor(&descriptor).unwrap()
    }

    #[tokio::test]
    async fn test_success_passes_changed_files() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool(&["sh", "-c", "echo \"$AVAKIN_CHANGED_FILES\""], None);

        let output = tool
            .run(
                ToolInvocation::new(dir.path())
                    .with_changed_files(vec!["a.py".into(), "b.py".into()]),
            )
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.output, "a.py\nb.py");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure_output() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool(&["sh", "-c", "echo boom >&2; exit 3"], None);

        let output = tool.run(ToolInvocation::new(dir.path())).await.unwrap();

        assert!(!output.success);
        assert!(output.output.starts_with("exit status 3"));
        assert!(output.output.contains("boom"));
    }

    #[tokio::test]
    async fn test_timeout_and_missing_program_are_errors() {
        let dir = tempfile::tempdir().unwrap();

        let slow = tool(&["sleep", "5"], Some(0));
        let err = slow.run(ToolInvocation::new(dir.path())).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));

        let missing = tool(&["avakin-no-such-program"], None);
        let err = missing.run(ToolInvocation::new(dir.path())).await.unwrap_err();
        assert!(matches!(err, PluginError::Execution { .. }));
    }

    #[test]
    fn test_output_truncation_keeps_tail() {
        let long = "x".repeat(MAX_OUTPUT_SIZE + 10) + "SUMMARY";
        let output = collect_output(&long, "");
        assert!(output.starts_with("... (truncated)"));
        assert!(output.ends_with("SUMMARY"));
    }
}
