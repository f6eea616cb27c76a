//! Timed `sh -c` execution for the Spawn stage's setup commands.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Output from one shell command.
#[derive(Debug, Clone)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Run `cmd` through `sh -c` in `cwd`, killing it after `timeout`.
pub async fn run_shell(cmd: &str, cwd: &Path, timeout: Duration) -> Result<ShellOutput> {
    tracing::debug!(cmd, ?cwd, ?timeout, "spawning shell command");

    let child = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn: {cmd}"))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let result = ShellOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
                timed_out: false,
            };
            tracing::debug!(cmd, exit_code = result.exit_code, "shell command completed");
            Ok(result)
        }
        Ok(Err(e)) => Err(e).with_context(|| format!("shell command failed: {cmd}")),
        Err(_) => {
            tracing::warn!(cmd, ?timeout, "shell command timed out");
            Ok(ShellOutput {
                stdout: String::new(),
                stderr: format!("Command timed out after {} ms", timeout.as_millis()),
                exit_code: -1,
                timed_out: true,
            })
        }
    }
}
