//! External process boundary.
//!
//! [`AgentInvoker`] is the only way the rest of the crate starts builder
//! agents, judge agents, or tools such as `git` and `gh`. The real
//! implementation is [`ProcessInvoker`]; tests substitute a scripted double.

pub mod builder;

pub use builder::{BuilderSession, BuilderTurn, CliBuilderSession, extract_session_id};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::errors::AgentProcessError;
use crate::template::{PromptDelivery, StepConfig};

/// Captured result of one finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl AgentOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Convert a non-zero exit into an error naming `command`.
    pub fn into_result(self, command: &str) -> Result<Self, AgentProcessError> {
        if self.success() {
            Ok(self)
        } else {
            Err(AgentProcessError::NonZeroExit {
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }
}

/// Runs external processes to completion.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Run `config.command` with `config.args` in `cwd`, delivering the prompt
    /// per `delivery`, and wait for it to exit.
    async fn run(
        &self,
        config: &StepConfig,
        delivery: PromptDelivery,
        cwd: &Path,
    ) -> Result<AgentOutput, AgentProcessError>;

    /// Whether `tool` resolves to an executable on the search path.
    fn exists(&self, tool: &str) -> bool;
}

/// Spawns real child processes with `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct ProcessInvoker;

impl ProcessInvoker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentInvoker for ProcessInvoker {
    async fn run(
        &self,
        config: &StepConfig,
        delivery: PromptDelivery,
        cwd: &Path,
    ) -> Result<AgentOutput, AgentProcessError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);
        if delivery == PromptDelivery::Argument {
            cmd.arg(&config.prompt);
        }
        // Allow a Claude CLI agent to start from inside another Claude session.
        cmd.env_remove("CLAUDECODE")
            .current_dir(cwd)
            .stdin(match delivery {
                PromptDelivery::Stdin => Stdio::piped(),
                PromptDelivery::Argument => Stdio::null(),
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(command = %config.display_command(), cwd = %cwd.display(), ?delivery, "spawning agent process");

        let mut child = cmd.spawn().map_err(|source| AgentProcessError::SpawnFailed {
            command: config.command.clone(),
            source,
        })?;

        // Feed stdin from a separate task so a chatty child can't deadlock us.
        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = config.prompt.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    tracing::debug!(error = %e, "agent closed stdin early");
                }
                let _ = stdin.shutdown().await;
            })
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| AgentProcessError::SpawnFailed {
                command: config.command.clone(),
                source,
            })?;

        if let Some(writer) = writer {
            let _ = writer.await;
        }

        let result = AgentOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(
            command = %config.command,
            exit_code = result.exit_code,
            stdout_len = result.stdout.len(),
            "agent process completed"
        );
        Ok(result)
    }

    fn exists(&self, tool: &str) -> bool {
        find_on_path(tool).is_some()
    }
}

/// Resolve `tool` against `PATH` the way a shell would.
pub fn find_on_path(tool: &str) -> Option<PathBuf> {
    if tool.is_empty() {
        return None;
    }
    let direct = Path::new(tool);
    if direct.components().count() > 1 {
        return is_executable(direct).then(|| direct.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(tool))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}
