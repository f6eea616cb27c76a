//! Typed error hierarchy for ralph.
//!
//! One enum per failure family:
//! - `ConfigError`: stage templates and their skill references
//! - `PayloadError`: the issue payload handed to the CLI
//! - `LockError`: another run holds the working-tree root
//! - `AgentProcessError`: an external agent or tool process failed
//! - `ArtifactMissingError`: an agent claimed success but wrote nothing
//! - `AttemptsExhausted`: a bounded judge loop hit its cap
//!
//! A judge asking for changes is not an error; it is a loop signal carried on
//! `JudgeResult::needs_changes`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while rendering a stage template.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Stage template not found: {}", .path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("Stage template {} has no front-matter block (expected leading '---')", .path.display())]
    MissingFrontMatter { path: PathBuf },

    #[error("Stage template {} has invalid front-matter: {message}", .path.display())]
    InvalidFrontMatter { path: PathBuf, message: String },

    #[error("Stage template {} does not declare a command", .path.display())]
    MissingCommand { path: PathBuf },

    #[error("Prompt references missing skill file(s): {}", .missing.join(", "))]
    MissingSkillFile { missing: Vec<String> },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while parsing or validating an issue payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Issue payload is not valid JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),

    #[error("Issue payload is missing field '{field}'")]
    MissingField { field: &'static str },

    #[error("Issue id must not be empty")]
    EmptyId,

    #[error("Issue id is {length} characters long (max {max})")]
    IdTooLong { length: usize, max: usize },

    #[error("Issue id '{id}' contains a path traversal sequence")]
    PathTraversal { id: String },

    #[error("Issue id '{id}' may only contain letters, digits, '_' and '-'")]
    InvalidIdCharacters { id: String },

    #[error("Issue id '{id}' is reserved")]
    ReservedId { id: String },

    #[error("Issue title must not be empty")]
    EmptyTitle,

    #[error("Issue title is {length} characters long (max {max})")]
    TitleTooLong { length: usize, max: usize },
}

/// Another live process owns the working-tree root.
#[derive(Debug, Error)]
#[error("Another ralph run is active (pid {pid}, issue {issue_id}, command '{command}', started {started_at})")]
pub struct LockError {
    pub pid: u32,
    pub issue_id: String,
    pub command: String,
    pub started_at: String,
}

/// Failures of an external process launched on behalf of a stage.
#[derive(Debug, Error)]
pub enum AgentProcessError {
    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with code {exit_code}{}", stderr_suffix(.stderr))]
    NonZeroExit {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Required tool '{tool}' was not found on PATH")]
    ToolMissing { tool: String },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

/// An agent reported success but the promised artifact never appeared.
#[derive(Debug, Error)]
#[error("{stage} agent reported success but expected artifact was not written: {}", .expected.display())]
pub struct ArtifactMissingError {
    pub stage: String,
    pub expected: PathBuf,
}

/// A bounded judge loop reached its cap while still needing changes.
#[derive(Debug, Error)]
#[error("{loop_name} still needs changes after {attempts} attempts")]
pub struct AttemptsExhausted {
    pub loop_name: &'static str,
    pub attempts: u32,
}

/// Umbrella error for library callers that want a single type. The CLI
/// itself reports through `anyhow`.
#[derive(Debug, Error)]
pub enum RalphError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    AgentProcess(#[from] AgentProcessError),

    #[error(transparent)]
    ArtifactMissing(#[from] ArtifactMissingError),

    #[error(transparent)]
    AttemptsExhausted(#[from] AttemptsExhausted),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
