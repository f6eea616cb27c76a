use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::issue::Issue;
use crate::ralph_config::{CONFIG_FILE, RalphToml};

/// Hidden per-root and per-worktree directory.
pub const RALPH_DIR: &str = ".ralph";

/// Stage templates directory inside [`RALPH_DIR`].
pub const TEMPLATES_DIR: &str = "templates";

/// Environment override for the Spawn stage's shell-command timeout.
pub const SHELL_TIMEOUT_ENV: &str = "RALPH_SHELL_TIMEOUT_MS";

/// Default shell-command timeout in milliseconds.
pub const DEFAULT_SHELL_TIMEOUT_MS: u64 = 300_000;

const DEFAULT_BASE_REF: &str = "HEAD";
const DEFAULT_PR_TOOL: &str = "gh";
const DEFAULT_REMOTE: &str = "origin";

/// Runtime configuration for ralph.
///
/// Layers, lowest to highest: built-in defaults, `.ralph/ralph.toml`, the
/// environment, then CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    /// Working-tree root: one checkout per issue plus the shared repository.
    pub root: PathBuf,
    pub ralph_dir: PathBuf,
    pub templates_dir: PathBuf,
    /// Revision new issue branches start from.
    pub base_ref: String,
    pub shell_timeout: Duration,
    pub pr_tool: String,
    pub remote: String,
    pub verbose: bool,
}

impl Config {
    /// Build the configuration for `root`, reading `ralph.toml` and the environment.
    pub fn new(root: PathBuf, verbose: bool) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve root directory: {}", root.display()))?;
        let ralph_toml = RalphToml::load_or_default(&root.join(RALPH_DIR))?;
        let env_timeout = std::env::var(SHELL_TIMEOUT_ENV).ok();
        Ok(Self::from_parts(
            root,
            ralph_toml,
            env_timeout.as_deref(),
            verbose,
        ))
    }

    /// Assemble a configuration from already-loaded layers.
    pub fn from_parts(
        root: PathBuf,
        ralph_toml: RalphToml,
        env_timeout: Option<&str>,
        verbose: bool,
    ) -> Self {
        let ralph_dir = root.join(RALPH_DIR);
        let templates_dir = match &ralph_toml.paths.templates_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => ralph_dir.join(TEMPLATES_DIR),
        };

        let shell_timeout = parse_timeout_ms(env_timeout)
            .or_else(|| {
                ralph_toml
                    .spawn
                    .shell_timeout_ms
                    .filter(|ms| *ms > 0)
                    .map(Duration::from_millis)
            })
            .unwrap_or(Duration::from_millis(DEFAULT_SHELL_TIMEOUT_MS));

        let base_ref = ralph_toml
            .spawn
            .base_ref
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_REF.to_string());
        let pr_tool = ralph_toml
            .publish
            .pr_tool
            .clone()
            .unwrap_or_else(|| DEFAULT_PR_TOOL.to_string());
        let remote = ralph_toml
            .publish
            .remote
            .clone()
            .unwrap_or_else(|| DEFAULT_REMOTE.to_string());

        Self {
            root,
            ralph_dir,
            templates_dir,
            base_ref,
            shell_timeout,
            pr_tool,
            remote,
            verbose,
        }
    }

    /// Path of the optional `ralph.toml`.
    pub fn config_file(&self) -> PathBuf {
        self.ralph_dir.join(CONFIG_FILE)
    }

    /// Template file for a stage: `<templates_dir>/<name>.md`.
    pub fn template_path(&self, template_name: &str) -> PathBuf {
        self.templates_dir.join(format!("{}.md", template_name))
    }

    /// Working tree directory for an issue.
    pub fn worktree_dir(&self, issue: &Issue) -> PathBuf {
        self.root.join(issue.worktree_name())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.ralph_dir).with_context(|| {
            format!(
                "Failed to create ralph directory: {}",
                self.ralph_dir.display()
            )
        })?;
        Ok(())
    }
}

/// Parse a millisecond timeout: positive integers only.
pub fn parse_timeout_ms(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}
