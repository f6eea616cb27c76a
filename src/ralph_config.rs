//! Project configuration read from `.ralph/ralph.toml`.
//!
//! Every key is optional; a missing file is the same as an empty one.
//!
//! ```toml
//! [paths]
//! templates_dir = ".ralph/templates"   # relative to the root
//!
//! [spawn]
//! base_ref = "origin/main"             # where new issue branches start
//! shell_timeout_ms = 600000            # RALPH_SHELL_TIMEOUT_MS still wins
//!
//! [publish]
//! pr_tool = "gh"
//! remote = "origin"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the project configuration inside `.ralph/`.
pub const CONFIG_FILE: &str = "ralph.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub templates_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub base_ref: Option<String>,
    pub shell_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub pr_tool: Option<String>,
    pub remote: Option<String>,
}

/// Parsed `ralph.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RalphToml {
    pub paths: PathsConfig,
    pub spawn: SpawnConfig,
    pub publish: PublishConfig,
}

impl RalphToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse ralph.toml")
    }

    /// Load `<ralph_dir>/ralph.toml`, or defaults if the file doesn't exist.
    pub fn load_or_default(ralph_dir: &Path) -> Result<Self> {
        let config_path = ralph_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }
}
