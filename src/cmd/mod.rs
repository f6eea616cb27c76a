//! CLI command implementations.
//!
//! | Module   | Commands handled                                            |
//! |----------|-------------------------------------------------------------|
//! | `run`    | `Run`                                                       |
//! | `stage`  | `Spawn`, `Research`, `Plan`, `Validate`, `Implement`, `Review`, `Publish` |
//! | `lock`   | `Lock`                                                      |
//! | `config` | `Config`                                                    |

pub mod config;
pub mod lock;
pub mod run;
pub mod stage;

pub use config::cmd_config;
pub use lock::cmd_lock;
pub use run::cmd_run;
pub use stage::cmd_stage;

use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};

use ralph::config::Config;
use ralph::issue::Issue;

/// Read the JSON issue payload from `issue_file`, or stdin when absent.
pub fn read_issue(issue_file: Option<&Path>) -> Result<Issue> {
    let payload = match issue_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read issue file: {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read issue payload from stdin")?;
            buf
        }
    };
    Ok(Issue::from_json(&payload)?)
}

/// Load the configuration for `root` and create `.ralph/`.
pub fn load_config(root: PathBuf, verbose: bool) -> Result<Config> {
    let config = Config::new(root, verbose)?;
    config.ensure_directories()?;
    Ok(config)
}
