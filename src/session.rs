//! Per-worktree persistence of the builder agent's session handle.
//!
//! The handle is an opaque single-line string kept at
//! `<worktree>/.ralph/session`. Only the Implement stage touches it, and the
//! root lock already serializes Implement runs, so there is no locking here.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::RALPH_DIR;

/// Session file name inside the worktree's `.ralph` directory.
pub const SESSION_FILE: &str = "session";

pub struct SessionStore {
    session_file: PathBuf,
}

impl SessionStore {
    pub fn new(worktree_dir: &Path) -> Self {
        Self {
            session_file: worktree_dir.join(RALPH_DIR).join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.session_file
    }

    /// Persist `session_id`, creating the `.ralph` directory if needed.
    pub fn save(&self, session_id: &str) -> Result<()> {
        if let Some(parent) = self.session_file.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create session directory: {}", parent.display())
            })?;
        }
        fs::write(&self.session_file, format!("{}\n", session_id.trim())).with_context(|| {
            format!(
                "Failed to write session file: {}",
                self.session_file.display()
            )
        })?;
        Ok(())
    }

    /// The stored handle; `None` when the file is absent or blank.
    pub fn load(&self) -> Option<String> {
        let content = fs::read_to_string(&self.session_file).ok()?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Forget the stored handle. Missing files are fine.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.session_file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!(
                    "Failed to remove session file: {}",
                    self.session_file.display()
                )
            }),
        }
    }
}
