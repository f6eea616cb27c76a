//! Per-issue git worktrees.

use anyhow::{Context, Result};
use git2::{BranchType, Repository, WorktreeAddOptions, WorktreePruneOptions};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::config::RALPH_DIR;
use crate::session::SESSION_FILE;

/// What [`ensure_worktree`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorktreeStatus {
    /// The directory already existed and was left untouched.
    Reused,
    /// A new worktree was checked out.
    Created,
}

/// Make sure `worktree_dir` holds a checkout of `branch`.
///
/// An existing directory is reused as-is. Otherwise the repository is
/// discovered from `root`, `branch` is reused or created from `base_ref`, and
/// a worktree called `name` is added at `worktree_dir`. The builder's session
/// file is then listed in the repository's `info/exclude` so it never ends
/// up in a commit.
pub fn ensure_worktree(
    root: &Path,
    worktree_dir: &Path,
    name: &str,
    branch: &str,
    base_ref: &str,
) -> Result<WorktreeStatus> {
    if worktree_dir.is_dir() {
        tracing::debug!(path = %worktree_dir.display(), "reusing existing worktree");
        return Ok(WorktreeStatus::Reused);
    }

    let repo = Repository::discover(root)
        .with_context(|| format!("Failed to open git repository at {}", root.display()))?;

    // Metadata left behind by a worktree whose directory was deleted.
    if let Ok(stale) = repo.find_worktree(name)
        && stale.validate().is_err()
    {
        tracing::debug!(name, "pruning stale worktree metadata");
        stale
            .prune(Some(&mut WorktreePruneOptions::new()))
            .with_context(|| format!("Failed to prune stale worktree '{}'", name))?;
    }

    let branch_ref = match repo.find_branch(branch, BranchType::Local) {
        Ok(existing) => {
            tracing::debug!(branch, "reusing existing branch");
            existing.into_reference()
        }
        Err(_) => {
            let base = repo
                .revparse_single(base_ref)
                .and_then(|obj| obj.peel_to_commit())
                .with_context(|| format!("Failed to resolve base revision '{}'", base_ref))?;
            tracing::debug!(branch, base_ref, commit = %base.id(), "creating branch");
            repo.branch(branch, &base, false)
                .with_context(|| format!("Failed to create branch '{}'", branch))?
                .into_reference()
        }
    };

    let mut opts = WorktreeAddOptions::new();
    opts.reference(Some(&branch_ref));
    repo.worktree(name, worktree_dir, Some(&opts))
        .with_context(|| {
            format!(
                "Failed to add worktree '{}' at {}",
                name,
                worktree_dir.display()
            )
        })?;

    exclude_session_file(&repo)?;

    tracing::info!(branch, path = %worktree_dir.display(), "created worktree");
    Ok(WorktreeStatus::Created)
}

/// Add `/.ralph/session` to the shared `info/exclude`, once.
fn exclude_session_file(repo: &Repository) -> Result<()> {
    let exclude = repo.commondir().join("info").join("exclude");
    let pattern = format!("/{}/{}", RALPH_DIR, SESSION_FILE);
    let existing = match fs::read_to_string(&exclude) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", exclude.display()));
        }
    };
    if existing.lines().any(|line| line.trim() == pattern) {
        return Ok(());
    }

    if let Some(parent) = exclude.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&exclude)
        .with_context(|| format!("Failed to open {}", exclude.display()))?;
    let separator = if existing.is_empty() || existing.ends_with('\n') {
        ""
    } else {
        "\n"
    };
    writeln!(file, "{}{}", separator, pattern)
        .with_context(|| format!("Failed to update {}", exclude.display()))?;
    tracing::debug!(path = %exclude.display(), pattern, "excluded session file from commits");
    Ok(())
}
