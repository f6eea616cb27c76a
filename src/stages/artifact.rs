use glob::{Pattern, glob};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Modification time and length of one artifact file.
type Signature = (Option<SystemTime>, u64);

/// The `<dir>/<issue_id>_*.md` files present before an agent runs.
///
/// Only files the agent creates or rewrites count as its output; anything
/// left unchanged from an earlier round or run is ignored.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSnapshot {
    dir: PathBuf,
    issue_id: String,
    seen: HashMap<PathBuf, Signature>,
}

impl ArtifactSnapshot {
    pub fn take(dir: &Path, issue_id: &str) -> Self {
        let seen = matching_artifacts(dir, issue_id)
            .into_iter()
            .filter_map(|path| signature(&path).map(|sig| (path, sig)))
            .collect();
        Self {
            dir: dir.to_path_buf(),
            issue_id: issue_id.to_string(),
            seen,
        }
    }

    /// Newest artifact, by modification time, that is new or changed since
    /// the snapshot was taken.
    pub fn fresh_artifact(&self) -> Option<PathBuf> {
        matching_artifacts(&self.dir, &self.issue_id)
            .into_iter()
            .filter_map(|path| signature(&path).map(|sig| (path, sig)))
            .filter(|(path, sig)| self.seen.get(path) != Some(sig))
            .max_by_key(|(_, (modified, _))| modified.unwrap_or(SystemTime::UNIX_EPOCH))
            .map(|(path, _)| path)
    }
}

fn signature(path: &Path) -> Option<Signature> {
    let metadata = path.metadata().ok()?;
    metadata
        .is_file()
        .then(|| (metadata.modified().ok(), metadata.len()))
}

fn matching_artifacts(dir: &Path, issue_id: &str) -> Vec<PathBuf> {
    let pattern = format!(
        "{}/{}_*.md",
        Pattern::escape(&dir.to_string_lossy()),
        Pattern::escape(issue_id)
    );
    match glob(&pattern) {
        Ok(paths) => paths.filter_map(Result::ok).collect(),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "invalid artifact pattern");
            Vec::new()
        }
    }
}
