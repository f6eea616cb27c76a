//! Issue payload parsing, validation, and the names derived from an issue.

use crate::errors::PayloadError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Maximum length of an issue id.
pub const MAX_ID_LEN: usize = 100;

/// Maximum length of an issue title, in characters.
pub const MAX_TITLE_LEN: usize = 500;

/// Maximum length of the snake_case topic used in artifact names.
pub const MAX_TOPIC_LEN: usize = 50;

/// Prefix of every branch ralph creates.
pub const BRANCH_PREFIX: &str = "ralph-";

/// Ids that would collide with git internals or default branch names.
const RESERVED_IDS: [&str; 5] = ["head", "master", "main", ".git", "git"];

/// A validated issue. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    id: String,
    title: String,
    description: String,
}

#[derive(Deserialize)]
struct RawIssue {
    id: Option<String>,
    title: Option<String>,
    description: Option<String>,
}

impl Issue {
    /// Validate and build an issue from its three fields.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, PayloadError> {
        let id = id.into();
        let title = title.into();
        validate_id(&id)?;
        validate_title(&title)?;
        Ok(Self {
            id: id.trim().to_string(),
            title,
            description: description.into(),
        })
    }

    /// Parse the JSON payload `{id, title, description}`.
    pub fn from_json(payload: &str) -> Result<Self, PayloadError> {
        let raw: RawIssue = serde_json::from_str(payload).map_err(PayloadError::MalformedJson)?;
        let id = raw.id.ok_or(PayloadError::MissingField { field: "id" })?;
        let title = raw.title.ok_or(PayloadError::MissingField { field: "title" })?;
        let description = raw
            .description
            .ok_or(PayloadError::MissingField { field: "description" })?;
        Self::new(id, title, description)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Directory name of this issue's working tree.
    pub fn worktree_name(&self) -> String {
        worktree_name(&self.id)
    }

    /// Branch this issue's work lands on.
    pub fn branch_name(&self) -> String {
        branch_name(&self.id)
    }

    /// File name of an artifact for this issue: `<id>_<topic>.md`.
    pub fn artifact_file_name(&self) -> String {
        format!("{}_{}.md", self.id, topic_slug(&self.title))
    }

    /// Full path of this issue's artifact under `dir`.
    pub fn artifact_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.artifact_file_name())
    }
}

/// Validate an issue id.
///
/// Traversal sequences are reported before the character-class check so the
/// caller gets the more specific error.
pub fn validate_id(raw: &str) -> Result<(), PayloadError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(PayloadError::EmptyId);
    }
    let length = id.chars().count();
    if length > MAX_ID_LEN {
        return Err(PayloadError::IdTooLong {
            length,
            max: MAX_ID_LEN,
        });
    }
    if id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(PayloadError::PathTraversal { id: id.to_string() });
    }
    if RESERVED_IDS.iter().any(|r| r.eq_ignore_ascii_case(id)) {
        return Err(PayloadError::ReservedId { id: id.to_string() });
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(PayloadError::InvalidIdCharacters { id: id.to_string() });
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<(), PayloadError> {
    if title.trim().is_empty() {
        return Err(PayloadError::EmptyTitle);
    }
    let length = title.chars().count();
    if length > MAX_TITLE_LEN {
        return Err(PayloadError::TitleTooLong {
            length,
            max: MAX_TITLE_LEN,
        });
    }
    Ok(())
}

/// Working tree directory name for an issue id.
pub fn worktree_name(id: &str) -> String {
    id.to_lowercase()
}

/// Branch name for an issue id.
pub fn branch_name(id: &str) -> String {
    format!("{}{}", BRANCH_PREFIX, id)
}

/// Convert an issue title into the snake_case topic of an artifact name.
///
/// Lower-cases, drops everything that is not alphanumeric or whitespace,
/// joins the words with underscores, and truncates to [`MAX_TOPIC_LEN`].
pub fn topic_slug(title: &str) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    let truncated: String = joined.chars().take(MAX_TOPIC_LEN).collect();
    truncated.trim_end_matches('_').to_string()
}
