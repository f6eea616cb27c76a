//! Skill references inside rendered prompts.
//!
//! Stage prompts may point the agent at reusable instruction files that live
//! inside the working tree:
//!
//! ```text
//! <worktree>/.claude/skills/
//! ├── rust-conventions/
//! │   └── SKILL.md
//! └── testing-strategy/
//!     └── SKILL.md
//! ```
//!
//! A prompt mentions one by its relative path, e.g.
//! `Follow .claude/skills/rust-conventions/SKILL.md`. Before any agent is
//! launched the prompt is scanned and every reference must resolve to a file.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Skills directory, relative to a working tree.
pub const SKILLS_DIR: &str = ".claude/skills";

/// The filename for skill content
pub const SKILL_FILE: &str = "SKILL.md";

static SKILL_REF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.claude/skills/([A-Za-z0-9_.-]+)/SKILL\.md").expect("skill reference regex")
});

/// A skill file mentioned by a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillReference {
    /// The skill name (directory name)
    pub name: String,
    /// Path relative to the working tree, as written in the prompt
    pub relative_path: String,
}

impl SkillReference {
    /// Where this reference resolves inside `worktree`.
    pub fn resolve(&self, worktree: &Path) -> PathBuf {
        worktree.join(&self.relative_path)
    }
}

/// All distinct skill references in `prompt`, in order of first appearance.
pub fn find_skill_references(prompt: &str) -> Vec<SkillReference> {
    let mut refs: Vec<SkillReference> = Vec::new();
    for cap in SKILL_REF_REGEX.captures_iter(prompt) {
        let relative_path = cap[0].to_string();
        if refs.iter().any(|r| r.relative_path == relative_path) {
            continue;
        }
        refs.push(SkillReference {
            name: cap[1].to_string(),
            relative_path,
        });
    }
    refs
}

/// References in `prompt` with no file behind them in `worktree`.
pub fn missing_skill_references(prompt: &str, worktree: &Path) -> Vec<String> {
    find_skill_references(prompt)
        .into_iter()
        .filter(|r| !r.resolve(worktree).is_file())
        .map(|r| r.relative_path)
        .collect()
}
