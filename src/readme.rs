//! Setup command discovery from a working tree's README.
//!
//! Sections whose heading mentions install, build or test contribute the
//! lines of the first fenced code block beneath them. Commands come back in
//! install, build, test order regardless of where the sections appear.

use std::path::Path;

pub const README_FILE: &str = "README.md";

const FENCE: &str = "```";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SetupPhase {
    Install,
    Build,
    Test,
}

impl SetupPhase {
    fn from_heading(heading: &str) -> Option<Self> {
        let lower = heading.to_lowercase();
        if lower.contains("install") {
            Some(Self::Install)
        } else if lower.contains("build") {
            Some(Self::Build)
        } else if lower.contains("test") {
            Some(Self::Test)
        } else {
            None
        }
    }
}

/// A shell command found in the README.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupCommand {
    pub phase: SetupPhase,
    pub command: String,
}

/// Read `<worktree>/README.md` and extract its setup commands.
///
/// A missing README yields no commands.
pub fn discover_commands(worktree: &Path) -> std::io::Result<Vec<SetupCommand>> {
    let path = worktree.join(README_FILE);
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(parse_commands(&content))
}

/// Extract setup commands from README markdown.
pub fn parse_commands(markdown: &str) -> Vec<SetupCommand> {
    let mut found: Vec<SetupCommand> = Vec::new();
    let mut section: Option<SetupPhase> = None;
    let mut section_taken = false;
    let mut in_fence = false;
    let mut collecting = false;

    for line in markdown.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with(FENCE) {
            if in_fence {
                in_fence = false;
                if collecting {
                    collecting = false;
                    section_taken = true;
                }
            } else {
                in_fence = true;
                collecting = section.is_some() && !section_taken;
            }
            continue;
        }

        if in_fence {
            if collecting
                && let Some(phase) = section
                && !trimmed.is_empty()
                && !trimmed.starts_with('#')
            {
                found.push(SetupCommand {
                    phase,
                    command: trimmed.to_string(),
                });
            }
            continue;
        }

        if trimmed.starts_with('#') {
            let heading = trimmed.trim_start_matches('#');
            section = SetupPhase::from_heading(heading);
            section_taken = false;
        }
    }

    // Stable sort keeps document order within a phase.
    found.sort_by_key(|c| c.phase);
    found
}
