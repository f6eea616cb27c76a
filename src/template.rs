//! Stage templates: front-matter plus prompt body, rendered per issue.
//!
//! # Template Format
//!
//! ```markdown
//! ---
//! command: claude
//! args: ["--print", "--permission-mode", "acceptEdits"]
//! input: stdin
//! ---
//! Research issue ${issue.id}: ${issue.title}
//!
//! ${issue.description}
//! ```
//!
//! `${issue.id}`, `${issue.title}` and `${issue.description}` are replaced in
//! the args and in the body. Substitution is a single literal pass: values
//! are inserted verbatim and never re-scanned.

use crate::errors::ConfigError;
use crate::issue::Issue;
use crate::skills::missing_skill_references;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

const FRONT_MATTER_DELIMITER: &str = "---";

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{issue\.(id|title|description)\}").expect("placeholder regex")
});

/// How the rendered prompt reaches the agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptDelivery {
    /// Written to the process's standard input, which is then closed.
    Stdin,
    /// Appended as the final positional argument.
    Argument,
}

/// A fully rendered stage invocation.
///
/// Values are never edited in place; the `with_*` methods return new configs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepConfig {
    pub command: String,
    pub args: Vec<String>,
    pub prompt: String,
    /// Delivery declared by the template; `None` means the stage default.
    pub input: Option<PromptDelivery>,
}

impl StepConfig {
    pub fn new(command: impl Into<String>, args: Vec<String>, prompt: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args,
            prompt: prompt.into(),
            input: None,
        }
    }

    /// A copy with `extra` appended to the argument list.
    pub fn with_extra_args<I, S>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.args.extend(extra.into_iter().map(Into::into));
        next
    }

    /// A copy whose prompt ends with a review feedback section.
    pub fn with_feedback(&self, feedback: &str) -> Self {
        let mut next = self.clone();
        next.prompt = format!(
            "{}\n\n## Review Feedback\n\nA reviewer asked for the following changes. Address every point before finishing.\n\n{}\n",
            self.prompt.trim_end(),
            feedback.trim()
        );
        next
    }

    /// Delivery to use, falling back to `default` when the template is silent.
    pub fn delivery_or(&self, default: PromptDelivery) -> PromptDelivery {
        self.input.unwrap_or(default)
    }

    /// `command arg1 arg2 ...` for log lines.
    pub fn display_command(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    input: Option<PromptDelivery>,
}

/// Load and render the template at `template_path` for `issue`.
///
/// When `worktree` is given, every skill file the prompt references must
/// exist inside it.
pub fn load(
    template_path: &Path,
    issue: &Issue,
    worktree: Option<&Path>,
) -> Result<StepConfig, ConfigError> {
    if !template_path.exists() {
        return Err(ConfigError::ConfigNotFound {
            path: template_path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(template_path).map_err(|source| ConfigError::Io {
        path: template_path.to_path_buf(),
        source,
    })?;
    render(&content, template_path, issue, worktree)
}

/// Render template `content`; `origin` is only used in error messages.
pub fn render(
    content: &str,
    origin: &Path,
    issue: &Issue,
    worktree: Option<&Path>,
) -> Result<StepConfig, ConfigError> {
    let (yaml, body) =
        split_front_matter(content).ok_or_else(|| ConfigError::MissingFrontMatter {
            path: origin.to_path_buf(),
        })?;

    let front: FrontMatter = if yaml.trim().is_empty() {
        FrontMatter::default()
    } else {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::InvalidFrontMatter {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?
    };

    let command = front
        .command
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ConfigError::MissingCommand {
            path: origin.to_path_buf(),
        })?;

    let args = front
        .args
        .iter()
        .map(|arg| substitute(arg, issue))
        .collect();
    let prompt = substitute(body, issue);

    if let Some(worktree) = worktree {
        let missing = missing_skill_references(&prompt, worktree);
        if !missing.is_empty() {
            return Err(ConfigError::MissingSkillFile { missing });
        }
    }

    Ok(StepConfig {
        command,
        args,
        prompt,
        input: front.input,
    })
}

/// Replace the issue placeholders in `text` in a single pass.
pub fn substitute(text: &str, issue: &Issue) -> String {
    PLACEHOLDER_REGEX
        .replace_all(text, |caps: &Captures| match &caps[1] {
            "id" => issue.id().to_string(),
            "title" => issue.title().to_string(),
            _ => issue.description().to_string(),
        })
        .into_owned()
}

/// Split `---\n<yaml>\n---\n<body>`; `None` if either delimiter is absent.
fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != FRONT_MATTER_DELIMITER {
        return None;
    }

    let yaml_start = first.len();
    let mut offset = yaml_start;
    for line in lines {
        if line.trim_end() == FRONT_MATTER_DELIMITER {
            let yaml = &content[yaml_start..offset];
            let body = &content[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}
