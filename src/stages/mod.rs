//! Stage executors.
//!
//! Each stage renders its template, runs an agent through the invoker and
//! applies its own completion test. Executors never return errors: every
//! failure becomes a [`StepResult`] with `success == false` so the
//! orchestrator can stop the run with the stage's message.
//!
//! | Stage     | Agent   | Success test                                        |
//! |-----------|---------|-----------------------------------------------------|
//! | Spawn     | none    | worktree ready and README setup commands pass       |
//! | Research  | builder | exit 0 and a new `docs/research/<id>_*.md` (2 tries)|
//! | Plan      | builder | exit 0 and a new `docs/plans/<id>_*.md` (2 tries)   |
//! | Validate  | judge   | exit 0; verdict drives `needs_changes`              |
//! | Implement | builder | exit 0; session handle persisted either way         |
//! | Review    | judge   | exit 0; stdout or review artifact drive the verdict |
//! | Publish   | judge   | PR tool present, verdict complete, PR created       |

mod artifact;
mod author;
mod implement;
mod judge;
mod publish;
mod spawn;

pub use artifact::ArtifactSnapshot;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::agent::{AgentInvoker, BuilderSession, CliBuilderSession};
use crate::config::Config;
use crate::errors::ConfigError;
use crate::issue::Issue;
use crate::template::{self, PromptDelivery, StepConfig};
use crate::ui::Reporter;
use crate::verdict::{KeywordClassifier, VerdictClassifier};

/// The seven workflow stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Spawn,
    Research,
    Plan,
    Validate,
    Implement,
    Review,
    Publish,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Spawn,
        Stage::Research,
        Stage::Plan,
        Stage::Validate,
        Stage::Implement,
        Stage::Review,
        Stage::Publish,
    ];

    /// Display name, e.g. `Research`.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Spawn => "Spawn",
            Stage::Research => "Research",
            Stage::Plan => "Plan",
            Stage::Validate => "Validate",
            Stage::Implement => "Implement",
            Stage::Review => "Review",
            Stage::Publish => "Publish",
        }
    }

    /// Template file stem and CLI subcommand, e.g. `research`.
    pub fn slug(self) -> &'static str {
        match self {
            Stage::Spawn => "spawn",
            Stage::Research => "research",
            Stage::Plan => "plan",
            Stage::Validate => "validate",
            Stage::Implement => "implement",
            Stage::Review => "review",
            Stage::Publish => "publish",
        }
    }

    /// Directory under the worktree where the stage's artifacts land.
    pub fn output_dir(self) -> Option<&'static str> {
        match self {
            Stage::Research => Some("docs/research"),
            Stage::Plan => Some("docs/plans"),
            Stage::Validate => Some("docs/validation"),
            Stage::Review => Some("docs/reviews"),
            Stage::Spawn | Stage::Implement | Stage::Publish => None,
        }
    }

    /// How the prompt is delivered when the template doesn't say.
    pub fn default_delivery(self) -> PromptDelivery {
        match self {
            Stage::Spawn | Stage::Research | Stage::Plan | Stage::Implement => {
                PromptDelivery::Stdin
            }
            Stage::Validate | Stage::Review | Stage::Publish => PromptDelivery::Argument,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.slug().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown stage '{}'", s))
    }
}

/// Outcome of one stage invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepResult {
    pub success: bool,
    pub message: String,
    pub output_file: Option<PathBuf>,
    pub session_id: Option<String>,
}

impl StepResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_output_file(mut self, path: PathBuf) -> Self {
        self.output_file = Some(path);
        self
    }

    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }
}

/// Outcome of a judge stage.
///
/// `needs_changes` is independent of `step.success`: a judge can run cleanly
/// and still reject the work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JudgeResult {
    pub step: StepResult,
    pub needs_changes: bool,
    pub feedback_file: Option<PathBuf>,
    /// The judge's stdout.
    pub verdict: String,
}

pub type ValidateResult = JudgeResult;
pub type ReviewResult = JudgeResult;

impl JudgeResult {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            step: StepResult::failed(message),
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.step.success
    }

    /// Feedback to hand to the next builder round: the feedback artifact's
    /// text, or the verdict itself when no artifact was written.
    pub fn feedback_text(&self) -> String {
        self.feedback_file
            .as_deref()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| self.verdict.clone())
    }
}

/// Runs individual stages against one configuration.
pub struct StageRunner<'a> {
    config: &'a Config,
    invoker: Arc<dyn AgentInvoker>,
    builder: Box<dyn BuilderSession>,
    plan_judge: Box<dyn VerdictClassifier>,
    review_judge: Box<dyn VerdictClassifier>,
    reporter: &'a Reporter,
}

impl<'a> StageRunner<'a> {
    /// Stage runner using the CLI builder session and keyword verdicts.
    pub fn new(config: &'a Config, invoker: Arc<dyn AgentInvoker>, reporter: &'a Reporter) -> Self {
        Self {
            config,
            builder: Box::new(CliBuilderSession::new(invoker.clone())),
            invoker,
            plan_judge: Box::new(KeywordClassifier::plan_validation()),
            review_judge: Box::new(KeywordClassifier::code_review()),
            reporter,
        }
    }

    pub fn with_builder(mut self, builder: Box<dyn BuilderSession>) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_classifiers(
        mut self,
        plan_judge: Box<dyn VerdictClassifier>,
        review_judge: Box<dyn VerdictClassifier>,
    ) -> Self {
        self.plan_judge = plan_judge;
        self.review_judge = review_judge;
        self
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    pub fn reporter(&self) -> &Reporter {
        self.reporter
    }

    /// Render the stage's template for `issue`, checking skills in `worktree`.
    fn load_template(
        &self,
        stage: Stage,
        issue: &Issue,
        worktree: &Path,
    ) -> Result<StepConfig, ConfigError> {
        let path = self.config.template_path(stage.slug());
        self.reporter
            .log_step(&format!("loading template {}", path.display()));
        template::load(&path, issue, Some(worktree))
    }

    /// Where a stage's agent writes its artifact inside `worktree`.
    fn artifact_dir(&self, stage: Stage, worktree: &Path) -> PathBuf {
        worktree.join(stage.output_dir().unwrap_or("docs"))
    }

    /// Fail fast when a stage that needs the worktree runs without one.
    fn require_worktree(&self, stage: Stage, worktree: &Path) -> Option<String> {
        if worktree.is_dir() {
            None
        } else {
            Some(format!(
                "{} needs the worktree at {}; run spawn first",
                stage,
                worktree.display()
            ))
        }
    }
}
