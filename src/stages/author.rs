use super::{ArtifactSnapshot, Stage, StageRunner, StepResult};
use crate::errors::ArtifactMissingError;
use crate::orchestrator::WorkflowContext;

/// Research and Plan each get one retry.
pub const AUTHOR_ATTEMPTS: u32 = 2;

impl StageRunner<'_> {
    /// Research the issue into `docs/research/<id>_<topic>.md`.
    pub async fn research(&self, ctx: &WorkflowContext) -> StepResult {
        self.author(Stage::Research, ctx).await
    }

    /// Write an implementation plan into `docs/plans/<id>_<topic>.md`.
    ///
    /// Always a fresh builder session.
    pub async fn plan(&self, ctx: &WorkflowContext) -> StepResult {
        self.author(Stage::Plan, ctx).await
    }

    /// Run a document-producing builder stage until it writes an artifact.
    ///
    /// Files already in the output directory before the first attempt only
    /// count once the agent rewrites them.
    ///
    /// Template errors fail at once; process failures and missing artifacts
    /// are retried up to [`AUTHOR_ATTEMPTS`] invocations in total.
    async fn author(&self, stage: Stage, ctx: &WorkflowContext) -> StepResult {
        let worktree = &ctx.worktree_dir;
        if let Some(message) = self.require_worktree(stage, worktree) {
            return StepResult::failed(message);
        }
        let config = match self.load_template(stage, &ctx.issue, worktree) {
            Ok(config) => config,
            Err(e) => return StepResult::failed(format!("{} failed: {}", stage, e)),
        };
        let output_dir = self.artifact_dir(stage, worktree);
        let expected = ctx.issue.artifact_path(&output_dir);
        let snapshot = ArtifactSnapshot::take(&output_dir, ctx.issue.id());

        let mut last_error = String::new();
        for attempt in 1..=AUTHOR_ATTEMPTS {
            if attempt > 1 {
                self.reporter.retrying(stage.name(), &last_error);
            }
            self.reporter
                .log_step(&format!("{} attempt {}: {}", stage, attempt, config.display_command()));

            let turn = match self.builder.start(&config, worktree).await {
                Ok(turn) => turn,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };
            if let Err(e) = turn.output.into_result(&config.command) {
                last_error = e.to_string();
                continue;
            }

            match snapshot.fresh_artifact() {
                Some(path) => {
                    return StepResult::ok(format!("{} written to {}", stage, path.display()))
                        .with_output_file(path);
                }
                None => {
                    last_error = ArtifactMissingError {
                        stage: stage.name().to_string(),
                        expected: expected.clone(),
                    }
                    .to_string();
                }
            }
        }

        StepResult::failed(format!(
            "{} failed after {} attempts: {}",
            stage, AUTHOR_ATTEMPTS, last_error
        ))
    }
}
