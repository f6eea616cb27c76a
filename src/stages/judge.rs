use std::path::{Path, PathBuf};

use super::{
    ArtifactSnapshot, JudgeResult, ReviewResult, Stage, StageRunner, StepResult, ValidateResult,
};
use crate::agent::AgentOutput;
use crate::orchestrator::WorkflowContext;

impl StageRunner<'_> {
    /// Judge the current plan. Looping on the verdict is the caller's job.
    pub async fn validate(&self, ctx: &WorkflowContext) -> ValidateResult {
        let (output, feedback_file) = match self.run_judge(Stage::Validate, ctx).await {
            Ok(judged) => judged,
            Err(result) => return result,
        };
        let needs_changes = self.plan_judge.needs_changes(&output.stdout);

        let message = if needs_changes {
            "Plan needs changes"
        } else {
            "Plan approved"
        };
        JudgeResult {
            step: StepResult::ok(message),
            needs_changes,
            feedback_file,
            verdict: output.stdout,
        }
    }

    /// Judge the implementation.
    ///
    /// Needs changes when either the stdout verdict or a review artifact
    /// written by this invocation matches the review vocabulary.
    pub async fn review(&self, ctx: &WorkflowContext) -> ReviewResult {
        let (output, review_file) = match self.run_judge(Stage::Review, ctx).await {
            Ok(judged) => judged,
            Err(result) => return result,
        };

        let stdout_flag = self.review_judge.needs_changes(&output.stdout);
        let artifact_flag = review_file
            .as_deref()
            .map(|path| self.artifact_needs_changes(path))
            .unwrap_or(false);
        let needs_changes = stdout_flag || artifact_flag;

        let message = if needs_changes {
            "Implementation needs changes"
        } else {
            "Implementation approved"
        };
        let step = match &review_file {
            Some(path) => StepResult::ok(message).with_output_file(path.clone()),
            None => StepResult::ok(message),
        };
        JudgeResult {
            step,
            needs_changes,
            feedback_file: review_file,
            verdict: output.stdout,
        }
    }

    fn artifact_needs_changes(&self, path: &Path) -> bool {
        match std::fs::read_to_string(path) {
            Ok(text) => self.review_judge.needs_changes(&text),
            Err(e) => {
                self.reporter.warn(&format!(
                    "Could not read review artifact {}: {}",
                    path.display(),
                    e
                ));
                false
            }
        }
    }

    /// Render and run a judge stage, returning its output and the artifact
    /// it wrote, if any. A failed result comes back as `Err`.
    async fn run_judge(
        &self,
        stage: Stage,
        ctx: &WorkflowContext,
    ) -> Result<(AgentOutput, Option<PathBuf>), JudgeResult> {
        let worktree = &ctx.worktree_dir;
        if let Some(message) = self.require_worktree(stage, worktree) {
            return Err(JudgeResult::failed(message));
        }
        let config = self
            .load_template(stage, &ctx.issue, worktree)
            .map_err(|e| JudgeResult::failed(format!("{} failed: {}", stage, e)))?;

        self.reporter
            .log_step(&format!("{}: {}", stage, config.display_command()));
        let delivery = config.delivery_or(stage.default_delivery());
        let snapshot = ArtifactSnapshot::take(&self.artifact_dir(stage, worktree), ctx.issue.id());
        let output = self
            .invoker
            .run(&config, delivery, worktree)
            .await
            .map_err(|e| JudgeResult::failed(format!("{} failed: {}", stage, e)))?;
        let output = output
            .into_result(&config.command)
            .map_err(|e| JudgeResult::failed(format!("{} failed: {}", stage, e)))?;
        Ok((output, snapshot.fresh_artifact()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::Issue;
    use crate::template::PromptDelivery;
    use crate::test_support::{
        REVIEWER, Response, ScriptedInvoker, VALIDATOR, config_for, write_templates,
    };
    use crate::ui::Reporter;
    use crate::verdict::NEEDS_CHANGES_KEYWORDS;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, WorkflowContext) {
        let dir = tempdir().unwrap();
        write_templates(dir.path());
        let issue = Issue::new("HLN-9793", "Upgrade to Node v24", "").unwrap();
        let worktree = dir.path().join("hln-9793");
        std::fs::create_dir_all(&worktree).unwrap();
        (dir, WorkflowContext::new(issue, worktree))
    }

    #[tokio::test]
    async fn test_validate_keyword_sets_needs_changes() {
        for keyword in NEEDS_CHANGES_KEYWORDS {
            let (dir, ctx) = setup();
            let invoker = Arc::new(ScriptedInvoker::new());
            invoker.respond(VALIDATOR, 0, &format!("Verdict: {}.", keyword));
            let config = config_for(dir.path());
            let reporter = Reporter::quiet();
            let runner = StageRunner::new(&config, invoker.clone(), &reporter);

            let result = runner.validate(&ctx).await;
            assert!(result.success());
            assert!(result.needs_changes, "keyword '{}' not detected", keyword);
        }
    }

    #[tokio::test]
    async fn test_validate_clean_verdict_passes_prompt_as_argument() {
        let (dir, ctx) = setup();
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.respond(VALIDATOR, 0, "Looks good to me.");
        let config = config_for(dir.path());
        let reporter = Reporter::quiet();
        let runner = StageRunner::new(&config, invoker.clone(), &reporter);

        let result = runner.validate(&ctx).await;

        assert!(result.success());
        assert!(!result.needs_changes);
        assert_eq!(invoker.calls()[0].delivery, PromptDelivery::Argument);
    }

    #[tokio::test]
    async fn test_validate_process_failure_is_not_success() {
        let (dir, ctx) = setup();
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.push(VALIDATOR, Response::exit(1, "crashed"));
        let config = config_for(dir.path());
        let reporter = Reporter::quiet();
        let runner = StageRunner::new(&config, invoker.clone(), &reporter);

        let result = runner.validate(&ctx).await;
        assert!(!result.success());
        assert!(!result.needs_changes);
        assert!(result.step.message.contains("crashed"));
    }

    #[tokio::test]
    async fn test_validate_records_feedback_file() {
        let (dir, ctx) = setup();
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.push(
            VALIDATOR,
            Response::ok("needs changes")
                .writing("docs/validation/HLN-9793_upgrade_to_node_v24.md", "add tests"),
        );
        let config = config_for(dir.path());
        let reporter = Reporter::quiet();
        let runner = StageRunner::new(&config, invoker.clone(), &reporter);

        let result = runner.validate(&ctx).await;
        assert!(result.needs_changes);
        assert_eq!(result.feedback_text(), "add tests");
    }

    #[tokio::test]
    async fn test_review_critical_counts_only_for_review() {
        let (dir, ctx) = setup();
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.respond(REVIEWER, 0, "One critical bug remains.");
        let config = config_for(dir.path());
        let reporter = Reporter::quiet();
        let runner = StageRunner::new(&config, invoker.clone(), &reporter);

        assert!(runner.review(&ctx).await.needs_changes);
    }

    #[tokio::test]
    async fn test_review_artifact_alone_can_request_changes() {
        let (dir, ctx) = setup();
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.push(
            REVIEWER,
            Response::ok("Review written.").writing(
                "docs/reviews/HLN-9793_upgrade_to_node_v24.md",
                "Error handling must be fixed.",
            ),
        );
        let config = config_for(dir.path());
        let reporter = Reporter::quiet();
        let runner = StageRunner::new(&config, invoker.clone(), &reporter);

        let result = runner.review(&ctx).await;
        assert!(result.success());
        assert!(result.needs_changes);
        assert_eq!(result.feedback_text(), "Error handling must be fixed.");
    }

    #[tokio::test]
    async fn test_review_clean() {
        let (dir, ctx) = setup();
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.push(
            REVIEWER,
            Response::ok("Approved.")
                .writing("docs/reviews/HLN-9793_upgrade_to_node_v24.md", "All good."),
        );
        let config = config_for(dir.path());
        let reporter = Reporter::quiet();
        let runner = StageRunner::new(&config, invoker.clone(), &reporter);

        let result = runner.review(&ctx).await;
        assert!(result.success());
        assert!(!result.needs_changes);
        assert!(result.step.output_file.is_some());
    }

    #[tokio::test]
    async fn test_review_ignores_artifact_left_by_earlier_round() {
        let (dir, ctx) = setup();
        let reviews = ctx.worktree_dir.join("docs/reviews");
        std::fs::create_dir_all(&reviews).unwrap();
        std::fs::write(reviews.join("HLN-9793_round_one.md"), "This must be fixed.").unwrap();

        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.respond(REVIEWER, 0, "Approved, looks great.");
        let config = config_for(dir.path());
        let reporter = Reporter::quiet();
        let runner = StageRunner::new(&config, invoker.clone(), &reporter);

        let result = runner.review(&ctx).await;
        assert!(result.success());
        assert!(!result.needs_changes);
        assert_eq!(result.feedback_file, None);
        assert_eq!(result.step.output_file, None);
    }

    #[tokio::test]
    async fn test_validate_ignores_stale_feedback_file() {
        let (dir, ctx) = setup();
        let validation = ctx.worktree_dir.join("docs/validation");
        std::fs::create_dir_all(&validation).unwrap();
        std::fs::write(validation.join("HLN-9793_old.md"), "outdated notes").unwrap();

        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.respond(VALIDATOR, 0, "The plan needs changes: split step 3.");
        let config = config_for(dir.path());
        let reporter = Reporter::quiet();
        let runner = StageRunner::new(&config, invoker.clone(), &reporter);

        let result = runner.validate(&ctx).await;
        assert!(result.needs_changes);
        assert_eq!(result.feedback_file, None);
        assert_eq!(result.feedback_text(), "The plan needs changes: split step 3.");
    }

    struct Approver;

    impl crate::verdict::VerdictClassifier for Approver {
        fn needs_changes(&self, _verdict: &str) -> bool {
            false
        }

        fn is_complete(&self, _verdict: &str) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_injected_classifier_decides_verdict() {
        let (dir, ctx) = setup();
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.respond(VALIDATOR, 0, "This plan needs changes");
        invoker.respond(REVIEWER, 0, "critical: issues found");
        let config = config_for(dir.path());
        let reporter = Reporter::quiet();
        let runner = StageRunner::new(&config, invoker.clone(), &reporter)
            .with_classifiers(Box::new(Approver), Box::new(Approver));

        assert!(!runner.validate(&ctx).await.needs_changes);
        assert!(!runner.review(&ctx).await.needs_changes);
    }
}
