use crate::errors::AttemptsExhausted;
use crate::issue::Issue;
use crate::lock::{LockGuard, LockManager};
use crate::orchestrator::WorkflowContext;
use crate::stages::{Stage, StageRunner, StepResult};

/// Plan and Validate run at most this many times per run.
pub const MAX_PLAN_VALIDATION_ATTEMPTS: u32 = 4;

/// Implement and Review run at most this many times per run.
pub const MAX_CODE_REVIEW_ATTEMPTS: u32 = 4;

/// Lock command recorded for a full pipeline run.
pub const RUN_COMMAND: &str = "run";

/// Result of a full workflow run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    pub message: String,
    /// Present once Spawn has succeeded.
    pub context: Option<WorkflowContext>,
}

impl RunOutcome {
    fn succeeded(message: String, context: WorkflowContext) -> Self {
        Self {
            success: true,
            message,
            context: Some(context),
        }
    }

    fn failed(message: impl Into<String>, context: Option<WorkflowContext>) -> Self {
        Self {
            success: false,
            message: message.into(),
            context,
        }
    }
}

/// Sequences the stages for one issue.
///
/// Spawn, Research, then Plan and Validate until the plan is approved, then
/// Implement and Review until the code is approved, then Publish. Any stage
/// failure ends the run; a judge asking for changes only repeats its loop,
/// up to the loop's attempt cap. The root lock is held for the whole run and
/// released on every exit path.
pub struct WorkflowRunner<'a> {
    stages: StageRunner<'a>,
    locks: LockManager,
}

impl<'a> WorkflowRunner<'a> {
    pub fn new(stages: StageRunner<'a>) -> Self {
        Self {
            stages,
            locks: LockManager::new(),
        }
    }

    pub fn with_lock_manager(mut self, locks: LockManager) -> Self {
        self.locks = locks;
        self
    }

    pub async fn run(&self, issue: Issue) -> RunOutcome {
        let config = self.stages.config();
        let reporter = self.stages.reporter();

        let _lock = match LockGuard::acquire(&self.locks, &config.root, issue.id(), RUN_COMMAND) {
            Ok(guard) => guard,
            Err(e) => {
                let message = format!("{:#}", e);
                reporter.lock_held(&message);
                return RunOutcome::failed(message, None);
            }
        };
        reporter.run_header(issue.id(), issue.title());

        reporter.start_stage(Stage::Spawn.name(), None);
        let spawned = self.stages.spawn(&issue).await;
        if !self.report(Stage::Spawn, &spawned) {
            return RunOutcome::failed(spawned.message, None);
        }

        let worktree_dir = config.worktree_dir(&issue);
        let mut ctx = WorkflowContext::new(issue, worktree_dir);

        reporter.start_stage(Stage::Research.name(), None);
        let research = self.stages.research(&ctx).await;
        if !self.report(Stage::Research, &research) {
            return RunOutcome::failed(research.message, Some(ctx));
        }

        if let Err(message) = self.plan_loop(&mut ctx).await {
            return RunOutcome::failed(message, Some(ctx));
        }
        if let Err(message) = self.review_loop(&mut ctx).await {
            return RunOutcome::failed(message, Some(ctx));
        }

        reporter.start_stage(Stage::Publish.name(), None);
        let published = self.stages.publish(&ctx).await;
        if !self.report(Stage::Publish, &published) {
            return RunOutcome::failed(published.message, Some(ctx));
        }

        reporter.run_complete(&published.message);
        RunOutcome::succeeded(published.message, ctx)
    }

    /// Plan then Validate until the plan is approved.
    async fn plan_loop(&self, ctx: &mut WorkflowContext) -> Result<(), String> {
        let reporter = self.stages.reporter();
        loop {
            let attempt = Some((ctx.plan_validation_attempts + 1, MAX_PLAN_VALIDATION_ATTEMPTS));

            reporter.start_stage(Stage::Plan.name(), attempt);
            let plan = self.stages.plan(ctx).await;
            if !self.report(Stage::Plan, &plan) {
                return Err(plan.message);
            }

            reporter.start_stage(Stage::Validate.name(), attempt);
            let validation = self.stages.validate(ctx).await;
            if !self.report(Stage::Validate, &validation.step) {
                return Err(validation.step.message);
            }
            ctx.plan_validation_attempts += 1;

            if !validation.needs_changes {
                return Ok(());
            }
            if ctx.plan_validation_attempts >= MAX_PLAN_VALIDATION_ATTEMPTS {
                let message = AttemptsExhausted {
                    loop_name: "Plan validation",
                    attempts: ctx.plan_validation_attempts,
                }
                .to_string();
                reporter.run_failed(&message);
                return Err(message);
            }
            reporter.needs_changes(
                "Plan validation",
                ctx.plan_validation_attempts,
                MAX_PLAN_VALIDATION_ATTEMPTS,
            );
        }
    }

    /// Implement then Review until the code is approved, carrying each
    /// review's feedback into the next Implement.
    async fn review_loop(&self, ctx: &mut WorkflowContext) -> Result<(), String> {
        let reporter = self.stages.reporter();
        let mut feedback: Option<String> = None;
        loop {
            let attempt = Some((ctx.code_review_attempts + 1, MAX_CODE_REVIEW_ATTEMPTS));

            reporter.start_stage(Stage::Implement.name(), attempt);
            let implemented = self.stages.implement(ctx, feedback.as_deref()).await;
            if !self.report(Stage::Implement, &implemented) {
                return Err(implemented.message);
            }

            reporter.start_stage(Stage::Review.name(), attempt);
            let review = self.stages.review(ctx).await;
            if !self.report(Stage::Review, &review.step) {
                return Err(review.step.message);
            }
            ctx.code_review_attempts += 1;

            if !review.needs_changes {
                return Ok(());
            }
            if ctx.code_review_attempts >= MAX_CODE_REVIEW_ATTEMPTS {
                let message = AttemptsExhausted {
                    loop_name: "Code review",
                    attempts: ctx.code_review_attempts,
                }
                .to_string();
                reporter.run_failed(&message);
                return Err(message);
            }
            reporter.needs_changes(
                "Code review",
                ctx.code_review_attempts,
                MAX_CODE_REVIEW_ATTEMPTS,
            );
            feedback = Some(review.feedback_text());
        }
    }

    /// Print a stage outcome; returns whether the run may continue.
    fn report(&self, stage: Stage, result: &StepResult) -> bool {
        let reporter = self.stages.reporter();
        if result.success {
            reporter.stage_success(stage.name(), &result.message);
        } else {
            reporter.stage_failed(stage.name(), &result.message);
        }
        result.success
    }
}
