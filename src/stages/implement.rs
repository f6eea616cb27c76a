use super::{Stage, StageRunner, StepResult};
use crate::orchestrator::WorkflowContext;
use crate::session::SessionStore;

impl StageRunner<'_> {
    /// Run the builder on the code.
    ///
    /// With review `feedback` and a known session (from `ctx` or the session
    /// file) the builder resumes that session; otherwise it starts fresh. The
    /// newest handle, extracted or previously known, is written back to `ctx`
    /// and the session file whatever the outcome.
    pub async fn implement(&self, ctx: &mut WorkflowContext, feedback: Option<&str>) -> StepResult {
        let stage = Stage::Implement;
        let worktree = ctx.worktree_dir.clone();
        if let Some(message) = self.require_worktree(stage, &worktree) {
            return StepResult::failed(message);
        }
        let config = match self.load_template(stage, &ctx.issue, &worktree) {
            Ok(config) => config,
            Err(e) => return StepResult::failed(format!("{} failed: {}", stage, e)),
        };

        let store = SessionStore::new(&worktree);
        let known = ctx.session_id.clone().or_else(|| store.load());
        let feedback = feedback.map(str::trim).filter(|text| !text.is_empty());
        let config = match feedback {
            Some(text) => config.with_feedback(text),
            None => config,
        };

        let turn = match (&known, feedback) {
            (Some(handle), Some(_)) => {
                self.reporter
                    .log_step(&format!("resuming builder session {}", handle));
                self.builder.resume(handle, &config, &worktree).await
            }
            _ => {
                self.reporter.log_step("starting builder session");
                self.builder.start(&config, &worktree).await
            }
        };

        let (outcome, extracted) = match turn {
            Ok(turn) => (turn.output.into_result(&config.command), turn.handle),
            Err(e) => (Err(e), None),
        };

        let newest = extracted.or(known);
        if let Some(handle) = &newest {
            ctx.session_id = Some(handle.clone());
            if let Err(e) = store.save(handle) {
                self.reporter
                    .warn(&format!("Failed to persist session id: {:#}", e));
            }
        }

        match outcome {
            Ok(_) => StepResult::ok("Implementation complete").with_session_id(newest),
            Err(e) => StepResult::failed(format!("{} failed: {}", stage, e)).with_session_id(newest),
        }
    }
}
