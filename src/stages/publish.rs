use std::path::Path;

use super::{Stage, StageRunner, StepResult};
use crate::errors::AgentProcessError;
use crate::orchestrator::WorkflowContext;
use crate::template::{PromptDelivery, StepConfig};

impl StageRunner<'_> {
    /// Ask the judge whether the work is complete, then push and open a PR.
    pub async fn publish(&self, ctx: &WorkflowContext) -> StepResult {
        let stage = Stage::Publish;
        let pr_tool = &self.config.pr_tool;
        if !self.invoker.exists(pr_tool) {
            let err = AgentProcessError::ToolMissing {
                tool: pr_tool.clone(),
            };
            return StepResult::failed(format!("{} failed: {}", stage, err));
        }

        let worktree = &ctx.worktree_dir;
        if let Some(message) = self.require_worktree(stage, worktree) {
            return StepResult::failed(message);
        }
        let config = match self.load_template(stage, &ctx.issue, worktree) {
            Ok(config) => config,
            Err(e) => return StepResult::failed(format!("{} failed: {}", stage, e)),
        };

        self.reporter
            .log_step(&format!("{}: {}", stage, config.display_command()));
        let verdict = match self
            .invoker
            .run(&config, config.delivery_or(stage.default_delivery()), worktree)
            .await
            .and_then(|output| output.into_result(&config.command))
        {
            Ok(output) => output.stdout,
            Err(e) => return StepResult::failed(format!("{} failed: {}", stage, e)),
        };

        if !self.review_judge.is_complete(&verdict) {
            return StepResult::failed(format!(
                "Publish judge reported incomplete work: {}",
                summarize(&verdict)
            ));
        }

        match self.create_pull_request(ctx, worktree).await {
            Ok(pr_ref) => StepResult::ok(format!("Pull request created: {}", pr_ref)),
            Err(e) => StepResult::failed(format!("{} failed: {}", stage, e)),
        }
    }

    async fn create_pull_request(
        &self,
        ctx: &WorkflowContext,
        worktree: &Path,
    ) -> Result<String, AgentProcessError> {
        let branch = &ctx.branch_name;
        let push = StepConfig::new(
            "git",
            vec![
                "push".into(),
                "-u".into(),
                self.config.remote.clone(),
                branch.clone(),
            ],
            "",
        );
        self.reporter
            .log_step(&format!("pushing: {}", push.display_command()));
        self.invoker
            .run(&push, PromptDelivery::Stdin, worktree)
            .await?
            .into_result("git push")?;

        let issue = &ctx.issue;
        let body = if issue.description().trim().is_empty() {
            "No description provided.".to_string()
        } else {
            issue.description().to_string()
        };
        let create = StepConfig::new(
            self.config.pr_tool.clone(),
            vec![
                "pr".into(),
                "create".into(),
                "--head".into(),
                branch.clone(),
                "--title".into(),
                format!("{}: {}", issue.id(), issue.title()),
                "--body".into(),
                body,
            ],
            "",
        );
        self.reporter.log_step("creating pull request");
        let output = self
            .invoker
            .run(&create, PromptDelivery::Stdin, worktree)
            .await?
            .into_result(&format!("{} pr create", self.config.pr_tool))?;

        let pr_ref = output
            .stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .unwrap_or(branch.as_str())
            .to_string();
        Ok(pr_ref)
    }
}

/// First non-empty line of a verdict, shortened for messages.
fn summarize(verdict: &str) -> String {
    let line = verdict
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("(no output)");
    if line.chars().count() > 200 {
        format!("{}...", line.chars().take(200).collect::<String>())
    } else {
        line.to_string()
    }
}
