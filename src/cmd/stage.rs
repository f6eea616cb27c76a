//! Single-stage commands: `ralph spawn`, `ralph research`, ... `ralph publish`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ralph::agent::{AgentInvoker, ProcessInvoker};
use ralph::lock::{LockGuard, LockManager};
use ralph::orchestrator::WorkflowContext;
use ralph::stages::{JudgeResult, Stage, StageRunner, StepResult};
use ralph::ui::Reporter;

use super::{load_config, read_issue};

/// Run one stage for the issue, holding the root lock while it runs.
///
/// Judge stages succeed even when they ask for changes; the verdict is
/// printed instead.
pub async fn cmd_stage(
    root: PathBuf,
    verbose: bool,
    stage: Stage,
    issue_file: Option<&Path>,
    feedback_file: Option<&Path>,
) -> Result<()> {
    let issue = read_issue(issue_file)?;
    let feedback = feedback_file
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read feedback file: {}", path.display()))
        })
        .transpose()?;

    let config = load_config(root, verbose)?;
    let reporter = Reporter::new(verbose);
    let locks = LockManager::new();
    let _lock = LockGuard::acquire(&locks, &config.root, issue.id(), stage.slug())?;

    let invoker: Arc<dyn AgentInvoker> = Arc::new(ProcessInvoker::new());
    let stages = StageRunner::new(&config, invoker, &reporter);
    let mut ctx = WorkflowContext::new(issue.clone(), config.worktree_dir(&issue));

    reporter.start_stage(stage.name(), None);
    let (step, judged) = match stage {
        Stage::Spawn => (stages.spawn(&issue).await, None),
        Stage::Research => (stages.research(&ctx).await, None),
        Stage::Plan => (stages.plan(&ctx).await, None),
        Stage::Validate => split(stages.validate(&ctx).await),
        Stage::Implement => (stages.implement(&mut ctx, feedback.as_deref()).await, None),
        Stage::Review => split(stages.review(&ctx).await),
        Stage::Publish => (stages.publish(&ctx).await, None),
    };

    if !step.success {
        reporter.stage_failed(stage.name(), &step.message);
        anyhow::bail!(step.message);
    }
    reporter.stage_success(stage.name(), &step.message);

    println!("{}", step.message);
    if let Some(path) = &step.output_file {
        println!("Output: {}", path.display());
    }
    if let Some(session_id) = &step.session_id {
        println!("Session: {}", session_id);
    }
    if let Some(judge) = judged {
        println!(
            "Verdict: {}",
            if judge.needs_changes {
                "needs changes"
            } else {
                "approved"
            }
        );
        if judge.needs_changes
            && let Some(path) = &judge.feedback_file
        {
            println!("Feedback: {}", path.display());
        }
    }
    Ok(())
}

fn split(result: JudgeResult) -> (StepResult, Option<JudgeResult>) {
    (result.step.clone(), Some(result))
}
