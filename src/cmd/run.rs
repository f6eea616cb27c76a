//! Full pipeline: `ralph run`.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ralph::agent::{AgentInvoker, ProcessInvoker};
use ralph::orchestrator::WorkflowRunner;
use ralph::stages::StageRunner;
use ralph::ui::Reporter;

use super::{load_config, read_issue};

pub async fn cmd_run(root: PathBuf, verbose: bool, issue_file: Option<&Path>) -> Result<()> {
    let issue = read_issue(issue_file)?;
    let config = load_config(root, verbose)?;
    let reporter = Reporter::new(verbose);
    let invoker: Arc<dyn AgentInvoker> = Arc::new(ProcessInvoker::new());

    let runner = WorkflowRunner::new(StageRunner::new(&config, invoker, &reporter));
    let outcome = runner.run(issue).await;

    if let Some(ctx) = &outcome.context {
        tracing::info!(
            plan_validation_attempts = ctx.plan_validation_attempts,
            code_review_attempts = ctx.code_review_attempts,
            session_id = ?ctx.session_id,
            "run finished"
        );
    }
    if !outcome.success {
        anyhow::bail!(outcome.message);
    }
    println!("{}", outcome.message);
    Ok(())
}
