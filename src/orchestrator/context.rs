use std::path::PathBuf;

use crate::issue::Issue;

/// Mutable state of one workflow run, owned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowContext {
    pub issue: Issue,
    pub worktree_dir: PathBuf,
    pub branch_name: String,
    /// Builder session handle recorded by the Implement stage.
    pub session_id: Option<String>,
    pub plan_validation_attempts: u32,
    pub code_review_attempts: u32,
}

impl WorkflowContext {
    pub fn new(issue: Issue, worktree_dir: PathBuf) -> Self {
        let branch_name = issue.branch_name();
        Self {
            issue,
            worktree_dir,
            branch_name,
            session_id: None,
            plan_validation_attempts: 0,
            code_review_attempts: 0,
        }
    }
}
