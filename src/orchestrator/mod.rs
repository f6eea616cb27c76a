pub mod context;
pub mod runner;

pub use context::WorkflowContext;
pub use runner::{
    MAX_CODE_REVIEW_ATTEMPTS, MAX_PLAN_VALIDATION_ATTEMPTS, RunOutcome, WorkflowRunner,
};
