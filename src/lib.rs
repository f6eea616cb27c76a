pub mod agent;
pub mod config;
pub mod errors;
pub mod issue;
pub mod lock;
pub mod logging;
pub mod orchestrator;
pub mod ralph_config;
pub mod readme;
pub mod session;
pub mod shell;
pub mod skills;
pub mod stages;
pub mod template;
pub mod ui;
pub mod verdict;
pub mod worktree;

#[cfg(test)]
pub(crate) mod test_support;
