use super::{StageRunner, StepResult};
use crate::issue::Issue;
use crate::readme::discover_commands;
use crate::shell::run_shell;
use crate::worktree::{WorktreeStatus, ensure_worktree};

impl StageRunner<'_> {
    /// Create or reuse the issue's worktree, then run its README setup commands.
    ///
    /// The first failing or timed-out command stops the stage.
    pub async fn spawn(&self, issue: &Issue) -> StepResult {
        let reporter = self.reporter;
        let worktree_dir = self.config.worktree_dir(issue);

        let status = match ensure_worktree(
            &self.config.root,
            &worktree_dir,
            &issue.worktree_name(),
            &issue.branch_name(),
            &self.config.base_ref,
        ) {
            Ok(status) => status,
            Err(e) => return StepResult::failed(format!("Failed to prepare worktree: {:#}", e)),
        };
        reporter.log_step(&match status {
            WorktreeStatus::Reused => format!("reusing worktree {}", worktree_dir.display()),
            WorktreeStatus::Created => format!("created worktree {}", worktree_dir.display()),
        });

        let commands = match discover_commands(&worktree_dir) {
            Ok(commands) => commands,
            Err(e) => return StepResult::failed(format!("Failed to read README: {}", e)),
        };

        for setup in &commands {
            reporter.log_step(&format!("running `{}`", setup.command));
            let output =
                match run_shell(&setup.command, &worktree_dir, self.config.shell_timeout).await {
                    Ok(output) => output,
                    Err(e) => {
                        return StepResult::failed(format!(
                            "Setup command `{}` could not run: {:#}",
                            setup.command, e
                        ));
                    }
                };
            if output.timed_out {
                return StepResult::failed(format!(
                    "Setup command `{}` timed out after {} ms",
                    setup.command,
                    self.config.shell_timeout.as_millis()
                ));
            }
            if !output.success() {
                return StepResult::failed(format!(
                    "Setup command `{}` exited with code {}: {}",
                    setup.command,
                    output.exit_code,
                    output.stderr.trim()
                ));
            }
        }

        let verb = match status {
            WorktreeStatus::Reused => "reused",
            WorktreeStatus::Created => "created",
        };
        StepResult::ok(format!(
            "Worktree {} at {} ({} setup command(s) passed)",
            verb,
            worktree_dir.display(),
            commands.len()
        ))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use crate::issue::Issue;
    use crate::stages::StageRunner;
    use crate::test_support::{ScriptedInvoker, config_for};
    use crate::ui::Reporter;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn issue() -> Issue {
        Issue::new("HLN-1", "Setup", "").unwrap()
    }

    #[tokio::test]
    async fn test_spawn_reuses_worktree_and_runs_commands_in_order() {
        let dir = tempdir().unwrap();
        let worktree = dir.path().join("hln-1");
        std::fs::create_dir_all(&worktree).unwrap();
        std::fs::write(
            worktree.join("README.md"),
            "## Test\n```\necho test >> order.txt\n```\n## Install\n```\necho install >> order.txt\n```\n",
        )
        .unwrap();

        let config = config_for(dir.path());
        let reporter = Reporter::quiet();
        let runner = StageRunner::new(&config, Arc::new(ScriptedInvoker::new()), &reporter);

        let result = runner.spawn(&issue()).await;
        assert!(result.success, "{}", result.message);
        assert!(result.message.contains("reused"));
        let order = std::fs::read_to_string(worktree.join("order.txt")).unwrap();
        assert_eq!(order, "install\ntest\n");
    }

    #[tokio::test]
    async fn test_spawn_stops_at_first_failing_command() {
        let dir = tempdir().unwrap();
        let worktree = dir.path().join("hln-1");
        std::fs::create_dir_all(&worktree).unwrap();
        std::fs::write(
            worktree.join("README.md"),
            "## Install\n```\nexit 4\n```\n## Build\n```\ntouch built\n```\n",
        )
        .unwrap();

        let config = config_for(dir.path());
        let reporter = Reporter::quiet();
        let runner = StageRunner::new(&config, Arc::new(ScriptedInvoker::new()), &reporter);

        let result = runner.spawn(&issue()).await;
        assert!(!result.success);
        assert!(result.message.contains("exit 4"));
        assert!(result.message.contains("code 4"));
        assert!(!worktree.join("built").exists());
    }

    #[tokio::test]
    async fn test_spawn_times_out_slow_command() {
        let dir = tempdir().unwrap();
        let worktree = dir.path().join("hln-1");
        std::fs::create_dir_all(&worktree).unwrap();
        std::fs::write(worktree.join("README.md"), "## Build\n```\nsleep 5\n```\n").unwrap();

        let mut config = config_for(dir.path());
        config.shell_timeout = Duration::from_millis(100);
        let reporter = Reporter::quiet();
        let runner = StageRunner::new(&config, Arc::new(ScriptedInvoker::new()), &reporter);

        let result = runner.spawn(&issue()).await;
        assert!(!result.success);
        assert!(result.message.contains("timed out after 100 ms"));
    }
}
