use crate::ui::icons::{CHECK, CROSS, LOCK, RETRY, REVIEW, SPARKLE, WARN};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// User-facing progress output for a ralph invocation.
///
/// Created once at process entry and passed by reference to everything that
/// reports progress. `verbose` controls whether step-level detail is printed;
/// stage outcomes are always shown.
///
/// A spinner tracks the stage currently running. Lines are printed through
/// `MultiProgress` so they never tear the spinner.
pub struct Reporter {
    multi: MultiProgress,
    spinner: Mutex<Option<ProgressBar>>,
    verbose: bool,
    quiet: bool,
}

impl Reporter {
    /// Reporter drawing to stderr.
    pub fn new(verbose: bool) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
            spinner: Mutex::new(None),
            verbose,
            quiet: false,
        }
    }

    /// Reporter that renders nothing, for tests and non-interactive callers.
    pub fn quiet() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            spinner: Mutex::new(None),
            verbose: false,
            quiet: true,
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.quiet {
            return;
        }
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    fn stop_spinner(&self) {
        if let Ok(mut guard) = self.spinner.lock()
            && let Some(bar) = guard.take()
        {
            bar.finish_and_clear();
        }
    }

    /// Print the banner for a run.
    pub fn run_header(&self, issue_id: &str, title: &str) {
        self.print_line("");
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line(format!(
            "{} {}: {}",
            style("▶").green().bold(),
            style(issue_id).yellow().bold(),
            title
        ));
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line("");
    }

    /// Start the spinner for a stage.
    ///
    /// `attempt` is `(current, max)` when the stage runs inside a bounded loop.
    pub fn start_stage(&self, stage: &str, attempt: Option<(u32, u32)>) {
        self.stop_spinner();
        let label = match attempt {
            Some((n, max)) => format!(
                "{} {}",
                style(stage).cyan().bold(),
                style(format!("(attempt {}/{})", n, max)).dim()
            ),
            None => format!("{}", style(stage).cyan().bold()),
        };
        tracing::info!(stage, ?attempt, "stage started");

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {msg}")
                .expect("progress bar template is a valid static string"),
        );
        bar.set_message(label);
        if !self.quiet {
            bar.enable_steady_tick(Duration::from_millis(100));
        }
        if let Ok(mut guard) = self.spinner.lock() {
            *guard = Some(bar);
        }
    }

    /// Detail line, printed in verbose mode only.
    pub fn log_step(&self, msg: &str) {
        tracing::debug!("{}", msg);
        if self.verbose {
            self.print_line(format!("    {} {}", style("→").dim(), style(msg).dim()));
        }
    }

    pub fn stage_success(&self, stage: &str, message: &str) {
        self.stop_spinner();
        tracing::info!(stage, message, "stage succeeded");
        self.print_line(format!(
            "{}{} {}",
            CHECK,
            style(stage).green().bold(),
            message
        ));
    }

    pub fn stage_failed(&self, stage: &str, message: &str) {
        self.stop_spinner();
        tracing::warn!(stage, message, "stage failed");
        self.print_line(format!(
            "{}{} {}",
            CROSS,
            style(stage).red().bold(),
            message
        ));
    }

    /// A judge asked for another round.
    pub fn needs_changes(&self, loop_name: &str, attempt: u32, max: u32) {
        tracing::info!(loop_name, attempt, max, "judge requested changes");
        self.print_line(format!(
            "{}{} needs changes {}",
            REVIEW,
            loop_name,
            style(format!("(attempt {}/{})", attempt, max)).yellow()
        ));
    }

    pub fn retrying(&self, stage: &str, reason: &str) {
        tracing::info!(stage, reason, "retrying stage");
        self.print_line(format!(
            "    {}{} {}",
            RETRY,
            style(format!("Retrying {}:", stage)).yellow(),
            reason
        ));
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
        self.print_line(format!("{}{}", WARN, style(message).yellow()));
    }

    pub fn lock_held(&self, message: &str) {
        self.print_line(format!("{}{}", LOCK, style(message).red()));
    }

    pub fn run_complete(&self, message: &str) {
        self.stop_spinner();
        self.print_line(format!(
            "\n{}{}\n",
            SPARKLE,
            style(message).green().bold()
        ));
    }

    pub fn run_failed(&self, message: &str) {
        self.stop_spinner();
        self.print_line(format!("\n{}{}\n", CROSS, style(message).red().bold()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_reporter_accepts_all_events() {
        let reporter = Reporter::quiet();
        assert!(!reporter.is_verbose());
        reporter.run_header("HLN-1", "Title");
        reporter.start_stage("Plan", Some((1, 4)));
        reporter.log_step("running planner");
        reporter.needs_changes("Plan validation", 1, 4);
        reporter.start_stage("Validate", None);
        reporter.stage_failed("Validate", "boom");
        reporter.run_failed("boom");
        assert!(reporter.spinner.lock().unwrap().is_none());
    }

    #[test]
    fn test_verbose_flag_is_kept() {
        assert!(Reporter::new(true).is_verbose());
        assert!(!Reporter::new(false).is_verbose());
    }
}
