use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use ralph::stages::Stage;

mod cmd;

#[derive(Parser)]
#[command(name = "ralph")]
#[command(
    version,
    about = "Drive builder and judge agents through an issue's development workflow"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Working-tree root holding the repository and one worktree per issue (defaults to the current directory)
    #[arg(long, global = true, env = "RALPH_ROOT")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the issue payload comes from.
#[derive(Args, Clone, Debug)]
pub struct IssueArgs {
    /// JSON file with {"id", "title", "description"} (reads stdin if omitted)
    #[arg(long)]
    pub issue_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or reuse the issue's worktree and run its README setup commands
    Spawn(IssueArgs),
    /// Research the issue into docs/research/
    Research(IssueArgs),
    /// Write an implementation plan into docs/plans/
    Plan(IssueArgs),
    /// Judge the current plan
    Validate(IssueArgs),
    /// Implement the plan, optionally resuming with review feedback
    Implement {
        #[command(flatten)]
        issue: IssueArgs,

        /// Review feedback to thread into a resumed builder session
        #[arg(long)]
        feedback_file: Option<PathBuf>,
    },
    /// Judge the implementation
    Review(IssueArgs),
    /// Confirm completeness, push the branch and open a pull request
    Publish(IssueArgs),
    /// Run the whole workflow from spawn to publish
    Run(IssueArgs),
    /// Inspect or clear the root lock
    Lock {
        #[command(subcommand)]
        command: LockCommands,
    },
    /// Show the effective configuration
    Config,
}

#[derive(Subcommand, Clone)]
pub enum LockCommands {
    /// Show who holds the lock
    Status,
    /// Remove a stale lock
    Release {
        /// Remove the lock even if its process is still running
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    ralph::logging::init(cli.verbose);

    let root = match cli.root.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let verbose = cli.verbose;
    match &cli.command {
        Commands::Spawn(args) => {
            cmd::cmd_stage(root, verbose, Stage::Spawn, args.issue_file.as_deref(), None).await?
        }
        Commands::Research(args) => {
            cmd::cmd_stage(root, verbose, Stage::Research, args.issue_file.as_deref(), None).await?
        }
        Commands::Plan(args) => {
            cmd::cmd_stage(root, verbose, Stage::Plan, args.issue_file.as_deref(), None).await?
        }
        Commands::Validate(args) => {
            cmd::cmd_stage(root, verbose, Stage::Validate, args.issue_file.as_deref(), None).await?
        }
        Commands::Implement {
            issue,
            feedback_file,
        } => {
            cmd::cmd_stage(
                root,
                verbose,
                Stage::Implement,
                issue.issue_file.as_deref(),
                feedback_file.as_deref(),
            )
            .await?
        }
        Commands::Review(args) => {
            cmd::cmd_stage(root, verbose, Stage::Review, args.issue_file.as_deref(), None).await?
        }
        Commands::Publish(args) => {
            cmd::cmd_stage(root, verbose, Stage::Publish, args.issue_file.as_deref(), None).await?
        }
        Commands::Run(args) => cmd::cmd_run(root, verbose, args.issue_file.as_deref()).await?,
        Commands::Lock { command } => cmd::cmd_lock(root, verbose, command)?,
        Commands::Config => cmd::cmd_config(root, verbose)?,
    }

    Ok(())
}
