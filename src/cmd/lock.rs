//! Lock inspection and recovery: `ralph lock status|release`.

use anyhow::Result;
use console::style;
use std::path::PathBuf;

use ralph::config::Config;
use ralph::lock::{LockManager, lock_path};

use super::super::LockCommands;

pub fn cmd_lock(root: PathBuf, verbose: bool, command: &LockCommands) -> Result<()> {
    let config = Config::new(root, verbose)?;
    let locks = LockManager::new();
    let path = lock_path(&config.root);

    match command {
        LockCommands::Status => match locks.read_lock_info(&config.root) {
            Some(info) => {
                let state = if locks.is_locked(&config.root) {
                    style("live").green()
                } else {
                    style("stale").yellow()
                };
                println!("Lock: {} [{}]", path.display(), state);
                println!("  pid:     {}", info.pid);
                println!("  issue:   {}", info.issue_id);
                println!("  command: {}", info.command);
                println!("  started: {}", info.started_at.to_rfc3339());
            }
            None if path.exists() => {
                println!("Lock: {} [{}]", path.display(), style("unreadable").yellow());
            }
            None => println!("No lock held"),
        },
        LockCommands::Release { force } => {
            if !path.exists() {
                println!("No lock to remove");
            } else if !*force && locks.is_locked(&config.root) {
                let holder = locks
                    .read_lock_info(&config.root)
                    .map(|info| info.to_error().to_string())
                    .unwrap_or_else(|| "Lock is held".to_string());
                anyhow::bail!("{}; pass --force to remove it anyway", holder);
            } else {
                locks.force_remove(&config.root)?;
                println!("Lock removed");
            }
        }
    }
    Ok(())
}
