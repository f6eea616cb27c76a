//! Effective configuration view: `ralph config`.

use anyhow::Result;
use console::style;
use std::path::PathBuf;

use ralph::config::{Config, SHELL_TIMEOUT_ENV};
use ralph::stages::Stage;

pub fn cmd_config(root: PathBuf, verbose: bool) -> Result<()> {
    let config = Config::new(root, verbose)?;
    let config_file = config.config_file();

    println!();
    println!("Ralph Configuration");
    println!("===================");
    println!();
    if config_file.exists() {
        println!("Config file: {}", config_file.display());
    } else {
        println!("Config file: {} (not present, using defaults)", config_file.display());
    }
    println!();
    println!("  root             = {}", config.root.display());
    println!("  templates_dir    = {}", config.templates_dir.display());
    println!("  base_ref         = {}", config.base_ref);
    println!(
        "  shell_timeout_ms = {} (override with {})",
        config.shell_timeout.as_millis(),
        SHELL_TIMEOUT_ENV
    );
    println!("  pr_tool          = {}", config.pr_tool);
    println!("  remote           = {}", config.remote);
    println!();

    println!("Stage templates:");
    for stage in Stage::ALL {
        if stage == Stage::Spawn {
            continue;
        }
        let path = config.template_path(stage.slug());
        let mark = if path.exists() {
            style("found").green()
        } else {
            style("missing").red()
        };
        println!("  {:<10} {} [{}]", stage.slug(), path.display(), mark);
    }
    Ok(())
}
