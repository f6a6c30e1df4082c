//! Settings inspection command

use crate::settings::{self, Settings, SizeSetting};
use crate::util;
use crate::Context as CliContext;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;

/// Where settings are looked up: the work tree if there is a repository
fn lookup_root(ctx: &CliContext) -> PathBuf {
    match util::open_repo(&ctx.repo) {
        Ok(store) => util::settings_root(&store).to_path_buf(),
        Err(_) => ctx.repo.clone(),
    }
}

/// Show the effective settings file contents (before command-line flags)
pub async fn run_show(ctx: &CliContext) -> Result<()> {
    let root = lookup_root(ctx);
    let path = settings::settings_path(ctx.config.as_deref(), &root);
    let settings = settings::load(ctx.config.as_deref(), &root)?;
    // Validate so a broken file is reported here rather than at run time
    let config = settings.rewrite_config(None)?;

    println!("{}", "Scrub Settings".bold());
    if path.exists() {
        println!("{}: {}\n", "Location".dimmed(), path.display().dimmed());
    } else {
        println!("{}\n", "No settings file, showing defaults".dimmed());
    }

    print_settings(&settings);
    tracing::debug!(?config, "validated settings");
    Ok(())
}

fn print_settings(settings: &Settings) {
    println!("{}", "[findings]".yellow());
    match settings.findings_path() {
        Some(path) => println!("  {} = {}", "path".cyan(), path.display()),
        None => println!("  {} = {}", "path".cyan(), "(none)".dimmed()),
    }

    println!("\n{}", "[prune]".yellow());
    let threshold = match &settings.prune.strip_blobs_bigger_than {
        Some(SizeSetting::Bytes(n)) => format!("{} {}", n, format!("({})", util::format_size(*n)).dimmed()),
        Some(SizeSetting::Text(text)) => text.clone(),
        None => "(off)".dimmed().to_string(),
    };
    println!("  {} = {}", "strip_blobs_bigger_than".cyan(), threshold);
    println!("  {} = {}", "protected_refs".cyan(), settings.prune.protected_refs);
    println!("  {} = {}", "protect_all_refs".cyan(), settings.prune.protect_all_refs);
    println!("  {} = {}", "drop_mode".cyan(), settings.prune.drop_mode);

    println!("\n{}", "[message]".yellow());
    println!("  {} = {:?}", "literals".cyan(), settings.message.literals);
    println!("  {} = {:?}", "patterns".cyan(), settings.message.patterns);
    println!("  {} = {:?}", "replacement".cyan(), settings.message.replacement);
    println!(
        "  {} = {}",
        "redact_finding_literals".cyan(),
        settings.message.redact_finding_literals
    );

    println!("\n{}", "[output]".yellow());
    println!("  {} = {}", "backup_refs".cyan(), settings.output.backup_refs);
    match &settings.output.dir {
        Some(dir) => println!("  {} = {}", "dir".cyan(), dir.display()),
        None => println!("  {} = {}", "dir".cyan(), "(next to the journal)".dimmed()),
    }
}

/// Show the settings file path
pub async fn run_path(ctx: &CliContext) -> Result<()> {
    let path = settings::settings_path(ctx.config.as_deref(), &lookup_root(ctx));
    println!("{}", path.display());
    if !path.exists() {
        println!("{}", "File does not exist. Use --example for a starting point.".yellow());
    }
    Ok(())
}

/// Show example settings
pub async fn run_example() -> Result<()> {
    print!("{}", settings::example());
    Ok(())
}
