//! Show journal progress of the last or current run

use crate::locks::RunLock;
use crate::util;
use crate::Context as CliContext;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use scrub_journal::Journal;

pub async fn run(ctx: &CliContext) -> Result<()> {
    let store = util::open_repo(&ctx.repo)?;
    let scrub_dir = util::scrub_dir(&store);

    println!("{}", "Scrub Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("Repository:    {}", store.git_dir().display().to_string().cyan());
    println!();

    // A live run holds the journal open
    if let Some(owner) = RunLock::holder(&scrub_dir) {
        println!(
            "Run:           {} (pid {}, since {})",
            "in progress".yellow(),
            owner.pid,
            util::format_time(owner.started_at)
        );
        return Ok(());
    }

    let journal_dir = scrub_dir.join(util::JOURNAL_DIR);
    if !journal_dir.exists() {
        println!("{}", "No rewrite has been run in this repository".dimmed());
        println!("  {}", "Tip: preview one with 'scrub plan'".dimmed());
        return Ok(());
    }

    let journal = Journal::open(&journal_dir).context("failed to open run journal")?;
    let status = journal.status()?;
    let (Some(run_id), Some(run_status)) = (status.run_id, status.status) else {
        println!("{}", "Journal is empty".dimmed());
        return Ok(());
    };

    println!("Last run:");
    println!("  ID:          {}", run_id.to_string().yellow());
    println!("  Status:      {}", util::status_label(run_status));
    println!(
        "  Progress:    {}/{} commits",
        status.stats.commits_processed, status.stats.total_commits
    );
    if let Some(started) = status.started_at {
        println!("  Started:     {}", util::format_time(started));
    }
    if let Some(updated) = status.updated_at {
        println!("  Updated:     {}", util::format_time(updated).dimmed());
    }
    if let Some(fingerprint) = &status.fingerprint {
        println!("  Settings:    {}", fingerprint.get(..16).unwrap_or(fingerprint).dimmed());
    }
    println!("  Audit:       {} records", status.audit_entries);
    println!();

    if status.is_resumable() {
        println!(
            "{}",
            "Tip: 'scrub run' resumes this run; 'scrub run --fresh' starts over".dimmed()
        );
    }
    Ok(())
}
