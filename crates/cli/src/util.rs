//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use owo_colors::OwoColorize;
use scrub_core::ObjectId;
use scrub_git::GitStore;
use scrub_journal::{RunStatistics, RunStatus};
use std::path::{Path, PathBuf};

/// Per-repository state directory under the git dir
pub const SCRUB_DIR: &str = "scrub";
pub const JOURNAL_DIR: &str = "journal";
pub const STATS_FILE: &str = "stats.json";
pub const AUDIT_FILE: &str = "audit.jsonl";

/// Open the repository containing `path`
pub fn open_repo(path: &Path) -> Result<GitStore> {
    GitStore::open(path).context("not a git repository (or any parent up to /)")
}

/// `<git-dir>/scrub`
pub fn scrub_dir(store: &GitStore) -> PathBuf {
    store.git_dir().join(SCRUB_DIR)
}

/// Root the settings file is looked up in: the work tree, else the git dir
pub fn settings_root(store: &GitStore) -> &Path {
    store.work_dir().unwrap_or_else(|| store.git_dir())
}

/// Abbreviated object id for tables
pub fn short(id: &ObjectId) -> String {
    id.short()
}

pub fn short_opt(id: Option<&ObjectId>) -> String {
    id.map(short).unwrap_or_else(|| "-".to_string())
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Local wall-clock time of a journal timestamp
pub fn format_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn status_label(status: RunStatus) -> String {
    match status {
        RunStatus::Running => "running".yellow().to_string(),
        RunStatus::Interrupted => "interrupted".yellow().to_string(),
        RunStatus::Completed => "completed".green().to_string(),
        RunStatus::Failed => "failed".red().to_string(),
    }
}

/// Print the statistics block shared by `run`, `plan` and `stats`
pub fn print_stats(stats: &RunStatistics) {
    println!("  Commits:           {}/{}", stats.commits_processed, stats.total_commits);
    println!("  Commits rewritten: {}", stats.commits_rewritten);
    println!("  Blobs modified:    {}", stats.blobs_modified);
    println!("  Lines removed:     {}", stats.lines_removed);
    println!("  Blobs dropped:     {}", stats.blobs_dropped);
    println!("  Messages redacted: {}", stats.messages_redacted);
    println!("  Tags rewritten:    {}", stats.tags_rewritten);
}
