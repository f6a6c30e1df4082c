//! CLI command implementations

pub mod audit;
pub mod config;
pub mod plan;
pub mod run;
pub mod stats;
pub mod status;

use crate::settings::{self, Settings};
use crate::util;
use crate::{Context as CliContext, RewriteArgs};
use anyhow::{Context, Result};
use scrub_git::GitStore;
use scrub_journal::{write_audit_jsonl, write_stats_json, Journal, ProgressTracker, StatsReport};
use scrub_rewrite::{RewriteConfig, SecretSet};
use std::path::Path;

/// Everything a rewrite needs besides the repository
pub struct RewriteInputs {
    pub settings: Settings,
    pub config: RewriteConfig,
    pub secrets: SecretSet,
}

/// Load settings, apply flags, validate, and read the findings report
///
/// Runs before any object is read, so bad input fails with the repository
/// untouched.
pub fn load_inputs(ctx: &CliContext, store: &GitStore, args: &RewriteArgs) -> Result<RewriteInputs> {
    let mut settings = settings::load(ctx.config.as_deref(), util::settings_root(store))?;
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    settings.overlay(args, &cwd);

    let config = settings.rewrite_config(args.drop_mode.as_deref())?;
    let secrets = settings.secrets()?;
    tracing::info!(
        secrets = secrets.len(),
        findings = secrets.findings().len(),
        threshold = ?config.strip_blobs_bigger_than,
        "inputs loaded"
    );

    Ok(RewriteInputs {
        settings,
        config,
        secrets,
    })
}

/// Write `stats.json` and `audit.jsonl` for the journal's current run
pub fn export_outputs(journal: &Journal, dir: &Path) -> Result<()> {
    let status = journal.status()?;
    let (Some(run_id), Some(run_status)) = (status.run_id, status.status) else {
        return Ok(());
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let report = StatsReport::new(run_id, run_status, journal.stats());
    write_stats_json(&dir.join(util::STATS_FILE), &report)?;
    let written = write_audit_jsonl(&dir.join(util::AUDIT_FILE), &journal.audit_records()?)?;

    tracing::debug!(dir = %dir.display(), audit = written, "outputs exported");
    Ok(())
}
