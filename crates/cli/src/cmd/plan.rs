//! Dry run: show what `scrub run` would change

use crate::cmd::load_inputs;
use crate::progress::cancel_on_ctrl_c;
use crate::util;
use crate::{Context as CliContext, RewriteArgs};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use scrub_core::{ObjectId, RefStore};
use scrub_git::GitStore;
use scrub_journal::{AuditRecord, MutationKind};
use scrub_rewrite::{dry_run, CancelToken, DryRun, RewriteOutcome, Walker};
use std::collections::HashSet;
use std::sync::Arc;

/// A commit that brings an affected blob into history
struct Introduction {
    commit: ObjectId,
    path: String,
}

pub async fn run(ctx: &CliContext, args: RewriteArgs, limit: usize) -> Result<()> {
    let store = Arc::new(util::open_repo(&ctx.repo)?);
    let inputs = load_inputs(ctx, &store, &args)?;

    let cancel = CancelToken::new();
    let signals = cancel_on_ctrl_c(cancel.clone());
    let (plan, introductions) = {
        let store = Arc::clone(&store);
        tokio::task::spawn_blocking(move || -> Result<(DryRun, Vec<Introduction>)> {
            let plan = dry_run(&*store, &inputs.config, &inputs.secrets, cancel)?;
            let introductions = match plan.outcome {
                RewriteOutcome::Completed(_) => introducing_commits(&store, &plan.audit)?,
                RewriteOutcome::Interrupted { .. } => Vec::new(),
            };
            Ok((plan, introductions))
        })
        .await
        .context("dry run task panicked")??
    };
    signals.abort();

    let report = match &plan.outcome {
        RewriteOutcome::Completed(report) => report,
        RewriteOutcome::Interrupted { stats, processed } => {
            println!(
                "{} after {}/{} commits",
                "Dry run cancelled".yellow(),
                processed,
                stats.total_commits
            );
            return Ok(());
        }
    };

    println!("{}", "Dry run (nothing was written)".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    util::print_stats(&report.stats);
    println!("  New objects:       {}", plan.new_objects);
    println!();

    if report.ref_updates.is_empty() {
        println!("{}", "No ref would change".green());
    } else {
        println!("{}", "Refs that would be updated:".bold());
        for update in &report.ref_updates {
            println!(
                "  {}  {} -> {}",
                update.name.cyan(),
                util::short_opt(update.old.as_ref()).dimmed(),
                util::short(&update.new).yellow()
            );
        }
    }

    if !report.untouched_refs.is_empty() {
        println!();
        println!("{}", "Left untouched (not a commit):".yellow());
        for name in &report.untouched_refs {
            println!("  {}", name);
        }
    }

    if !introductions.is_empty() {
        println!();
        println!("{}", "Commits introducing affected blobs:".bold());
        for intro in introductions.iter().take(limit) {
            println!("  {}  {}", util::short(&intro.commit).yellow(), intro.path);
        }
        if introductions.len() > limit {
            println!("  ... and {} more", introductions.len() - limit);
        }
    }

    Ok(())
}

/// Walk history and report where each redacted or pruned blob first appears
fn introducing_commits(store: &GitStore, audit: &[AuditRecord]) -> Result<Vec<Introduction>> {
    let affected: HashSet<ObjectId> = audit
        .iter()
        .filter(|r| matches!(r.kind, MutationKind::LineRemoved | MutationKind::BlobDropped))
        .filter_map(|r| r.blob)
        .collect();
    if affected.is_empty() {
        return Ok(Vec::new());
    }

    let walker = Walker::new(store);
    let walk = walker.walk(&store.list_refs()?)?;
    let mut out = Vec::new();
    for commit in &walk.commits {
        for (path, blob) in walker.introduced_blobs(commit)? {
            if affected.contains(&blob) {
                out.push(Introduction {
                    commit: *commit,
                    path,
                });
            }
        }
    }
    Ok(out)
}
