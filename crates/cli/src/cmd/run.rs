//! Rewrite history in place, resuming an interrupted run

use crate::cmd::{export_outputs, load_inputs};
use crate::locks::RunLock;
use crate::progress::{cancel_on_ctrl_c, ProgressReporter};
use crate::util;
use crate::{Context as CliContext, RewriteArgs};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use scrub_journal::{Journal, JournalError};
use scrub_rewrite::{CancelToken, HistoryRewriter, RewriteError, RewriteOutcome, RewriteReport};
use std::process::ExitCode;
use std::sync::Arc;

/// Exit status of a run stopped by Ctrl-C (128 + SIGINT)
const EXIT_INTERRUPTED: u8 = 130;

pub async fn run(ctx: &CliContext, args: RewriteArgs, fresh: bool, show_progress: bool) -> Result<ExitCode> {
    // 1. Open the repository and validate every input
    let store = Arc::new(util::open_repo(&ctx.repo)?);
    let inputs = load_inputs(ctx, &store, &args)?;
    let out_dir = inputs.settings.output_dir(&util::scrub_dir(&store));

    // 2. Lock and open the journal
    let scrub_dir = util::scrub_dir(&store);
    let _lock = RunLock::acquire(&scrub_dir)?;
    let journal = Arc::new(
        Journal::open(&scrub_dir.join(util::JOURNAL_DIR)).context("failed to open run journal")?,
    );
    if fresh {
        journal.reset()?;
    } else {
        let previous = journal.status()?;
        if previous.is_resumable() {
            if let Some(run_id) = previous.run_id {
                println!(
                    "{} run {} ({}/{} commits done)",
                    "Resuming".yellow(),
                    run_id,
                    previous.stats.commits_processed,
                    previous.stats.total_commits
                );
            }
        }
    }

    // 3. Rewrite on a blocking thread while the bar polls the journal
    let cancel = CancelToken::new();
    let signals = cancel_on_ctrl_c(cancel.clone());
    let reporter = ProgressReporter::spawn(journal.clone(), show_progress);

    let outcome = {
        let store = Arc::clone(&store);
        let journal = Arc::clone(&journal);
        let config = inputs.config;
        let secrets = inputs.secrets;
        tokio::task::spawn_blocking(move || {
            HistoryRewriter::new(&*store, &config, &secrets, &*journal)?
                .with_cancel(cancel)
                .run()
        })
        .await
        .context("rewrite task panicked")?
    };
    reporter.finish().await;
    signals.abort();

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(RewriteError::Journal(JournalError::FingerprintMismatch { .. })) => {
            anyhow::bail!(
                "settings or findings differ from the interrupted run; \
                 rerun with --fresh to discard it"
            );
        }
        Err(err) => return Err(err).context("rewrite failed, no ref was changed"),
    };

    // 4. Exports and summary
    export_outputs(&journal, &out_dir)?;
    match outcome {
        RewriteOutcome::Completed(report) => {
            print_report(&report);
            println!();
            println!(
                "Statistics: {}",
                out_dir.join(util::STATS_FILE).display().to_string().dimmed()
            );
            println!(
                "Audit log:  {}",
                out_dir.join(util::AUDIT_FILE).display().to_string().dimmed()
            );
            Ok(ExitCode::SUCCESS)
        }
        RewriteOutcome::Interrupted { stats, processed } => {
            println!(
                "{} after {}/{} commits; no ref was changed",
                "Interrupted".yellow().bold(),
                processed,
                stats.total_commits
            );
            println!("  {}", "Run 'scrub run' again to resume".dimmed());
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
    }
}

fn print_report(report: &RewriteReport) {
    if report.stats.is_noop() {
        println!("{} Nothing to rewrite", "✓".green());
    } else {
        println!(
            "{} History rewritten{}",
            "✓".green(),
            if report.resumed { " (resumed)" } else { "" }
        );
    }
    println!("  Run:               {}", report.run_id.to_string().dimmed());
    util::print_stats(&report.stats);

    if !report.ref_updates.is_empty() {
        println!();
        println!("{}", "Refs updated:".bold());
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
}
