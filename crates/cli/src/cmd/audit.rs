//! Print the audit log of the last run

use crate::locks::RunLock;
use crate::util;
use crate::Context as CliContext;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use scrub_journal::{AuditRecord, Journal, MutationKind};
use std::io::Write;

pub async fn run(ctx: &CliContext, json: bool, limit: Option<usize>) -> Result<()> {
    let store = util::open_repo(&ctx.repo)?;
    let scrub_dir = util::scrub_dir(&store);

    if let Some(owner) = RunLock::holder(&scrub_dir) {
        anyhow::bail!(
            "a rewrite is in progress (pid {}); its audit log is readable once it stops",
            owner.pid
        );
    }
    let journal_dir = scrub_dir.join(util::JOURNAL_DIR);
    if !journal_dir.exists() {
        anyhow::bail!("no rewrite has been run in this repository");
    }

    let journal = Journal::open(&journal_dir).context("failed to open run journal")?;
    let records = journal.audit_records()?;
    let shown = &records[..limit.unwrap_or(records.len()).min(records.len())];

    if json {
        let mut out = std::io::stdout().lock();
        for record in shown {
            serde_json::to_writer(&mut out, record)?;
            writeln!(out)?;
        }
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", "No mutations recorded".dimmed());
        return Ok(());
    }

    println!(
        "{:>5}  {:<16}  {:<10}  {:<10}  {:>5}  {:<10}  {}",
        "SEQ", "KIND", "COMMIT", "BLOB", "LINE", "NEW", "PATH"
    );
    for record in shown {
        print_row(record);
    }
    if shown.len() < records.len() {
        println!("... {} more", records.len() - shown.len());
    }
    Ok(())
}

fn print_row(record: &AuditRecord) {
    // Pad before colouring so escape codes do not skew the columns
    let kind = format!("{:<16}", record.kind.to_string());
    let kind = match record.kind {
        MutationKind::LineRemoved => kind.red().to_string(),
        MutationKind::BlobDropped => kind.magenta().to_string(),
        MutationKind::MessageRedacted => kind.yellow().to_string(),
        MutationKind::TagRewritten => kind.cyan().to_string(),
    };
    let line = record.line.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string());
    let mut path = record.path.clone().unwrap_or_default();
    if let Some(size) = record.size {
        path.push_str(&format!(" ({})", util::format_size(size)));
    }
    if let Some(rule) = &record.rule {
        path.push_str(&format!(" [{rule}]"));
    }

    println!(
        "{:>5}  {}  {:<10}  {:<10}  {:>5}  {:<10}  {}",
        record.seq,
        kind,
        util::short(&record.commit),
        util::short_opt(record.blob.as_ref()),
        line,
        util::short_opt(record.new_blob.as_ref()),
        path
    );
}
