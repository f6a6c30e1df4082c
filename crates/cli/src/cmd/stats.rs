//! Print statistics of the last run

use crate::settings;
use crate::util;
use crate::Context as CliContext;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use scrub_journal::StatsReport;

pub async fn run(ctx: &CliContext, json: bool) -> Result<()> {
    let store = util::open_repo(&ctx.repo)?;
    let settings = settings::load(ctx.config.as_deref(), util::settings_root(&store))?;
    let path = settings
        .output_dir(&util::scrub_dir(&store))
        .join(util::STATS_FILE);

    if !path.exists() {
        anyhow::bail!(
            "no statistics yet: {} does not exist (run 'scrub run' first)",
            path.display()
        );
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    if json {
        print!("{text}");
        return Ok(());
    }

    let report: StatsReport = serde_json::from_str(&text)
        .with_context(|| format!("malformed statistics in {}", path.display()))?;
    println!("{}", "Run Statistics".bold());
    println!("  Run:               {}", report.run_id.to_string().yellow());
    println!("  Status:            {}", util::status_label(report.status));
    println!("  Generated:         {}", util::format_time(report.generated_at).dimmed());
    util::print_stats(&report.stats);
    Ok(())
}
