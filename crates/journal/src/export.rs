//! Machine-readable exports of a run: statistics JSON and audit JSON lines

use crate::audit::AuditRecord;
use crate::error::JournalError;
use crate::stats::RunStatistics;
use crate::tracker::RunStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use ulid::Ulid;

/// Statistics document written after a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub run_id: Ulid,
    pub status: RunStatus,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub stats: RunStatistics,
}

impl StatsReport {
    pub fn new(run_id: Ulid, status: RunStatus, stats: RunStatistics) -> Self {
        Self {
            run_id,
            status,
            generated_at: Utc::now(),
            stats,
        }
    }
}

/// Write `report` as pretty JSON
pub fn write_stats_json(path: &Path, report: &StatsReport) -> Result<(), JournalError> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, report)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Write one JSON object per line, returning the number written
pub fn write_audit_jsonl(path: &Path, records: &[AuditRecord]) -> Result<usize, JournalError> {
    let mut out = BufWriter::new(File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(records.len())
}
