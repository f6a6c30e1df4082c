//! Durable run journal using sled

use crate::audit::AuditRecord;
use crate::error::JournalError;
use crate::stats::{RunCounters, RunStatistics};
use crate::tracker::{CommitRecord, ProgressTracker, ResumeState, RunStatus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use ulid::Ulid;

const META_FINGERPRINT: &str = "fingerprint";
const META_RUN_ID: &str = "run_id";
const META_STATUS: &str = "status";
const META_STARTED: &str = "started_at";
const META_UPDATED: &str = "updated_at";
const META_STATS: &str = "stats";

/// Default number of commits between flushes
pub const DEFAULT_FLUSH_INTERVAL: u64 = 64;

/// Progress entry as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProgressEntry {
    record: CommitRecord,
    /// Audit sequence number that the next mutation will receive
    audit_watermark: u64,
    stats: RunStatistics,
}

/// Summary of what a journal holds, for status reporting
#[derive(Debug, Clone, Default)]
pub struct JournalStatus {
    pub run_id: Option<Ulid>,
    pub status: Option<RunStatus>,
    pub fingerprint: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub stats: RunStatistics,
    pub audit_entries: usize,
}

impl JournalStatus {
    /// True when the journal holds an unfinished run
    pub fn is_resumable(&self) -> bool {
        matches!(
            self.status,
            Some(RunStatus::Running) | Some(RunStatus::Interrupted) | Some(RunStatus::Failed)
        )
    }
}

/// Persistent tracker: progress and audit survive process restarts
///
/// Layout: a `meta` tree for run-level values, and `progress`/`audit` trees
/// keyed by big-endian sequence numbers so iteration follows append order.
pub struct Journal {
    path: PathBuf,
    db: Db,
    meta: Tree,
    progress: Tree,
    audit: Tree,
    run_id: Mutex<Ulid>,
    counters: RunCounters,
    progress_seq: AtomicU64,
    audit_seq: AtomicU64,
    flush_interval: u64,
}

impl Journal {
    /// Open or create a journal under `dir`
    pub fn open(dir: &Path) -> Result<Self, JournalError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("journal.db");
        let db = sled::open(&path)?;
        let meta = db.open_tree("meta")?;
        let progress = db.open_tree("progress")?;
        let audit = db.open_tree("audit")?;

        let progress_seq = next_seq(&progress)?;
        let audit_seq = next_seq(&audit)?;

        Ok(Self {
            path,
            db,
            meta,
            progress,
            audit,
            run_id: Mutex::new(Ulid::nil()),
            counters: RunCounters::new(),
            progress_seq: AtomicU64::new(progress_seq),
            audit_seq: AtomicU64::new(audit_seq),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        })
    }

    /// Flush every `n` processed commits (minimum 1)
    pub fn with_flush_interval(mut self, n: u64) -> Self {
        self.flush_interval = n.max(1);
        self
    }

    /// On-disk location of the database
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Discard everything, so the next `begin` starts a fresh run
    pub fn reset(&self) -> Result<(), JournalError> {
        self.meta.clear()?;
        self.progress.clear()?;
        self.audit.clear()?;
        self.progress_seq.store(0, Ordering::SeqCst);
        self.audit_seq.store(0, Ordering::SeqCst);
        self.counters.restore(&RunStatistics::default());
        self.db.flush()?;
        tracing::debug!(path = %self.path.display(), "journal reset");
        Ok(())
    }

    /// Read run-level state without starting a run
    pub fn status(&self) -> Result<JournalStatus, JournalError> {
        let stats = match self.get_meta::<RunStatistics>(META_STATS)? {
            Some(stats) => stats,
            None => self
                .last_progress()?
                .map(|entry| entry.stats)
                .unwrap_or_default(),
        };

        Ok(JournalStatus {
            run_id: self.get_meta(META_RUN_ID)?,
            status: self.get_meta(META_STATUS)?,
            fingerprint: self.get_meta(META_FINGERPRINT)?,
            started_at: self.get_meta(META_STARTED)?,
            updated_at: self.get_meta(META_UPDATED)?,
            stats,
            audit_entries: self.audit.len(),
        })
    }

    /// Every audit record, in sequence order
    pub fn audit_records(&self) -> Result<Vec<AuditRecord>, JournalError> {
        let mut records = Vec::with_capacity(self.audit.len());
        for item in self.audit.iter() {
            let (_, value) = item?;
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }

    /// Every stored commit record, in processing order
    pub fn commit_records(&self) -> Result<Vec<CommitRecord>, JournalError> {
        let mut records = Vec::with_capacity(self.progress.len());
        for item in self.progress.iter() {
            let (_, value) = item?;
            let entry: ProgressEntry = bincode::deserialize(&value)?;
            records.push(entry.record);
        }
        Ok(records)
    }

    fn last_progress(&self) -> Result<Option<ProgressEntry>, JournalError> {
        match self.progress.last()? {
            Some((_, value)) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn get_meta<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, JournalError> {
        match self.meta.get(key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn put_meta<T: Serialize>(&self, key: &str, value: &T) -> Result<(), JournalError> {
        self.meta.insert(key, bincode::serialize(value)?)?;
        Ok(())
    }

    fn start_fresh(&self, fingerprint: &str) -> Result<ResumeState, JournalError> {
        self.reset()?;

        let run_id = Ulid::new();
        let now = Utc::now();
        self.put_meta(META_FINGERPRINT, &fingerprint.to_string())?;
        self.put_meta(META_RUN_ID, &run_id)?;
        self.put_meta(META_STATUS, &RunStatus::Running)?;
        self.put_meta(META_STARTED, &now)?;
        self.put_meta(META_UPDATED, &now)?;
        self.db.flush()?;

        *self.run_id.lock() = run_id;
        tracing::info!(%run_id, "starting new run");

        Ok(ResumeState {
            run_id,
            ..ResumeState::default()
        })
    }

    fn resume(&self, run_id: Ulid) -> Result<ResumeState, JournalError> {
        let mut state = ResumeState {
            run_id,
            resumed: true,
            ..ResumeState::default()
        };

        let mut watermark = 0;
        for item in self.progress.iter() {
            let (_, value) = item?;
            let entry: ProgressEntry = bincode::deserialize(&value)?;
            state.commits.push((entry.record.old, entry.record.new));
            state.blobs.extend(entry.record.blobs);
            watermark = entry.audit_watermark;
            state.stats = entry.stats;
        }

        // Mutations past the last finished commit belong to work that is
        // about to be redone.
        let mut dropped = 0usize;
        for item in self.audit.range(seq_key(watermark)..) {
            let (key, _) = item?;
            self.audit.remove(key)?;
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(dropped, watermark, "discarded audit entries of unfinished commit");
        }

        self.counters.restore(&state.stats);
        self.progress_seq.store(next_seq(&self.progress)?, Ordering::SeqCst);
        self.audit_seq.store(watermark, Ordering::SeqCst);
        self.put_meta(META_STATUS, &RunStatus::Running)?;
        self.put_meta(META_UPDATED, &Utc::now())?;
        self.meta.remove(META_STATS)?;
        self.db.flush()?;

        *self.run_id.lock() = run_id;
        tracing::info!(
            %run_id,
            commits = state.commits.len(),
            blobs = state.blobs.len(),
            "resuming interrupted run"
        );

        Ok(state)
    }
}

impl ProgressTracker for Journal {
    fn begin(&self, fingerprint: &str) -> Result<ResumeState, JournalError> {
        let status: Option<RunStatus> = self.get_meta(META_STATUS)?;
        let stored: Option<String> = self.get_meta(META_FINGERPRINT)?;
        let run_id: Option<Ulid> = self.get_meta(META_RUN_ID)?;

        match (status, stored, run_id) {
            (Some(RunStatus::Completed), _, _) | (None, _, _) | (_, None, _) | (_, _, None) => {
                self.start_fresh(fingerprint)
            }
            (Some(_), Some(found), Some(_)) if found != fingerprint => {
                Err(JournalError::FingerprintMismatch {
                    expected: fingerprint.to_string(),
                    found,
                })
            }
            (Some(_), Some(_), Some(run_id)) => self.resume(run_id),
        }
    }

    fn record_total(&self, total: u64) -> Result<(), JournalError> {
        self.counters.set_total(total);
        Ok(())
    }

    fn record_processed(&self, record: &CommitRecord) -> Result<u64, JournalError> {
        let processed = self.counters.commit_processed(record.old != record.new);
        let entry = ProgressEntry {
            record: record.clone(),
            audit_watermark: self.audit_seq.load(Ordering::SeqCst),
            stats: self.counters.snapshot(),
        };

        let seq = self.progress_seq.fetch_add(1, Ordering::SeqCst);
        self.progress.insert(seq_key(seq), bincode::serialize(&entry)?)?;

        if processed % self.flush_interval == 0 {
            self.db.flush()?;
        }
        Ok(processed)
    }

    fn record_mutation(&self, mut record: AuditRecord) -> Result<u64, JournalError> {
        let seq = self.audit_seq.fetch_add(1, Ordering::SeqCst);
        record.seq = seq;
        self.audit.insert(seq_key(seq), bincode::serialize(&record)?)?;
        Ok(seq)
    }

    fn finish(&self, status: RunStatus) -> Result<(), JournalError> {
        self.put_meta(META_STATUS, &status)?;
        self.put_meta(META_UPDATED, &Utc::now())?;
        self.put_meta(META_STATS, &self.counters.snapshot())?;
        self.db.flush()?;
        tracing::debug!(%status, "journal finished");
        Ok(())
    }

    fn counters(&self) -> &RunCounters {
        &self.counters
    }

    fn run_id(&self) -> Ulid {
        *self.run_id.lock()
    }
}

// Big-endian so sled's byte ordering matches numeric ordering
fn seq_key(seq: u64) -> [u8; 8] {
    seq.to_be_bytes()
}

fn next_seq(tree: &Tree) -> Result<u64, JournalError> {
    match tree.last()? {
        Some((key, _)) => {
            let bytes: [u8; 8] = key
                .as_ref()
                .try_into()
                .map_err(|_| JournalError::Corrupt(format!("bad sequence key of {} bytes", key.len())))?;
            Ok(u64::from_be_bytes(bytes) + 1)
        }
        None => Ok(0),
    }
}
