//! Progress tracking contract and the in-memory tracker

use crate::audit::AuditRecord;
use crate::error::JournalError;
use crate::stats::{RunCounters, RunStatistics};
use parking_lot::Mutex;
use scrub_core::ObjectId;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Result of applying the blob policies to one blob identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobOutcome {
    /// Passed through byte-for-byte
    Unchanged,
    /// Content redacted into a new blob
    Modified(ObjectId),
    /// Pruned; `placeholder` is the marker blob left in its place, if any
    Dropped { placeholder: Option<ObjectId> },
}

impl BlobOutcome {
    /// True for anything other than `Unchanged`
    pub fn is_change(&self) -> bool {
        !matches!(self, BlobOutcome::Unchanged)
    }
}

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Interrupted,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStatus::Running => "running",
            RunStatus::Interrupted => "interrupted",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything needed to replay one finished commit on resume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Original commit id
    pub old: ObjectId,
    /// Rewritten commit id (equal to `old` when nothing changed)
    pub new: ObjectId,
    /// Blobs first resolved while processing this commit that changed
    pub blobs: Vec<(ObjectId, BlobOutcome)>,
}

/// State handed back by [`ProgressTracker::begin`]
#[derive(Debug, Clone, Default)]
pub struct ResumeState {
    pub run_id: Ulid,
    /// True when an interrupted run is being continued
    pub resumed: bool,
    /// Already rewritten commits, old → new
    pub commits: Vec<(ObjectId, ObjectId)>,
    /// Already resolved blobs that changed
    pub blobs: Vec<(ObjectId, BlobOutcome)>,
    /// Counters as of the last completed commit
    pub stats: RunStatistics,
}

/// Sink for progress and audit output of a rewrite
///
/// `processed`/`total` are readable from other threads while a run is in
/// flight.
pub trait ProgressTracker: Send + Sync {
    /// Start or resume a run for a configuration fingerprint
    fn begin(&self, fingerprint: &str) -> Result<ResumeState, JournalError>;

    /// Persist the number of commits the run will visit
    fn record_total(&self, total: u64) -> Result<(), JournalError>;

    /// Persist a commit that reached the rewritten state, returning the
    /// processed count
    fn record_processed(&self, record: &CommitRecord) -> Result<u64, JournalError>;

    /// Append to the audit log, returning the assigned sequence number
    fn record_mutation(&self, record: AuditRecord) -> Result<u64, JournalError>;

    /// Mark the run finished with the given status
    fn finish(&self, status: RunStatus) -> Result<(), JournalError>;

    /// Live counters
    fn counters(&self) -> &RunCounters;

    /// Id of the current run
    fn run_id(&self) -> Ulid;

    fn processed(&self) -> u64 {
        self.counters().processed()
    }

    fn total(&self) -> u64 {
        self.counters().total()
    }

    fn stats(&self) -> RunStatistics {
        self.counters().snapshot()
    }
}

/// Tracker that keeps everything in memory
///
/// Used for dry runs and tests; never resumes.
#[derive(Default)]
pub struct MemoryTracker {
    counters: RunCounters,
    run_id: Mutex<Ulid>,
    audit: Mutex<Vec<AuditRecord>>,
    commits: Mutex<Vec<CommitRecord>>,
    status: Mutex<Option<RunStatus>>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit log so far
    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit.lock().clone()
    }

    /// Commit records so far
    pub fn commit_records(&self) -> Vec<CommitRecord> {
        self.commits.lock().clone()
    }

    /// Status passed to `finish`, if any
    pub fn status(&self) -> Option<RunStatus> {
        *self.status.lock()
    }
}

impl ProgressTracker for MemoryTracker {
    fn begin(&self, _fingerprint: &str) -> Result<ResumeState, JournalError> {
        let run_id = Ulid::new();
        *self.run_id.lock() = run_id;
        self.audit.lock().clear();
        self.commits.lock().clear();
        *self.status.lock() = Some(RunStatus::Running);
        self.counters.restore(&RunStatistics::default());

        Ok(ResumeState {
            run_id,
            ..ResumeState::default()
        })
    }

    fn record_total(&self, total: u64) -> Result<(), JournalError> {
        self.counters.set_total(total);
        Ok(())
    }

    fn record_processed(&self, record: &CommitRecord) -> Result<u64, JournalError> {
        self.commits.lock().push(record.clone());
        Ok(self.counters.commit_processed(record.old != record.new))
    }

    fn record_mutation(&self, mut record: AuditRecord) -> Result<u64, JournalError> {
        let mut audit = self.audit.lock();
        record.seq = audit.len() as u64;
        let seq = record.seq;
        audit.push(record);
        Ok(seq)
    }

    fn finish(&self, status: RunStatus) -> Result<(), JournalError> {
        *self.status.lock() = Some(status);
        Ok(())
    }

    fn counters(&self) -> &RunCounters {
        &self.counters
    }

    fn run_id(&self) -> Ulid {
        *self.run_id.lock()
    }
}
