//! Run statistics: atomic counters and their serializable snapshot

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a run's counters, persisted for audit and verification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Commits reachable from the walked refs
    pub total_commits: u64,
    /// Commits that reached the rewritten state
    pub commits_processed: u64,
    /// Commits whose id changed
    pub commits_rewritten: u64,
    /// Distinct blobs whose content was redacted
    pub blobs_modified: u64,
    /// Distinct blobs pruned by the size threshold
    pub blobs_dropped: u64,
    /// Lines removed across all modified blobs
    pub lines_removed: u64,
    /// Commit and tag messages rewritten
    pub messages_redacted: u64,
    /// Annotated tags re-created over rewritten targets
    pub tags_rewritten: u64,
}

impl RunStatistics {
    /// True when the run changed nothing
    pub fn is_noop(&self) -> bool {
        self.blobs_modified == 0
            && self.blobs_dropped == 0
            && self.messages_redacted == 0
            && self.commits_rewritten == 0
    }
}

/// Shared counters, safe to bump from workers and read from a progress
/// display at the same time
#[derive(Debug, Default)]
pub struct RunCounters {
    total_commits: AtomicU64,
    commits_processed: AtomicU64,
    commits_rewritten: AtomicU64,
    blobs_modified: AtomicU64,
    blobs_dropped: AtomicU64,
    lines_removed: AtomicU64,
    messages_redacted: AtomicU64,
    tags_rewritten: AtomicU64,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_total(&self, n: u64) {
        self.total_commits.store(n, Ordering::SeqCst);
    }

    pub fn total(&self) -> u64 {
        self.total_commits.load(Ordering::SeqCst)
    }

    pub fn processed(&self) -> u64 {
        self.commits_processed.load(Ordering::SeqCst)
    }

    /// Count a processed commit, returning the new processed count
    pub fn commit_processed(&self, rewritten: bool) -> u64 {
        if rewritten {
            self.commits_rewritten.fetch_add(1, Ordering::SeqCst);
        }
        self.commits_processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn blob_modified(&self, lines: u64) {
        self.blobs_modified.fetch_add(1, Ordering::SeqCst);
        self.lines_removed.fetch_add(lines, Ordering::SeqCst);
    }

    pub fn blob_dropped(&self) {
        self.blobs_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn message_redacted(&self) {
        self.messages_redacted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn tag_rewritten(&self) {
        self.tags_rewritten.fetch_add(1, Ordering::SeqCst);
    }

    /// Read every counter
    pub fn snapshot(&self) -> RunStatistics {
        RunStatistics {
            total_commits: self.total_commits.load(Ordering::SeqCst),
            commits_processed: self.commits_processed.load(Ordering::SeqCst),
            commits_rewritten: self.commits_rewritten.load(Ordering::SeqCst),
            blobs_modified: self.blobs_modified.load(Ordering::SeqCst),
            blobs_dropped: self.blobs_dropped.load(Ordering::SeqCst),
            lines_removed: self.lines_removed.load(Ordering::SeqCst),
            messages_redacted: self.messages_redacted.load(Ordering::SeqCst),
            tags_rewritten: self.tags_rewritten.load(Ordering::SeqCst),
        }
    }

    /// Overwrite every counter from a snapshot (resume)
    pub fn restore(&self, stats: &RunStatistics) {
        self.total_commits.store(stats.total_commits, Ordering::SeqCst);
        self.commits_processed.store(stats.commits_processed, Ordering::SeqCst);
        self.commits_rewritten.store(stats.commits_rewritten, Ordering::SeqCst);
        self.blobs_modified.store(stats.blobs_modified, Ordering::SeqCst);
        self.blobs_dropped.store(stats.blobs_dropped, Ordering::SeqCst);
        self.lines_removed.store(stats.lines_removed, Ordering::SeqCst);
        self.messages_redacted.store(stats.messages_redacted, Ordering::SeqCst);
        self.tags_rewritten.store(stats.tags_rewritten, Ordering::SeqCst);
    }
}
