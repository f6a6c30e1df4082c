//! Store and tracker wrappers that inject failures

use scrub_core::{MemoryStore, ObjectId, ObjectKind, ObjectStore, RawObject, RefStore, RefUpdate, StoreError};
use scrub_journal::{
    AuditRecord, CommitRecord, JournalError, ProgressTracker, ResumeState, RunCounters, RunStatus,
};
use scrub_rewrite::CancelToken;
use std::sync::atomic::{AtomicUsize, Ordering};
use ulid::Ulid;

/// Store whose writes start failing after a fixed number succeed
pub struct FailingStore<'a> {
    inner: &'a MemoryStore,
    remaining: AtomicUsize,
}

impl<'a> FailingStore<'a> {
    pub fn new(inner: &'a MemoryStore, successful_writes: usize) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(successful_writes),
        }
    }
}

impl ObjectStore for FailingStore<'_> {
    fn read(&self, id: &ObjectId) -> Result<RawObject, StoreError> {
        self.inner.read(id)
    }

    fn contains(&self, id: &ObjectId) -> Result<bool, StoreError> {
        self.inner.contains(id)
    }

    fn write(&self, kind: ObjectKind, data: &[u8]) -> Result<ObjectId, StoreError> {
        let allowed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(StoreError::Write {
                kind,
                reason: "disk full".to_string(),
            });
        }
        self.inner.write(kind, data)
    }
}

impl RefStore for FailingStore<'_> {
    fn list_refs(&self) -> Result<Vec<(String, ObjectId)>, StoreError> {
        self.inner.list_refs()
    }

    fn resolve(&self, name: &str) -> Result<Option<ObjectId>, StoreError> {
        self.inner.resolve(name)
    }

    fn apply_ref_updates(&self, updates: &[RefUpdate]) -> Result<(), StoreError> {
        self.inner.apply_ref_updates(updates)
    }
}

/// Tracker that requests cancellation once `after` commits are processed
pub struct CancelAfter<'a> {
    inner: &'a dyn ProgressTracker,
    after: u64,
    token: CancelToken,
}

impl<'a> CancelAfter<'a> {
    pub fn new(inner: &'a dyn ProgressTracker, after: u64, token: CancelToken) -> Self {
        Self { inner, after, token }
    }
}

impl ProgressTracker for CancelAfter<'_> {
    fn begin(&self, fingerprint: &str) -> Result<ResumeState, JournalError> {
        self.inner.begin(fingerprint)
    }

    fn record_total(&self, total: u64) -> Result<(), JournalError> {
        self.inner.record_total(total)
    }

    fn record_processed(&self, record: &CommitRecord) -> Result<u64, JournalError> {
        let processed = self.inner.record_processed(record)?;
        if processed >= self.after {
            self.token.cancel();
        }
        Ok(processed)
    }

    fn record_mutation(&self, record: AuditRecord) -> Result<u64, JournalError> {
        self.inner.record_mutation(record)
    }

    fn finish(&self, status: RunStatus) -> Result<(), JournalError> {
        self.inner.finish(status)
    }

    fn counters(&self) -> &RunCounters {
        self.inner.counters()
    }

    fn run_id(&self) -> Ulid {
        self.inner.run_id()
    }
}
