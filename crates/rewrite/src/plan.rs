//! Dry runs: the full rewrite against a write buffer

use crate::config::RewriteConfig;
use crate::error::RewriteError;
use crate::findings::SecretSet;
use crate::rewriter::{CancelToken, HistoryRewriter, RewriteOutcome};
use scrub_core::{ObjectStore, OverlayStore, RefStore};
use scrub_journal::{AuditRecord, MemoryTracker};

/// What a rewrite would do
#[derive(Debug, Clone)]
pub struct DryRun {
    pub outcome: RewriteOutcome,
    pub audit: Vec<AuditRecord>,
    /// Objects the rewrite would have added to the repository
    pub new_objects: usize,
}

/// Run the rewrite without writing objects or moving refs
pub fn dry_run<S>(
    store: &S,
    config: &RewriteConfig,
    secrets: &SecretSet,
    cancel: CancelToken,
) -> Result<DryRun, RewriteError>
where
    S: ObjectStore + RefStore + ?Sized,
{
    let overlay = OverlayStore::new(store);
    let tracker = MemoryTracker::new();
    let outcome = HistoryRewriter::new(&overlay, config, secrets, &tracker)?
        .with_cancel(cancel)
        .run()?;

    Ok(DryRun {
        outcome,
        audit: tracker.audit_records(),
        new_objects: overlay.buffered_objects(),
    })
}
