//! Dry runs against a write buffer

use crate::common::history::BIG_BLOB;
use crate::common::{pruning, random_history, rewrite};
use anyhow::Result;
use scrub_rewrite::{dry_run, CancelToken, RewriteOutcome, SecretSet};

#[test]
fn test_dry_run_writes_nothing() -> Result<()> {
    let generated = random_history(5, 40);
    let store = &generated.history.store;
    let secrets = SecretSet::from_literals(&generated.secrets);
    let config = pruning(BIG_BLOB as u64);
    let refs_before = store.refs_snapshot();
    let objects_before = store.object_count();

    let plan = dry_run(store, &config, &secrets, CancelToken::new())?;

    assert_eq!(store.refs_snapshot(), refs_before);
    assert_eq!(store.object_count(), objects_before);
    assert!(plan.new_objects > 0);

    // The real run does exactly what the dry run predicted
    let RewriteOutcome::Completed(predicted) = plan.outcome else {
        panic!("dry run should complete");
    };
    let (actual, tracker) = rewrite(store, &config, &secrets)?;
    assert_eq!(predicted.stats, actual.stats);
    assert_eq!(predicted.ref_updates, actual.ref_updates);
    assert_eq!(predicted.commit_map, actual.commit_map);
    assert_eq!(plan.audit, tracker.audit_records());
    assert_eq!(store.object_count(), objects_before + plan.new_objects);
    Ok(())
}

#[test]
fn test_cancelled_dry_run_reports_interruption() -> Result<()> {
    let generated = random_history(5, 10);
    let cancel = CancelToken::new();
    cancel.cancel();

    let plan = dry_run(&generated.history.store, &pruning(BIG_BLOB as u64), &SecretSet::default(), cancel)?;
    assert!(matches!(plan.outcome, RewriteOutcome::Interrupted { processed: 0, .. }));
    assert_eq!(plan.new_objects, 0);
    Ok(())
}
