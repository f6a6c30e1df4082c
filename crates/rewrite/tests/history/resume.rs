//! Interrupted runs resumed from an on-disk journal

use crate::common::history::BIG_BLOB;
use crate::common::{pruning, random_history, rewrite, CancelAfter};
use anyhow::Result;
use scrub_journal::{Journal, JournalError, ProgressTracker, RunStatus};
use scrub_rewrite::{CancelToken, HistoryRewriter, RewriteError, RewriteOutcome, SecretSet};
use tempfile::TempDir;

const SEED: u64 = 11;
const COMMITS: usize = 60;

#[test]
fn test_resumed_run_matches_uninterrupted_run() -> Result<()> {
    let config = pruning(BIG_BLOB as u64);

    let reference = random_history(SEED, COMMITS);
    let secrets = SecretSet::from_literals(&reference.secrets);
    let (expected, expected_tracker) = rewrite(&reference.history.store, &config, &secrets)?;

    let subject = random_history(SEED, COMMITS);
    let store = &subject.history.store;
    let refs_before = store.refs_snapshot();
    let dir = TempDir::new()?;

    {
        let journal = Journal::open(dir.path())?;
        let cancel = CancelToken::new();
        let tracker = CancelAfter::new(&journal, 20, cancel.clone());
        let outcome = HistoryRewriter::new(store, &config, &secrets, &tracker)?
            .with_cancel(cancel)
            .run()?;
        match outcome {
            RewriteOutcome::Interrupted { processed, .. } => assert_eq!(processed, 20),
            RewriteOutcome::Completed(_) => panic!("run should have been interrupted"),
        }
        assert_eq!(store.refs_snapshot(), refs_before, "interrupted run moves no ref");
        assert_eq!(journal.status()?.status, Some(RunStatus::Interrupted));
    }

    let journal = Journal::open(dir.path())?;
    let outcome = HistoryRewriter::new(store, &config, &secrets, &journal)?.run()?;
    let RewriteOutcome::Completed(report) = outcome else {
        panic!("resumed run should complete");
    };

    assert!(report.resumed);
    assert_eq!(report.stats, expected.stats);
    assert_eq!(report.commit_map, expected.commit_map);
    assert_eq!(report.ref_updates, expected.ref_updates);
    assert_eq!(store.refs_snapshot(), reference.history.store.refs_snapshot());
    assert_eq!(journal.audit_records()?, expected_tracker.audit_records());
    assert_eq!(journal.status()?.status, Some(RunStatus::Completed));
    Ok(())
}

#[test]
fn test_resume_with_different_findings_is_rejected() -> Result<()> {
    let generated = random_history(SEED, 30);
    let store = &generated.history.store;
    let config = pruning(BIG_BLOB as u64);
    let secrets = SecretSet::from_literals(&generated.secrets);
    let dir = TempDir::new()?;
    let journal = Journal::open(dir.path())?;

    let cancel = CancelToken::new();
    let tracker = CancelAfter::new(&journal, 5, cancel.clone());
    HistoryRewriter::new(store, &config, &secrets, &tracker)?
        .with_cancel(cancel)
        .run()?;

    let fewer = SecretSet::from_literals(&generated.secrets[..1]);
    let err = HistoryRewriter::new(store, &config, &fewer, &journal)?
        .run()
        .unwrap_err();
    assert!(matches!(
        err,
        RewriteError::Journal(JournalError::FingerprintMismatch { .. })
    ));

    // Starting over discards the interrupted run
    journal.reset()?;
    let outcome = HistoryRewriter::new(store, &config, &fewer, &journal)?.run()?;
    let RewriteOutcome::Completed(report) = outcome else {
        panic!("fresh run should complete");
    };
    assert!(!report.resumed);
    assert_eq!(report.stats.commits_processed, journal.total());
    Ok(())
}

#[test]
fn test_completed_journal_starts_fresh() -> Result<()> {
    let generated = random_history(SEED, 20);
    let store = &generated.history.store;
    let config = pruning(BIG_BLOB as u64);
    let secrets = SecretSet::from_literals(&generated.secrets);
    let dir = TempDir::new()?;
    let journal = Journal::open(dir.path())?;

    let first = HistoryRewriter::new(store, &config, &secrets, &journal)?.run()?;
    let RewriteOutcome::Completed(first) = first else {
        panic!("run should complete");
    };
    let second = HistoryRewriter::new(store, &config, &secrets, &journal)?.run()?;
    let RewriteOutcome::Completed(second) = second else {
        panic!("run should complete");
    };

    assert!(!second.resumed);
    assert_ne!(first.run_id, second.run_id);
    assert!(second.stats.is_noop());
    Ok(())
}
