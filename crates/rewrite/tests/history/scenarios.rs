//! Hand-built histories with known outcomes

use crate::common::{files_at, pruning, rewrite, FailingStore, History};
use anyhow::Result;
use scrub_core::tree::{MODE_FILE, MODE_TREE};
use scrub_core::{Entry, ObjectId, ObjectStore, RefStore, Tree};
use scrub_journal::{MemoryTracker, MutationKind, RunStatus};
use scrub_rewrite::{
    parse_findings, CancelToken, DropMode, HistoryRewriter, RewriteConfig, RewriteError, RewriteOutcome,
    SecretSet,
};

const ENV_WITH_SECRET: &[u8] = b"HOST=db.internal\nAPI_KEY=SECRET_ABC123\nPORT=5432\n";

/// c1 (README) <- c2 (adds config.env with a secret on line 2) <- c3 (edits README)
fn three_commits() -> (History, [ObjectId; 3]) {
    let mut history = History::new();
    let c1 = history.commit(&[("README.md", b"hello\n")], &[], "initial");
    let c2 = history.commit(
        &[("README.md", b"hello\n"), ("config.env", ENV_WITH_SECRET)],
        &[c1],
        "add config",
    );
    let c3 = history.commit(
        &[("README.md", b"hello world\n"), ("config.env", ENV_WITH_SECRET)],
        &[c2],
        "update readme",
    );
    history.main("main", c3);
    (history, [c1, c2, c3])
}

fn big_blob() -> Vec<u8> {
    (0..2_000_000u32).map(|i| (i % 251) as u8).collect()
}

#[test]
fn test_secret_line_removed_from_introducing_commit() -> Result<()> {
    let (history, [c1, c2, c3]) = three_commits();
    let store = &history.store;
    let findings = parse_findings(
        r#"[{"File":"config.env","StartLine":2,"Secret":"SECRET_ABC123","Commit":"abc","RuleID":"generic-api-key"}]"#,
    )?;
    let secrets = SecretSet::from_findings(findings);

    let (report, tracker) = rewrite(store, &RewriteConfig::default(), &secrets)?;

    assert_eq!(report.rewritten(&c1), Some(c1), "commit 1 is untouched");
    let new_c2 = report.rewritten(&c2).expect("walked");
    let new_c3 = report.rewritten(&c3).expect("walked");
    assert_ne!(new_c2, c2);
    assert_ne!(new_c3, c3);

    let config = &files_at(store, new_c2)["config.env"];
    let lines: Vec<&[u8]> = config.split_inclusive(|&b| b == b'\n').collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| *l != b"API_KEY=SECRET_ABC123\n"));
    assert_eq!(config.as_slice(), b"HOST=db.internal\nPORT=5432\n");
    assert_eq!(store.resolve("main")?, Some(new_c3));

    assert_eq!(report.stats.blobs_modified, 1, "shared blob is redacted once");
    assert_eq!(report.stats.lines_removed, 1);

    let audit = tracker.audit_records();
    assert_eq!(audit.len(), 1);
    let record = &audit[0];
    assert_eq!(record.kind, MutationKind::LineRemoved);
    assert_eq!(record.commit, c2);
    assert_eq!(record.path.as_deref(), Some("config.env"));
    assert_eq!(record.line, Some(2));
    assert_eq!(record.rule.as_deref(), Some("generic-api-key"));
    assert_eq!(record.finding_commit.as_deref(), Some("abc"));
    Ok(())
}

#[test]
fn test_large_blob_dropped_from_unprotected_branch() -> Result<()> {
    let mut history = History::new();
    let c1 = history.commit(&[("README.md", b"hello\n")], &[], "initial");
    let big = big_blob();
    let feature = history.commit(&[("README.md", b"hello\n"), ("big.bin", &big)], &[c1], "add data");
    history.main("main", c1);
    history.branch("feature", feature);
    let store = &history.store;
    let big_id = history.blob(&big);

    let (report, tracker) = rewrite(store, &pruning(1_000_000), &SecretSet::default())?;

    let new_feature = store.resolve("feature")?.expect("branch exists");
    assert_ne!(new_feature, feature);
    assert!(!files_at(store, new_feature).contains_key("big.bin"));
    assert_eq!(store.resolve("main")?, Some(c1));
    assert_eq!(report.stats.blobs_dropped, 1);

    let audit = tracker.audit_records();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].kind, MutationKind::BlobDropped);
    assert_eq!(audit[0].blob, Some(big_id));
    assert_eq!(audit[0].size, Some(2_000_000));
    assert_eq!(audit[0].path.as_deref(), Some("big.bin"));
    Ok(())
}

#[test]
fn test_large_blob_kept_when_protected_elsewhere() -> Result<()> {
    let mut history = History::new();
    let c1 = history.commit(&[("README.md", b"hello\n")], &[], "initial");
    let big = big_blob();
    let feature = history.commit(&[("big.bin", &big)], &[c1], "add data");
    let main = history.commit(&[("README.md", b"hello\n"), ("data/copy.bin", &big)], &[c1], "vendor data");
    history.main("main", main);
    history.branch("feature", feature);
    let store = &history.store;

    let (report, tracker) = rewrite(store, &pruning(1_000_000), &SecretSet::default())?;

    assert_eq!(report.stats.blobs_dropped, 0);
    assert!(report.ref_updates.is_empty());
    assert!(tracker.audit_records().is_empty());
    assert_eq!(store.resolve("feature")?, Some(feature));
    assert_eq!(files_at(store, feature)["big.bin"], big);
    Ok(())
}

#[test]
fn test_protect_all_refs_drops_nothing() -> Result<()> {
    let mut history = History::new();
    let c1 = history.commit(&[("a.txt", b"some text\n")], &[], "initial");
    let c2 = history.commit(&[("a.txt", b"some text\n"), ("b.txt", b"more\n")], &[c1], "second");
    let side = history.commit(&[("c.txt", b"side branch\n")], &[c1], "side");
    history.main("main", c2);
    history.branch("side", side);
    let store = &history.store;
    let refs_before = store.refs_snapshot();

    let config = RewriteConfig {
        strip_blobs_bigger_than: Some(0),
        protect_all_refs: true,
        ..RewriteConfig::default()
    };
    let (report, _) = rewrite(store, &config, &SecretSet::default())?;

    assert_eq!(report.stats.blobs_dropped, 0);
    assert_eq!(store.refs_snapshot(), refs_before);
    Ok(())
}

#[test]
fn test_empty_findings_max_threshold_keeps_refs() -> Result<()> {
    let (history, commits) = three_commits();
    let store = &history.store;
    let refs_before = store.refs_snapshot();

    let (report, _) = rewrite(store, &pruning(u64::MAX), &SecretSet::default())?;

    assert!(report.stats.is_noop());
    for id in &commits {
        assert_eq!(report.rewritten(id), Some(*id));
    }
    assert_eq!(store.refs_snapshot(), refs_before);
    Ok(())
}

#[test]
fn test_placeholder_replaces_dropped_blob() -> Result<()> {
    let mut history = History::new();
    let big = big_blob();
    let c1 = history.commit(&[("README.md", b"hello\n"), ("big.bin", &big)], &[], "initial");
    history.main("main", c1);
    let store = &history.store;
    let big_id = history.blob(&big);

    let config = RewriteConfig {
        strip_blobs_bigger_than: Some(1_000_000),
        protected_refs: Vec::new(),
        drop_mode: DropMode::Placeholder,
        ..RewriteConfig::default()
    };
    let (report, tracker) = rewrite(store, &config, &SecretSet::default())?;

    let files = files_at(store, report.rewritten(&c1).expect("walked"));
    assert!(!files.contains_key("big.bin"));
    let marker = &files["big.bin.REMOVED.git-id"];
    assert_eq!(marker, format!("{big_id}\n2000000\n").as_bytes());

    let audit = tracker.audit_records();
    assert_eq!(audit[0].new_blob, Some(history.blob(marker)));
    Ok(())
}

#[test]
fn test_placeholder_markers_survive_second_pass() -> Result<()> {
    let mut history = History::new();
    let c1 = history.commit(&[("a.txt", b"a\n")], &[], "initial");
    history.main("main", c1);
    let big = vec![b'z'; 100];
    let c2 = history.commit(&[("a.txt", b"a\n"), ("big.bin", &big)], &[c1], "big");
    history.branch("side", c2);
    let store = &history.store;

    let config = RewriteConfig {
        drop_mode: DropMode::Placeholder,
        ..pruning(10)
    };
    let (first, _) = rewrite(store, &config, &SecretSet::default())?;
    assert_eq!(first.stats.blobs_dropped, 1);
    let side = store.resolve("refs/heads/side")?.expect("side");

    let (second, tracker) = rewrite(store, &config, &SecretSet::default())?;
    assert_eq!(second.stats.blobs_dropped, 0);
    assert!(second.ref_updates.is_empty());
    assert!(tracker.audit_records().is_empty());

    let files = files_at(store, side);
    assert_eq!(
        files.keys().map(String::as_str).collect::<Vec<_>>(),
        ["a.txt", "big.bin.REMOVED.git-id"]
    );
    Ok(())
}

#[test]
fn test_marker_lookalike_is_still_pruned() -> Result<()> {
    let mut history = History::new();
    let c1 = history.commit(&[("keep", b"k\n")], &[], "initial");
    history.main("main", c1);
    let fake = vec![b'q'; 100];
    let c2 = history.commit(&[("keep", b"k\n"), ("notes.REMOVED.git-id", &fake)], &[c1], "lookalike");
    history.branch("side", c2);
    let store = &history.store;

    let (report, _) = rewrite(store, &pruning(10), &SecretSet::default())?;
    assert_eq!(report.stats.blobs_dropped, 1);
    let files = files_at(store, report.rewritten(&c2).expect("walked"));
    assert!(!files.contains_key("notes.REMOVED.git-id"));
    Ok(())
}

#[test]
fn test_placeholder_collision_is_refused() -> Result<()> {
    let mut history = History::new();
    let c1 = history.commit(&[("a.txt", b"a\n")], &[], "initial");
    history.main("main", c1);
    let big = vec![b'z'; 100];
    let c2 = history.commit(
        &[("a.txt", b"a\n"), ("big.bin", &big), ("big.bin.REMOVED.git-id", b"hand written\n")],
        &[c1],
        "collide",
    );
    history.branch("side", c2);
    let store = &history.store;
    let refs_before = store.refs_snapshot();

    let config = RewriteConfig {
        drop_mode: DropMode::Placeholder,
        ..pruning(10)
    };
    let tracker = MemoryTracker::new();
    let err = HistoryRewriter::new(store, &config, &SecretSet::default(), &tracker)?
        .run()
        .unwrap_err();
    assert!(
        matches!(&err, RewriteError::PlaceholderCollision { path, commit } if path == "big.bin.REMOVED.git-id" && *commit == c2),
        "{err}"
    );
    assert_eq!(store.refs_snapshot(), refs_before);
    Ok(())
}

#[test]
fn test_directory_emptied_by_pruning_is_removed() -> Result<()> {
    let mut history = History::new();
    let big = big_blob();
    let c1 = history.commit(
        &[("README.md", b"hello\n"), ("assets/raw/big.bin", &big)],
        &[],
        "initial",
    );
    history.main("main", c1);
    let store = &history.store;

    let config = RewriteConfig {
        strip_blobs_bigger_than: Some(1_000_000),
        protected_refs: Vec::new(),
        ..RewriteConfig::default()
    };
    let (report, _) = rewrite(store, &config, &SecretSet::default())?;

    let new_c1 = report.rewritten(&c1).expect("walked");
    let tree = store.read_tree(&store.read_commit(&new_c1)?.tree)?;
    assert!(tree.get(b"assets").is_none());
    assert!(tree.get(b"README.md").is_some());
    Ok(())
}

#[test]
fn test_commit_messages_redacted() -> Result<()> {
    let mut history = History::new();
    let c1 = history.commit(&[("a.txt", b"a\n")], &[], "initial");
    let c2 = history.commit(&[("a.txt", b"b\n")], &[c1], "rotate SECRET and hunter2");
    history.main("main", c2);
    let store = &history.store;

    let (report, tracker) = rewrite(store, &RewriteConfig::default(), &SecretSet::from_literals(["hunter2"]))?;

    let new_c2 = report.rewritten(&c2).expect("walked");
    let commit = store.read_commit(&new_c2)?;
    assert_eq!(commit.message, b"rotate [REDACTED] and [REDACTED]\n");
    assert_eq!(report.stats.messages_redacted, 1);
    assert_eq!(report.rewritten(&c1), Some(c1));

    let audit = tracker.audit_records();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].kind, MutationKind::MessageRedacted);
    assert_eq!(audit[0].commit, c2);
    Ok(())
}

#[test]
fn test_signatures_dropped_only_from_rewritten_commits() -> Result<()> {
    let mut history = History::new();
    let c1 = history.commit(&[("a.txt", b"clean\n")], &[], "initial");
    let c1 = history.sign(c1);
    let c2 = history.commit(&[("a.txt", b"token=hunter2\nclean\n")], &[c1], "leak");
    let c2 = history.sign(c2);
    history.main("main", c2);
    let store = &history.store;

    let (report, _) = rewrite(store, &RewriteConfig::default(), &SecretSet::from_literals(["hunter2"]))?;

    assert_eq!(report.rewritten(&c1), Some(c1));
    assert!(store.read_commit(&c1)?.is_signed());
    let new_c2 = report.rewritten(&c2).expect("walked");
    assert!(!store.read_commit(&new_c2)?.is_signed());
    Ok(())
}

#[test]
fn test_annotated_tags_follow_rewritten_commits() -> Result<()> {
    let mut history = History::new();
    let c1 = history.commit(&[("a.txt", b"clean\n")], &[], "initial");
    let c2 = history.commit(&[("a.txt", b"token=hunter2\n")], &[c1], "leak");
    history.main("main", c2);
    let v1 = history.tag("v1", c1, "first release");
    let v2 = history.tag("v2", c2, "second release");
    history.store.set_ref("refs/tags/v1", v1);
    history.store.set_ref("refs/tags/v2", v2);
    let store = &history.store;

    let (report, tracker) = rewrite(store, &RewriteConfig::default(), &SecretSet::from_literals(["hunter2"]))?;

    assert_eq!(store.resolve("refs/tags/v1")?, Some(v1));
    let new_v2 = store.resolve("refs/tags/v2")?.expect("tag ref exists");
    assert_ne!(new_v2, v2);
    let tag = store.read_tag(&new_v2)?;
    assert_eq!(tag.name, b"v2");
    assert_eq!(Some(tag.target), report.rewritten(&c2));
    assert_eq!(tag.message, b"second release\n");
    assert_eq!(report.stats.tags_rewritten, 1);

    let last = tracker.audit_records().pop().expect("audit entries");
    assert_eq!(last.kind, MutationKind::TagRewritten);
    assert_eq!(last.path.as_deref(), Some("refs/tags/v2"));
    Ok(())
}

#[test]
fn test_refs_not_leading_to_commits_are_untouched() -> Result<()> {
    let (history, [_, _, c3]) = three_commits();
    let store = &history.store;
    let note = history.blob(b"release notes\n");
    store.set_ref("refs/tags/notes", note);
    store.set_ref("refs/heads/gone", ObjectId::from_bytes([7; 20]));

    let (report, _) = rewrite(store, &RewriteConfig::default(), &SecretSet::from_literals(["SECRET_ABC123"]))?;

    assert_eq!(report.untouched_refs, vec!["refs/heads/gone".to_string(), "refs/tags/notes".to_string()]);
    assert_eq!(store.get_ref("refs/tags/notes"), Some(note));
    assert_ne!(store.get_ref("refs/heads/main"), Some(c3));
    Ok(())
}

#[test]
fn test_dangling_protected_ref_is_ignored() -> Result<()> {
    let (history, [_, _, c3]) = three_commits();
    let store = &history.store;
    store.set_ref("refs/heads/ghost", ObjectId::from_bytes([7; 20]));

    for config in [
        RewriteConfig {
            protected_refs: vec!["main".to_string(), "ghost".to_string()],
            ..pruning(10)
        },
        RewriteConfig {
            protect_all_refs: true,
            ..pruning(10)
        },
    ] {
        let tracker = MemoryTracker::new();
        let outcome = HistoryRewriter::new(store, &config, &SecretSet::default(), &tracker)?.run()?;
        let RewriteOutcome::Completed(report) = outcome else {
            anyhow::bail!("run did not complete");
        };
        assert_eq!(report.stats.blobs_dropped, 0);
        assert_eq!(report.untouched_refs, vec!["refs/heads/ghost".to_string()]);
    }
    assert_eq!(store.get_ref("refs/heads/main"), Some(c3));
    Ok(())
}

#[test]
fn test_backup_refs_keep_old_tips() -> Result<()> {
    let (history, [_, _, c3]) = three_commits();
    let store = &history.store;
    let config = RewriteConfig {
        backup_refs: true,
        ..RewriteConfig::default()
    };
    let secrets = SecretSet::from_literals(["SECRET_ABC123"]);

    rewrite(store, &config, &secrets)?;
    assert_eq!(store.get_ref("refs/scrub/original/refs/heads/main"), Some(c3));

    // The backup namespace is not walked, so a second pass changes nothing
    let (second, _) = rewrite(store, &config, &secrets)?;
    assert!(second.stats.is_noop());
    assert!(second.ref_updates.is_empty());
    assert_eq!(store.get_ref("refs/scrub/original/refs/heads/main"), Some(c3));
    Ok(())
}

#[test]
fn test_missing_blob_is_corrupt_history() -> Result<()> {
    let mut history = History::new();
    let ghost = ObjectId::from_bytes([3; 20]);
    let readme = history.blob(b"hello\n");
    let tree = history.store.write_tree(&Tree::from_entries(vec![
        Entry::new(MODE_FILE, b"README.md", readme),
        Entry::new(MODE_FILE, b"lost.txt", ghost),
    ]))?;
    let c1 = history.commit_tree(tree, &[], "initial");
    history.main("main", c1);
    let store = &history.store;
    let refs_before = store.refs_snapshot();

    let tracker = MemoryTracker::new();
    let config = RewriteConfig::default();
    let secrets = SecretSet::from_literals(["hunter2"]);
    let err = HistoryRewriter::new(store, &config, &secrets, &tracker)?.run().unwrap_err();

    assert!(matches!(err, RewriteError::CorruptHistory { id, .. } if id == ghost));
    assert_eq!(tracker.status(), Some(RunStatus::Failed));
    assert_eq!(store.refs_snapshot(), refs_before);
    Ok(())
}

#[test]
fn test_missing_subtree_is_corrupt_history() -> Result<()> {
    let mut history = History::new();
    let ghost = ObjectId::from_bytes([4; 20]);
    let tree = history
        .store
        .write_tree(&Tree::from_entries(vec![Entry::new(MODE_TREE, b"src", ghost)]))?;
    let c1 = history.commit_tree(tree, &[], "initial");
    history.main("main", c1);

    let tracker = MemoryTracker::new();
    let config = RewriteConfig::default();
    let secrets = SecretSet::default();
    let err = HistoryRewriter::new(&history.store, &config, &secrets, &tracker)?
        .run()
        .unwrap_err();
    assert!(matches!(err, RewriteError::CorruptHistory { id, .. } if id == ghost));
    Ok(())
}

#[test]
fn test_write_failure_leaves_refs_untouched() -> Result<()> {
    let (history, _) = three_commits();
    let refs_before = history.store.refs_snapshot();
    let failing = FailingStore::new(&history.store, 0);

    let tracker = MemoryTracker::new();
    let config = RewriteConfig::default();
    let secrets = SecretSet::from_literals(["SECRET_ABC123"]);
    let err = HistoryRewriter::new(&failing, &config, &secrets, &tracker)?
        .run()
        .unwrap_err();

    assert!(matches!(err, RewriteError::PartialWriteDetected { .. }));
    assert_eq!(tracker.status(), Some(RunStatus::Failed));
    assert_eq!(history.store.refs_snapshot(), refs_before);
    Ok(())
}

#[test]
fn test_invalid_config_rejected_before_reading() -> Result<()> {
    let (history, _) = three_commits();
    let tracker = MemoryTracker::new();
    let config = RewriteConfig {
        protected_refs: vec!["bad..name".to_string()],
        ..RewriteConfig::default()
    };
    let secrets = SecretSet::default();

    let result = HistoryRewriter::new(&history.store, &config, &secrets, &tracker);
    assert!(matches!(result, Err(RewriteError::InvalidRefList { .. })));
    assert_eq!(tracker.status(), None, "no run was started");
    Ok(())
}

#[test]
fn test_cancel_before_first_commit() -> Result<()> {
    let (history, _) = three_commits();
    let store = &history.store;
    let refs_before = store.refs_snapshot();
    let cancel = CancelToken::new();
    cancel.cancel();

    let tracker = MemoryTracker::new();
    let config = RewriteConfig::default();
    let secrets = SecretSet::from_literals(["SECRET_ABC123"]);
    let outcome = HistoryRewriter::new(store, &config, &secrets, &tracker)?
        .with_cancel(cancel)
        .run()?;

    match outcome {
        RewriteOutcome::Interrupted { processed, stats } => {
            assert_eq!(processed, 0);
            assert_eq!(stats.total_commits, 3);
        }
        RewriteOutcome::Completed(_) => panic!("run should have stopped"),
    }
    assert_eq!(tracker.status(), Some(RunStatus::Interrupted));
    assert_eq!(store.refs_snapshot(), refs_before);
    Ok(())
}
