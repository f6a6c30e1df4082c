//! Invariants checked over seeded random histories

use crate::common::history::BIG_BLOB;
use crate::common::{files_at, pruning, random_history, rewrite};
use ahash::{AHashMap, AHashSet};
use anyhow::Result;
use scrub_core::{ObjectId, ObjectStore, RefStore};
use scrub_journal::MutationKind;
use scrub_rewrite::{DropMode, ProtectedSet, RewriteConfig, SecretSet, Walker};

const SEEDS: [u64; 4] = [1, 7, 42, 2024];

/// Content with every line holding a secret taken out
fn without_secret_lines(content: &[u8], secrets: &[String]) -> Vec<u8> {
    content
        .split_inclusive(|&b| b == b'\n')
        .filter(|line| {
            !secrets
                .iter()
                .any(|s| line.windows(s.len()).any(|w| w == s.as_bytes()))
        })
        .flatten()
        .copied()
        .collect()
}

fn contains_secret(content: &[u8], secrets: &[String]) -> bool {
    secrets
        .iter()
        .any(|s| content.windows(s.len()).any(|w| w == s.as_bytes()))
}

#[test]
fn test_second_pass_is_noop() -> Result<()> {
    // Placeholder markers (~50 bytes) sit above the second threshold
    let placeholders = RewriteConfig {
        drop_mode: DropMode::Placeholder,
        ..pruning(10)
    };
    for (seed, config) in SEEDS
        .into_iter()
        .flat_map(|seed| [(seed, pruning(BIG_BLOB as u64)), (seed, placeholders.clone())])
    {
        let generated = random_history(seed, 40);
        let store = &generated.history.store;
        let secrets = SecretSet::from_literals(&generated.secrets);

        let (first, _) = rewrite(store, &config, &secrets)?;
        assert!(!first.stats.is_noop(), "seed {seed} should need a rewrite");

        let refs_after_first = store.refs_snapshot();
        let (second, tracker) = rewrite(store, &config, &secrets)?;
        assert_eq!(second.stats.blobs_modified, 0, "seed {seed}");
        assert_eq!(second.stats.blobs_dropped, 0, "seed {seed}");
        assert_eq!(second.stats.messages_redacted, 0, "seed {seed}");
        assert_eq!(second.stats.commits_rewritten, 0, "seed {seed}");
        assert!(second.ref_updates.is_empty());
        assert!(tracker.audit_records().is_empty());
        assert_eq!(store.refs_snapshot(), refs_after_first);
    }
    Ok(())
}

#[test]
fn test_clean_ancestry_keeps_commit_ids() -> Result<()> {
    for seed in SEEDS {
        let generated = random_history(seed, 40);
        let store = &generated.history.store;
        let secrets = SecretSet::from_literals(&generated.secrets);

        // Decide which commits must change before rewriting
        let mut dirty: AHashSet<ObjectId> = AHashSet::new();
        for id in &generated.commits {
            let commit = store.read_commit(id)?;
            let own = commit.message.windows(6).any(|w| w == b"SECRET")
                || files_at(store, *id)
                    .values()
                    .any(|content| contains_secret(content, &generated.secrets));
            if own || commit.parents.iter().any(|p| dirty.contains(p)) {
                dirty.insert(*id);
            }
        }

        let (report, _) = rewrite(store, &RewriteConfig::default(), &secrets)?;
        for id in &generated.commits {
            let new = report.rewritten(id).expect("every commit is walked");
            if dirty.contains(id) {
                assert_ne!(new, *id, "seed {seed}: commit {id} should change");
            } else {
                assert_eq!(new, *id, "seed {seed}: commit {id} should keep its id");
            }
        }
        assert_eq!(report.stats.commits_rewritten as usize, dirty.len());
    }
    Ok(())
}

#[test]
fn test_redaction_removes_exactly_secret_lines() -> Result<()> {
    for seed in SEEDS {
        let generated = random_history(seed, 40);
        let store = &generated.history.store;
        let secrets = SecretSet::from_literals(&generated.secrets);

        let (report, _) = rewrite(store, &RewriteConfig::default(), &secrets)?;

        for id in &generated.commits {
            let before = files_at(store, *id);
            let after = files_at(store, report.rewritten(id).expect("walked"));
            assert_eq!(
                before.keys().collect::<Vec<_>>(),
                after.keys().collect::<Vec<_>>(),
                "redaction never removes files"
            );
            for (path, old) in &before {
                let new = &after[path];
                assert!(!contains_secret(new, &generated.secrets), "seed {seed}: {path} still leaks");
                assert_eq!(
                    new,
                    &without_secret_lines(old, &generated.secrets),
                    "seed {seed}: {path} lost or reordered clean lines"
                );
            }
        }
    }
    Ok(())
}

#[test]
fn test_protected_blobs_survive_pruning() -> Result<()> {
    for seed in SEEDS {
        let generated = random_history(seed, 60);
        let store = &generated.history.store;
        let threshold = BIG_BLOB as u64;

        let protected = ProtectedSet::for_refs(store, &["HEAD".to_string()])?;
        let large_protected: Vec<ObjectId> = generated
            .commits
            .iter()
            .flat_map(|id| Walker::new(store).introduced_blobs(id).expect("walkable"))
            .map(|(_, blob)| blob)
            .filter(|blob| protected.contains(blob))
            .filter(|blob| store.header(blob).map(|(_, size)| size > threshold).unwrap_or(false))
            .collect();

        let (_, tracker) = rewrite(store, &pruning(threshold), &SecretSet::default())?;

        let dropped: AHashSet<ObjectId> = tracker
            .audit_records()
            .iter()
            .filter(|r| r.kind == MutationKind::BlobDropped)
            .filter_map(|r| r.blob)
            .collect();
        let surviving = ProtectedSet::for_all_refs(store)?;
        for blob in &large_protected {
            assert!(!dropped.contains(blob), "seed {seed}: protected blob {blob} dropped");
            assert!(surviving.contains(blob), "seed {seed}: protected blob {blob} unreachable");
        }
        for blob in &dropped {
            assert!(!surviving.contains(blob), "seed {seed}: dropped blob {blob} still reachable");
        }
    }
    Ok(())
}

#[test]
fn test_rewritten_parents_resolve() -> Result<()> {
    for seed in SEEDS {
        let generated = random_history(seed, 50);
        let store = &generated.history.store;
        let secrets = SecretSet::from_literals(&generated.secrets);

        let (report, _) = rewrite(store, &pruning(BIG_BLOB as u64), &secrets)?;
        let images: AHashMap<ObjectId, ObjectId> = report.commit_map.iter().copied().collect();
        let rewritten: AHashSet<ObjectId> = images.values().copied().collect();

        for (old, new) in &images {
            let before = store.read_commit(old)?;
            let after = store.read_commit(new)?;
            assert_eq!(before.parents.len(), after.parents.len());
            for (old_parent, new_parent) in before.parents.iter().zip(&after.parents) {
                assert!(rewritten.contains(new_parent), "seed {seed}: dangling parent {new_parent}");
                assert_eq!(images[old_parent], *new_parent);
            }
        }

        // The new refs reach exactly the rewritten commits
        let plan = Walker::new(store).walk(&store.list_refs()?)?;
        let reached: AHashSet<ObjectId> = plan.commits.into_iter().collect();
        assert_eq!(reached, rewritten, "seed {seed}");
    }
    Ok(())
}

#[test]
fn test_empty_findings_without_pruning_is_identity() -> Result<()> {
    for seed in SEEDS {
        let generated = random_history(seed, 40);
        let store = &generated.history.store;
        let refs_before = store.refs_snapshot();
        let objects_before = store.object_count();

        let mut config = pruning(u64::MAX);
        config.message.literals.clear();
        let (report, tracker) = rewrite(store, &config, &SecretSet::default())?;

        assert!(report.stats.is_noop());
        assert!(report.ref_updates.is_empty());
        assert!(report.commit_map.iter().all(|(old, new)| old == new));
        assert!(tracker.audit_records().is_empty());
        assert_eq!(store.refs_snapshot(), refs_before);
        assert_eq!(store.object_count(), objects_before, "no object was written");
    }
    Ok(())
}
