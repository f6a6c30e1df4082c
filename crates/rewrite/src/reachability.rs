//! Blob reachability: the set of blobs pruning must never touch

use crate::error::RewriteError;
use ahash::AHashSet;
use scrub_core::{ObjectId, ObjectKind, ObjectStore, RefStore, StoreError};
use std::collections::VecDeque;

/// Blob ids reachable from the protected refs
///
/// Computed once per run, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ProtectedSet {
    blobs: AHashSet<ObjectId>,
}

impl ProtectedSet {
    pub fn from_ids(ids: impl IntoIterator<Item = ObjectId>) -> Self {
        Self {
            blobs: ids.into_iter().collect(),
        }
    }

    /// Blobs reachable from the named refs
    ///
    /// Names that do not resolve contribute nothing and are logged.
    pub fn for_refs<S>(store: &S, names: &[String]) -> Result<Self, RewriteError>
    where
        S: ObjectStore + RefStore + ?Sized,
    {
        let mut tips = Vec::with_capacity(names.len());
        for name in names {
            match store.resolve(name)? {
                Some(id) => tips.push(id),
                None => tracing::warn!(refname = %name, "protected ref does not resolve, ignoring"),
            }
        }
        Self::reachable(store, &tips)
    }

    /// Blobs reachable from every ref outside `refs/scrub/`
    pub fn for_all_refs<S>(store: &S) -> Result<Self, RewriteError>
    where
        S: ObjectStore + RefStore + ?Sized,
    {
        let tips: Vec<ObjectId> = store
            .list_refs()?
            .into_iter()
            .filter(|(name, _)| !crate::walker::is_internal_ref(name))
            .map(|(_, id)| id)
            .collect();
        Self::reachable(store, &tips)
    }

    /// Full traversal from `tips` through all ancestors and their trees
    ///
    /// Tips may be commits, annotated tags, trees or blobs. A tip (or the
    /// target of a tip tag) missing from the store contributes nothing; a
    /// missing ancestor is still corruption.
    pub fn reachable<S>(store: &S, tips: &[ObjectId]) -> Result<Self, RewriteError>
    where
        S: ObjectStore + ?Sized,
    {
        let mut blobs = AHashSet::new();
        let mut seen_commits = AHashSet::new();
        let mut seen_trees = AHashSet::new();
        let mut commits = VecDeque::new();
        let mut trees = Vec::new();

        let mut pending = tips.to_vec();
        while let Some(id) = pending.pop() {
            let kind = match store.header(&id) {
                Ok((kind, _)) => kind,
                Err(StoreError::NotFound(_)) => {
                    tracing::warn!(target_id = %id, "protected ref points at a missing object, ignoring");
                    continue;
                }
                Err(err) => return Err(RewriteError::on_read(id, "protected ref target")(err)),
            };
            match kind {
                ObjectKind::Commit => commits.push_back(id),
                ObjectKind::Tree => trees.push(id),
                ObjectKind::Blob => {
                    blobs.insert(id);
                }
                ObjectKind::Tag => {
                    let tag = store
                        .read_tag(&id)
                        .map_err(RewriteError::on_read(id, "protected tag"))?;
                    pending.push(tag.target);
                }
            }
        }

        collect_trees(store, &mut trees, &mut seen_trees, &mut blobs)?;
        while let Some(id) = commits.pop_front() {
            if !seen_commits.insert(id) {
                continue;
            }
            let commit = store
                .read_commit(&id)
                .map_err(RewriteError::on_read(id, "protected commit"))?;
            trees.push(commit.tree);
            commits.extend(commit.parents.iter().copied());
            collect_trees(store, &mut trees, &mut seen_trees, &mut blobs)?;
        }

        tracing::debug!(
            tips = tips.len(),
            commits = seen_commits.len(),
            blobs = blobs.len(),
            "computed protected set"
        );
        Ok(Self { blobs })
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.blobs.contains(id)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

fn collect_trees<S: ObjectStore + ?Sized>(
    store: &S,
    trees: &mut Vec<ObjectId>,
    seen: &mut AHashSet<ObjectId>,
    blobs: &mut AHashSet<ObjectId>,
) -> Result<(), RewriteError> {
    while let Some(id) = trees.pop() {
        if !seen.insert(id) {
            continue;
        }
        let tree = store
            .read_tree(&id)
            .map_err(RewriteError::on_read(id, "protected tree"))?;
        for entry in tree.entries() {
            if entry.is_tree() {
                trees.push(entry.id);
            } else if entry.is_blob() {
                blobs.insert(entry.id);
            }
        }
    }
    Ok(())
}
