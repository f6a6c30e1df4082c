//! Old → new identity table built during a rewrite
//!
//! Every key is written once. Concurrent readers see either nothing or the
//! final value.

use crate::error::RewriteError;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use scrub_core::ObjectId;
use scrub_journal::BlobOutcome;

/// Image of a tree after rewriting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeImage {
    /// New (or unchanged) tree id
    Tree(ObjectId),
    /// Every entry was pruned; the parent drops this entry
    Emptied,
}

#[derive(Debug, Default)]
pub struct RewriteMapping {
    blobs: DashMap<ObjectId, BlobOutcome>,
    trees: DashMap<ObjectId, TreeImage>,
    commits: DashMap<ObjectId, ObjectId>,
}

impl RewriteMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blob(&self, id: &ObjectId) -> Option<BlobOutcome> {
        self.blobs.get(id).map(|e| *e.value())
    }

    pub fn tree(&self, id: &ObjectId) -> Option<TreeImage> {
        self.trees.get(id).map(|e| *e.value())
    }

    pub fn commit(&self, id: &ObjectId) -> Option<ObjectId> {
        self.commits.get(id).map(|e| *e.value())
    }

    /// Record a blob outcome; returns true if this call resolved it
    pub fn insert_blob(&self, id: ObjectId, outcome: BlobOutcome) -> Result<bool, RewriteError> {
        insert_once(&self.blobs, id, outcome)
    }

    pub fn insert_tree(&self, id: ObjectId, image: TreeImage) -> Result<bool, RewriteError> {
        insert_once(&self.trees, id, image)
    }

    pub fn insert_commit(&self, old: ObjectId, new: ObjectId) -> Result<bool, RewriteError> {
        insert_once(&self.commits, old, new)
    }

    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    /// Snapshot of old → new commit ids
    pub fn commit_pairs(&self) -> Vec<(ObjectId, ObjectId)> {
        let mut pairs: Vec<_> = self.commits.iter().map(|e| (*e.key(), *e.value())).collect();
        pairs.sort();
        pairs
    }
}

fn insert_once<V>(map: &DashMap<ObjectId, V>, id: ObjectId, value: V) -> Result<bool, RewriteError>
where
    V: PartialEq + std::fmt::Debug,
{
    match map.entry(id) {
        MapEntry::Vacant(slot) => {
            slot.insert(value);
            Ok(true)
        }
        MapEntry::Occupied(existing) if *existing.get() == value => Ok(false),
        MapEntry::Occupied(existing) => Err(RewriteError::MappingConflict {
            id,
            existing: format!("{:?}", existing.get()),
            attempted: format!("{value:?}"),
        }),
    }
}
