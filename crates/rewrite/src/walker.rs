//! Commit graph walker
//!
//! Produces every commit reachable from the refs, parents before children.
//! Ties are broken by committer time, then id, so reruns see the same order.

use crate::error::RewriteError;
use ahash::{AHashMap, AHashSet};
use scrub_core::{ObjectId, ObjectKind, ObjectStore, StoreError, Tree, TreeDiff};
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

/// Namespace used for backup refs; never walked
pub const INTERNAL_REF_PREFIX: &str = "refs/scrub/";

pub fn is_internal_ref(name: &str) -> bool {
    name.starts_with(INTERNAL_REF_PREFIX)
}

/// A ref and the commit it leads to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedRef {
    pub name: String,
    /// Direct target (a commit, or an annotated tag)
    pub target: ObjectId,
    /// Commit reached after peeling tags; `None` for dangling refs and refs
    /// to trees or blobs
    pub commit: Option<ObjectId>,
}

impl WalkedRef {
    /// True when the ref points at an annotated tag
    pub fn is_tag(&self) -> bool {
        self.commit.is_some_and(|c| c != self.target)
    }
}

/// Result of a walk
#[derive(Debug, Clone, Default)]
pub struct WalkPlan {
    /// Topological order, parents first
    pub commits: Vec<ObjectId>,
    pub refs: Vec<WalkedRef>,
}

struct Node {
    parents: SmallVec<[ObjectId; 2]>,
    time: i64,
}

/// Read-only traversal over an object store
pub struct Walker<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: ObjectStore + ?Sized> Walker<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Walk everything reachable from `refs`
    ///
    /// Refs under `refs/scrub/` are skipped. A missing parent or tree is
    /// `CorruptHistory`.
    pub fn walk(&self, refs: &[(String, ObjectId)]) -> Result<WalkPlan, RewriteError> {
        let mut walked = Vec::with_capacity(refs.len());
        let mut tips = Vec::new();
        for (name, target) in refs {
            if is_internal_ref(name) {
                continue;
            }
            let commit = self.peel(name, *target)?;
            if let Some(commit) = commit {
                tips.push(commit);
            }
            walked.push(WalkedRef {
                name: name.clone(),
                target: *target,
                commit,
            });
        }

        let nodes = self.collect(&tips)?;
        let commits = topo_order(&nodes);
        tracing::info!(commits = commits.len(), refs = walked.len(), "walked history");

        Ok(WalkPlan {
            commits,
            refs: walked,
        })
    }

    /// Follow annotated tags down to a commit
    fn peel(&self, name: &str, target: ObjectId) -> Result<Option<ObjectId>, RewriteError> {
        let mut id = target;
        loop {
            let kind = match self.store.header(&id) {
                Ok((kind, _)) => kind,
                Err(StoreError::NotFound(_)) => {
                    tracing::warn!(refname = name, target = %id, "ref target is missing, leaving ref untouched");
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };
            match kind {
                ObjectKind::Commit => return Ok(Some(id)),
                ObjectKind::Tag => {
                    id = self
                        .store
                        .read_tag(&id)
                        .map_err(RewriteError::on_read(id, format!("tag behind {name}")))?
                        .target;
                }
                other => {
                    tracing::warn!(refname = name, kind = %other, "ref does not lead to a commit, leaving ref untouched");
                    return Ok(None);
                }
            }
        }
    }

    /// Load every commit reachable from `tips`
    fn collect(&self, tips: &[ObjectId]) -> Result<AHashMap<ObjectId, Node>, RewriteError> {
        let mut nodes = AHashMap::new();
        let mut queued: AHashSet<ObjectId> = tips.iter().copied().collect();
        let mut queue: VecDeque<(ObjectId, Option<ObjectId>)> =
            tips.iter().map(|tip| (*tip, None)).collect();

        while let Some((id, child)) = queue.pop_front() {
            let context = match child {
                Some(child) => format!("parent of commit {child}"),
                None => "commit at ref tip".to_string(),
            };
            let commit = self
                .store
                .read_commit(&id)
                .map_err(RewriteError::on_read(id, context))?;

            if !self.store.contains(&commit.tree)? {
                return Err(RewriteError::CorruptHistory {
                    id: commit.tree,
                    context: format!("tree of commit {id}"),
                });
            }

            for parent in &commit.parents {
                if queued.insert(*parent) {
                    queue.push_back((*parent, Some(id)));
                }
            }
            nodes.insert(
                id,
                Node {
                    time: commit.timestamp(),
                    parents: commit.parents,
                },
            );
        }
        Ok(nodes)
    }

    /// `(path, blob)` pairs a commit adds or changes relative to its first
    /// parent; every blob for a root commit
    pub fn introduced_blobs(&self, commit: &ObjectId) -> Result<Vec<(String, ObjectId)>, RewriteError> {
        let commit_obj = self
            .store
            .read_commit(commit)
            .map_err(RewriteError::on_read(*commit, "commit"))?;
        let tree = self.read_tree(&commit_obj.tree)?;
        let parent_tree = match commit_obj.parents.first() {
            Some(parent) => {
                let parent = self
                    .store
                    .read_commit(parent)
                    .map_err(RewriteError::on_read(*parent, format!("parent of commit {commit}")))?;
                self.read_tree(&parent.tree)?
            }
            None => Tree::new(),
        };

        let mut out = Vec::new();
        self.diff_blobs(&parent_tree, &tree, "", &mut out)?;
        out.sort();
        Ok(out)
    }

    fn diff_blobs(
        &self,
        old: &Tree,
        new: &Tree,
        prefix: &str,
        out: &mut Vec<(String, ObjectId)>,
    ) -> Result<(), RewriteError> {
        let diff = TreeDiff::diff(old, new);
        let changed = diff
            .added
            .iter()
            .map(|entry| (None, entry))
            .chain(diff.modified.iter().map(|(previous, entry)| (Some(previous), entry)));
        for (previous, entry) in changed {
            let path = join_path(prefix, &entry.name);
            if entry.is_blob() {
                // A mode-only change introduces no new content
                if previous.map_or(true, |p| p.id != entry.id) {
                    out.push((path, entry.id));
                }
            } else if entry.is_tree() {
                let previous_tree = match previous.filter(|p| p.is_tree()) {
                    Some(p) => self.read_tree(&p.id)?,
                    None => Tree::new(),
                };
                let subtree = self.read_tree(&entry.id)?;
                self.diff_blobs(&previous_tree, &subtree, &path, out)?;
            }
        }
        Ok(())
    }

    fn read_tree(&self, id: &ObjectId) -> Result<Tree, RewriteError> {
        self.store
            .read_tree(id)
            .map_err(RewriteError::on_read(*id, "tree"))
    }
}

/// Kahn's algorithm with a min-heap on (committer time, id)
fn topo_order(nodes: &AHashMap<ObjectId, Node>) -> Vec<ObjectId> {
    let mut pending: AHashMap<ObjectId, usize> = AHashMap::with_capacity(nodes.len());
    let mut children: AHashMap<ObjectId, Vec<ObjectId>> = AHashMap::new();
    let mut ready = BinaryHeap::new();

    for (id, node) in nodes {
        pending.insert(*id, node.parents.len());
        for parent in &node.parents {
            children.entry(*parent).or_default().push(*id);
        }
        if node.parents.is_empty() {
            ready.push(Reverse((node.time, *id)));
        }
    }

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse((_, id))) = ready.pop() {
        order.push(id);
        if let Some(kids) = children.get(&id) {
            for kid in kids {
                if let Some(count) = pending.get_mut(kid) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse((nodes[kid].time, *kid)));
                    }
                }
            }
        }
    }
    order
}

/// Join a tree path prefix and an entry name
pub(crate) fn join_path(prefix: &str, name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    if prefix.is_empty() {
        name.into_owned()
    } else {
        format!("{prefix}/{name}")
    }
}
