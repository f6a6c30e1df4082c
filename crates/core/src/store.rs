//! Object and ref store abstractions
//!
//! The rewrite engine only ever talks to these two traits. Backends:
//! - [`MemoryStore`]: in-process store, used by tests and as a scratch store
//! - [`OverlayStore`]: buffers writes and ref updates over a read-only base
//!   (dry runs)
//! - the `scrub-git` crate: an on-disk Git repository

use crate::commit::{Commit, Tag};
use crate::error::StoreError;
use crate::hash::{ObjectId, ObjectKind};
use crate::tree::Tree;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An object as stored: kind plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    pub kind: ObjectKind,
    pub data: Bytes,
}

/// Content-addressed object storage
///
/// Implementations must be safe to share across threads: the rewriter reads
/// and writes from a worker pool.
pub trait ObjectStore: Send + Sync {
    /// Read an object; missing objects are `StoreError::NotFound`
    fn read(&self, id: &ObjectId) -> Result<RawObject, StoreError>;

    /// Check whether an object exists
    fn contains(&self, id: &ObjectId) -> Result<bool, StoreError>;

    /// Write an object, returning its id
    ///
    /// Writing an object that already exists is a no-op that returns the
    /// same id.
    fn write(&self, kind: ObjectKind, data: &[u8]) -> Result<ObjectId, StoreError>;

    /// Kind and payload size without loading the payload where the backend
    /// allows it
    fn header(&self, id: &ObjectId) -> Result<(ObjectKind, u64), StoreError> {
        let raw = self.read(id)?;
        Ok((raw.kind, raw.data.len() as u64))
    }

    /// Read and parse a commit
    fn read_commit(&self, id: &ObjectId) -> Result<Commit, StoreError> {
        let raw = self.read_kind(id, ObjectKind::Commit)?;
        Commit::parse(&raw).map_err(|source| StoreError::Corrupt { id: *id, source })
    }

    /// Read and parse a tree
    fn read_tree(&self, id: &ObjectId) -> Result<Tree, StoreError> {
        let raw = self.read_kind(id, ObjectKind::Tree)?;
        Tree::parse(&raw).map_err(|source| StoreError::Corrupt { id: *id, source })
    }

    /// Read and parse an annotated tag
    fn read_tag(&self, id: &ObjectId) -> Result<Tag, StoreError> {
        let raw = self.read_kind(id, ObjectKind::Tag)?;
        Tag::parse(&raw).map_err(|source| StoreError::Corrupt { id: *id, source })
    }

    /// Read blob content
    fn read_blob(&self, id: &ObjectId) -> Result<Bytes, StoreError> {
        self.read_kind(id, ObjectKind::Blob)
    }

    /// Read a payload, checking its kind
    fn read_kind(&self, id: &ObjectId, expected: ObjectKind) -> Result<Bytes, StoreError> {
        let raw = self.read(id)?;
        if raw.kind != expected {
            return Err(StoreError::WrongKind {
                id: *id,
                expected,
                found: raw.kind,
            });
        }
        Ok(raw.data)
    }

    fn write_blob(&self, data: &[u8]) -> Result<ObjectId, StoreError> {
        self.write(ObjectKind::Blob, data)
    }

    fn write_tree(&self, tree: &Tree) -> Result<ObjectId, StoreError> {
        self.write(ObjectKind::Tree, &tree.serialize())
    }

    fn write_commit(&self, commit: &Commit) -> Result<ObjectId, StoreError> {
        self.write(ObjectKind::Commit, &commit.serialize())
    }

    fn write_tag(&self, tag: &Tag) -> Result<ObjectId, StoreError> {
        self.write(ObjectKind::Tag, &tag.serialize())
    }
}

/// A requested ref change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefUpdate {
    /// Full ref name (`refs/heads/main`)
    pub name: String,
    /// Value the ref must currently have; `None` creates the ref
    pub old: Option<ObjectId>,
    /// New target
    pub new: ObjectId,
}

/// Named pointers into the object graph
pub trait RefStore: Send + Sync {
    /// All direct refs (symbolic refs such as `HEAD` are skipped), sorted by
    /// name
    fn list_refs(&self) -> Result<Vec<(String, ObjectId)>, StoreError>;

    /// Resolve a user-supplied name (`HEAD`, `main`, `origin/dev`,
    /// `refs/tags/v1`, a full hex id). Unknown names resolve to `None`.
    fn resolve(&self, name: &str) -> Result<Option<ObjectId>, StoreError>;

    /// Apply every update or none of them
    ///
    /// Fails with `StoreError::RefUpdate` if any ref no longer has its
    /// expected old value.
    fn apply_ref_updates(&self, updates: &[RefUpdate]) -> Result<(), StoreError>;
}

/// Candidate full names tried for a short ref name, in order
pub fn ref_candidates(name: &str) -> Vec<String> {
    if name.starts_with("refs/") {
        return vec![name.to_string()];
    }
    vec![
        format!("refs/{name}"),
        format!("refs/heads/{name}"),
        format!("refs/tags/{name}"),
        format!("refs/remotes/{name}"),
    ]
}

/// In-memory object and ref store
#[derive(Default)]
pub struct MemoryStore {
    objects: DashMap<ObjectId, RawObject>,
    refs: RwLock<BTreeMap<String, ObjectId>>,
    /// Ref `HEAD` points at
    head: RwLock<Option<String>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Point a ref at an object
    pub fn set_ref(&self, name: &str, id: ObjectId) {
        self.refs.write().insert(name.to_string(), id);
    }

    /// Remove a ref
    pub fn delete_ref(&self, name: &str) -> Option<ObjectId> {
        self.refs.write().remove(name)
    }

    /// Current target of a full ref name
    pub fn get_ref(&self, name: &str) -> Option<ObjectId> {
        self.refs.read().get(name).copied()
    }

    /// Make `HEAD` a symbolic ref to `name`
    pub fn set_head(&self, name: &str) {
        *self.head.write() = Some(name.to_string());
    }

    /// Number of stored objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Snapshot of all refs
    pub fn refs_snapshot(&self) -> BTreeMap<String, ObjectId> {
        self.refs.read().clone()
    }
}

impl ObjectStore for MemoryStore {
    fn read(&self, id: &ObjectId) -> Result<RawObject, StoreError> {
        self.objects
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(*id))
    }

    fn contains(&self, id: &ObjectId) -> Result<bool, StoreError> {
        Ok(self.objects.contains_key(id))
    }

    fn write(&self, kind: ObjectKind, data: &[u8]) -> Result<ObjectId, StoreError> {
        let id = ObjectId::for_object(kind, data);
        self.objects.entry(id).or_insert_with(|| RawObject {
            kind,
            data: Bytes::copy_from_slice(data),
        });
        Ok(id)
    }
}

impl RefStore for MemoryStore {
    fn list_refs(&self) -> Result<Vec<(String, ObjectId)>, StoreError> {
        Ok(self
            .refs
            .read()
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect())
    }

    fn resolve(&self, name: &str) -> Result<Option<ObjectId>, StoreError> {
        let refs = self.refs.read();

        if name == "HEAD" {
            let head = self.head.read();
            return Ok(head.as_ref().and_then(|target| refs.get(target).copied()));
        }

        for candidate in ref_candidates(name) {
            if let Some(id) = refs.get(&candidate) {
                return Ok(Some(*id));
            }
        }

        if let Ok(id) = ObjectId::from_hex(name) {
            if self.objects.contains_key(&id) {
                return Ok(Some(id));
            }
        }

        Ok(None)
    }

    fn apply_ref_updates(&self, updates: &[RefUpdate]) -> Result<(), StoreError> {
        let mut refs = self.refs.write();

        for update in updates {
            let current = refs.get(&update.name).copied();
            if current != update.old {
                return Err(StoreError::RefUpdate(format!(
                    "{} moved: expected {:?}, found {:?}",
                    update.name, update.old, current
                )));
            }
        }
        for update in updates {
            refs.insert(update.name.clone(), update.new);
        }

        Ok(())
    }
}

/// Write buffer over a read-only base store
///
/// Reads fall through to the base; writes and ref updates stay in memory.
/// Used for dry runs, where the full rewrite must run without touching the
/// repository.
pub struct OverlayStore<'a, S: ?Sized> {
    base: &'a S,
    written: MemoryStore,
    staged_refs: RwLock<Vec<RefUpdate>>,
}

impl<'a, S: ObjectStore + RefStore + ?Sized> OverlayStore<'a, S> {
    /// Wrap a base store
    pub fn new(base: &'a S) -> Self {
        Self {
            base,
            written: MemoryStore::new(),
            staged_refs: RwLock::new(Vec::new()),
        }
    }

    /// Number of objects that would have been written to the base
    pub fn buffered_objects(&self) -> usize {
        self.written.object_count()
    }

    /// Ref updates that would have been applied
    pub fn staged_ref_updates(&self) -> Vec<RefUpdate> {
        self.staged_refs.read().clone()
    }
}

impl<'a, S: ObjectStore + RefStore + ?Sized> ObjectStore for OverlayStore<'a, S> {
    fn read(&self, id: &ObjectId) -> Result<RawObject, StoreError> {
        match self.written.read(id) {
            Ok(raw) => Ok(raw),
            Err(StoreError::NotFound(_)) => self.base.read(id),
            Err(e) => Err(e),
        }
    }

    fn contains(&self, id: &ObjectId) -> Result<bool, StoreError> {
        Ok(self.written.contains(id)? || self.base.contains(id)?)
    }

    fn write(&self, kind: ObjectKind, data: &[u8]) -> Result<ObjectId, StoreError> {
        let id = ObjectId::for_object(kind, data);
        if self.base.contains(&id)? {
            return Ok(id);
        }
        self.written.write(kind, data)
    }

    fn header(&self, id: &ObjectId) -> Result<(ObjectKind, u64), StoreError> {
        match self.written.header(id) {
            Ok(header) => Ok(header),
            Err(StoreError::NotFound(_)) => self.base.header(id),
            Err(e) => Err(e),
        }
    }
}

impl<'a, S: ObjectStore + RefStore + ?Sized> RefStore for OverlayStore<'a, S> {
    fn list_refs(&self) -> Result<Vec<(String, ObjectId)>, StoreError> {
        self.base.list_refs()
    }

    fn resolve(&self, name: &str) -> Result<Option<ObjectId>, StoreError> {
        self.base.resolve(name)
    }

    fn apply_ref_updates(&self, updates: &[RefUpdate]) -> Result<(), StoreError> {
        self.staged_refs.write().extend_from_slice(updates);
        Ok(())
    }
}
