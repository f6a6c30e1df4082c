//! Tree objects: directory listings of (mode, name, id)

use crate::error::ParseError;
use crate::hash::{ObjectId, ObjectKind};
use smallvec::SmallVec;
use std::cmp::Ordering;

/// Entry names are usually short, keep them on the stack
pub type EntryName = SmallVec<[u8; 64]>;

/// Mode of a sub-tree entry
pub const MODE_TREE: u32 = 0o040000;
/// Mode of a regular file
pub const MODE_FILE: u32 = 0o100644;
/// Mode of an executable file
pub const MODE_EXECUTABLE: u32 = 0o100755;
/// Mode of a symbolic link
pub const MODE_SYMLINK: u32 = 0o120000;
/// Mode of a gitlink (submodule commit)
pub const MODE_GITLINK: u32 = 0o160000;

/// Type of tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular or executable file
    File,
    /// Symbolic link (stored as a blob)
    Symlink,
    /// Nested tree
    Tree,
    /// Submodule commit, lives in another repository
    Submodule,
}

/// Entry in a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Unix mode as stored in the tree
    pub mode: u32,
    /// Path segment (no `/`)
    pub name: EntryName,
    /// Id of the blob, tree or gitlink commit
    pub id: ObjectId,
}

impl Entry {
    /// Create a new entry
    pub fn new(mode: u32, name: &[u8], id: ObjectId) -> Self {
        Self {
            mode,
            name: EntryName::from_slice(name),
            id,
        }
    }

    /// Classify the entry by mode
    pub fn kind(&self) -> EntryKind {
        match self.mode & 0o170000 {
            0o040000 => EntryKind::Tree,
            0o120000 => EntryKind::Symlink,
            0o160000 => EntryKind::Submodule,
            _ => EntryKind::File,
        }
    }

    /// True for entries whose id names a blob
    pub fn is_blob(&self) -> bool {
        matches!(self.kind(), EntryKind::File | EntryKind::Symlink)
    }

    /// True for nested trees
    pub fn is_tree(&self) -> bool {
        self.kind() == EntryKind::Tree
    }

    /// Name as UTF-8 (lossy)
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// Compare two entries the way Git orders them: trees sort as if their
/// name had a trailing `/`.
pub fn entry_order(a: &Entry, b: &Entry) -> Ordering {
    let common = a.name.len().min(b.name.len());
    match a.name[..common].cmp(&b.name[..common]) {
        Ordering::Equal => {}
        other => return other,
    }
    let tail = |e: &Entry| -> u8 {
        match e.name.get(common) {
            Some(&c) => c,
            None if e.is_tree() => b'/',
            None => 0,
        }
    };
    tail(a).cmp(&tail(b))
}

/// A directory listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<Entry>,
}

impl Tree {
    /// Create a new empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from entries, sorting them canonically
    pub fn from_entries(mut entries: Vec<Entry>) -> Self {
        entries.sort_by(entry_order);
        Self { entries }
    }

    /// Entries in canonical order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Consume the tree, returning its entries
    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    /// Look up an entry by name
    pub fn get(&self, name: &[u8]) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name.as_slice() == name)
    }

    /// Get the number of entries in the tree
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the tree is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a tree payload
    ///
    /// Format, repeated: `<octal mode> SP <name> NUL <20-byte id>`
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let mut entries = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| ParseError::malformed(ObjectKind::Tree, "missing mode separator"))?;
            let mode = parse_mode(&rest[..space])?;
            rest = &rest[space + 1..];

            let nul = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| ParseError::malformed(ObjectKind::Tree, "missing name terminator"))?;
            if nul == 0 {
                return Err(ParseError::malformed(ObjectKind::Tree, "empty entry name"));
            }
            let name = &rest[..nul];
            rest = &rest[nul + 1..];

            if rest.len() < ObjectId::LEN {
                return Err(ParseError::malformed(ObjectKind::Tree, "truncated entry id"));
            }
            let id = ObjectId::from_slice(&rest[..ObjectId::LEN])?;
            rest = &rest[ObjectId::LEN..];

            entries.push(Entry::new(mode, name, id));
        }

        Ok(Self { entries })
    }

    /// Serialize to the canonical payload
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * 48);
        for entry in &self.entries {
            out.extend_from_slice(format!("{:o}", entry.mode).as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.id.as_bytes());
        }
        out
    }

    /// Compute the id of this tree
    pub fn id(&self) -> ObjectId {
        ObjectId::for_object(ObjectKind::Tree, &self.serialize())
    }
}

fn parse_mode(raw: &[u8]) -> Result<u32, ParseError> {
    if raw.is_empty() || raw.len() > 7 {
        return Err(ParseError::malformed(ObjectKind::Tree, "bad mode length"));
    }
    let mut mode = 0u32;
    for &c in raw {
        if !(b'0'..=b'7').contains(&c) {
            return Err(ParseError::malformed(ObjectKind::Tree, "non-octal mode"));
        }
        mode = (mode << 3) | u32::from(c - b'0');
    }
    Ok(mode)
}

/// Differences between two trees at a single level
#[derive(Debug, Clone, Default)]
pub struct TreeDiff {
    /// Entries added in new tree
    pub added: Vec<Entry>,
    /// Entries removed in new tree
    pub removed: Vec<Entry>,
    /// Entries modified in new tree (old, new)
    pub modified: Vec<(Entry, Entry)>,
}

impl TreeDiff {
    /// Compute the diff between two trees
    pub fn diff(old: &Tree, new: &Tree) -> Self {
        let mut diff = TreeDiff::default();

        for entry in &new.entries {
            match old.get(&entry.name) {
                None => diff.added.push(entry.clone()),
                Some(prev) if prev.id != entry.id || prev.mode != entry.mode => {
                    diff.modified.push((prev.clone(), entry.clone()))
                }
                Some(_) => {}
            }
        }
        for entry in &old.entries {
            if new.get(&entry.name).is_none() {
                diff.removed.push(entry.clone());
            }
        }

        diff
    }

    /// Check if the trees were identical
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}
