//! Scrub Core - Git object model and store abstractions for history rewriting
//!
//! This crate provides the foundational storage layer:
//! - SHA-1 object ids (Git-compatible)
//! - Blob, tree, commit and tag parsing with canonical serialization
//! - `ObjectStore` / `RefStore` traits
//! - In-memory and overlay (dry-run) stores

pub mod blob;
pub mod commit;
pub mod error;
pub mod hash;
pub mod store;
pub mod tree;

// Re-export main types for convenience
pub use blob::looks_binary;
pub use commit::{Commit, Signature, Tag};
pub use error::{ParseError, StoreError};
pub use hash::{ObjectId, ObjectKind};
pub use store::{MemoryStore, ObjectStore, OverlayStore, RawObject, RefStore, RefUpdate};
pub use tree::{Entry, EntryKind, Tree, TreeDiff};
