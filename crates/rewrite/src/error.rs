//! Rewrite error taxonomy

use scrub_core::{ObjectId, StoreError};
use scrub_journal::JournalError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RewriteError {
    /// An object referenced by the graph cannot be resolved
    #[error("corrupt history: {context} ({id} cannot be resolved)")]
    CorruptHistory { id: ObjectId, context: String },

    #[error("invalid size threshold {input:?}: {reason}")]
    InvalidThreshold { input: String, reason: &'static str },

    #[error("invalid ref list entry {entry:?}: {reason}")]
    InvalidRefList { entry: String, reason: &'static str },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load findings from {}: {reason}", path.display())]
    InvalidFindings { path: PathBuf, reason: String },

    /// The object store failed while new objects were being written
    #[error("write failed while rewriting {id}; refs were left untouched")]
    PartialWriteDetected {
        id: ObjectId,
        #[source]
        source: StoreError,
    },

    /// A placeholder marker would overwrite an existing sibling entry
    #[error("placeholder {path} already exists in commit {commit}; use drop mode 'omit'")]
    PlaceholderCollision { path: String, commit: ObjectId },

    #[error("mapping for {id} already resolved to {existing}, refusing {attempted}")]
    MappingConflict {
        id: ObjectId,
        existing: String,
        attempted: String,
    },

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RewriteError {
    /// Map a read failure on `id` into the error the walk should surface
    ///
    /// Missing or undecodable objects are corruption; anything else is a
    /// backend failure.
    pub(crate) fn on_read(id: ObjectId, context: impl Into<String>) -> impl FnOnce(StoreError) -> Self {
        move |err| match err {
            StoreError::NotFound(missing) => RewriteError::CorruptHistory {
                id: missing,
                context: context.into(),
            },
            StoreError::Corrupt { .. } | StoreError::WrongKind { .. } => RewriteError::CorruptHistory {
                id,
                context: format!("{}: {err}", context.into()),
            },
            other => RewriteError::Store(other),
        }
    }

    /// Map a write failure while producing the image of `id`
    pub(crate) fn on_write(id: ObjectId) -> impl FnOnce(StoreError) -> Self {
        move |source| RewriteError::PartialWriteDetected { id, source }
    }
}
