//! Git adapter errors

use scrub_core::{ObjectId, ObjectKind, StoreError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("cannot open git repository at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },
}

/// Read failures: a missing object keeps its id so the rewriter can report it
pub(crate) fn read_error(id: ObjectId) -> impl FnOnce(git2::Error) -> StoreError {
    move |err| match err.code() {
        git2::ErrorCode::NotFound => StoreError::NotFound(id),
        _ => StoreError::Backend(format!("reading {id}: {}", err.message())),
    }
}

pub(crate) fn write_error(kind: ObjectKind) -> impl FnOnce(git2::Error) -> StoreError {
    move |err| StoreError::Write {
        kind,
        reason: err.message().to_string(),
    }
}

pub(crate) fn backend(context: &str) -> impl FnOnce(git2::Error) -> StoreError + '_ {
    move |err| StoreError::Backend(format!("{context}: {}", err.message()))
}
