//! Error types for object parsing and storage

use crate::hash::{ObjectId, ObjectKind};
use thiserror::Error;

/// Errors raised while decoding object payloads
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("object id must be 20 bytes, got {found}")]
    InvalidIdLength { found: usize },

    #[error("invalid hex object id: {0}")]
    InvalidHex(String),

    #[error("malformed {kind} object: {detail}")]
    Malformed { kind: ObjectKind, detail: String },
}

impl ParseError {
    pub(crate) fn malformed(kind: ObjectKind, detail: impl Into<String>) -> Self {
        ParseError::Malformed {
            kind,
            detail: detail.into(),
        }
    }
}

/// Errors raised by object and ref stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object {0} not found")]
    NotFound(ObjectId),

    #[error("object {id} is a {found}, expected {expected}")]
    WrongKind {
        id: ObjectId,
        expected: ObjectKind,
        found: ObjectKind,
    },

    #[error("object {id} is corrupt: {source}")]
    Corrupt {
        id: ObjectId,
        #[source]
        source: ParseError,
    },

    #[error("failed to write {kind} object: {reason}")]
    Write { kind: ObjectKind, reason: String },

    #[error("ref update failed: {0}")]
    RefUpdate(String),

    #[error("store backend error: {0}")]
    Backend(String),
}
