//! Journal error type

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal database error: {0}")]
    Db(#[from] sled::Error),

    #[error("journal record encoding error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("journal export error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal export encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "journal belongs to a run with a different configuration \
         (journal {found}, current {expected}); start a fresh run to discard it"
    )]
    FingerprintMismatch { expected: String, found: String },

    #[error("journal is corrupt: {0}")]
    Corrupt(String),
}
