//! Run journal for history rewrites
//!
//! This crate provides:
//! - The `ProgressTracker` contract used by the rewriter
//! - An in-memory tracker for dry runs and tests
//! - A durable journal (sled embedded DB) supporting resume
//! - Audit records, run statistics and their JSON exports

pub mod audit;
pub mod error;
pub mod export;
pub mod journal;
pub mod stats;
pub mod tracker;

// Re-exports
pub use audit::{AuditRecord, MutationKind};
pub use error::JournalError;
pub use export::{write_audit_jsonl, write_stats_json, StatsReport};
pub use journal::{Journal, JournalStatus, DEFAULT_FLUSH_INTERVAL};
pub use stats::{RunCounters, RunStatistics};
pub use tracker::{BlobOutcome, CommitRecord, MemoryTracker, ProgressTracker, ResumeState, RunStatus};
