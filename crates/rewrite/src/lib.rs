//! History rewriting engine
//!
//! This crate provides:
//! - Findings input and the secret literal set
//! - Configuration parsing and validation
//! - The commit graph walker and blob reachability analysis
//! - Line redaction, size pruning and message redaction policies
//! - The single-pass history rewriter, with resume and dry runs

pub mod config;
pub mod error;
pub mod findings;
pub mod mapping;
pub mod plan;
pub mod policy;
pub mod reachability;
pub mod rewriter;
pub mod walker;

// Re-exports
pub use config::{parse_ref_list, parse_threshold, DropMode, MessageConfig, RewriteConfig};
pub use error::RewriteError;
pub use findings::{load_findings, parse_findings, Finding, SecretSet};
pub use mapping::{RewriteMapping, TreeImage};
pub use plan::{dry_run, DryRun};
pub use policy::{BlobDecision, BlobInput, BlobPolicy, LineRedactor, MessageRedactor, SizePruner};
pub use reachability::ProtectedSet;
pub use rewriter::{CancelToken, HistoryRewriter, RewriteOutcome, RewriteReport};
pub use walker::{WalkPlan, WalkedRef, Walker};
