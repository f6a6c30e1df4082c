//! Rewrite integration tests
//!
//! End-to-end runs of the history rewriter over in-memory repositories.

pub mod plan;
pub mod properties;
pub mod resume;
pub mod scenarios;
