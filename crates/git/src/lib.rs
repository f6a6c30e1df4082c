//! Scrub Git - on-disk repositories behind the scrub store traits
//!
//! Objects go through the libgit2 object database, so loose and packed
//! objects are both readable and new objects are written loose. Ref updates
//! run in one libgit2 ref transaction.

pub mod error;
pub mod repo;

pub use error::GitError;
pub use repo::GitStore;
