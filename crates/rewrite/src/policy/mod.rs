//! Blob and message policies
//!
//! Policies are pure: they decide, the rewriter writes objects and records
//! the outcome. That keeps each one testable without a history to walk.

pub mod lines;
pub mod message;
pub mod size;

pub use lines::LineRedactor;
pub use message::MessageRedactor;
pub use size::SizePruner;

use scrub_core::ObjectId;

/// A blob as seen by a policy
#[derive(Debug, Clone, Copy)]
pub struct BlobInput<'a> {
    pub id: ObjectId,
    pub size: u64,
    /// Present when any policy in the chain asked for content
    pub content: Option<&'a [u8]>,
}

/// A line taken out of a blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovedLine {
    /// 1-based line number in the original content
    pub line: u64,
    /// Index of the first matching literal in the secret set
    pub secret: usize,
}

/// What a policy wants done with a blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobDecision {
    Keep,
    Drop,
    Rewrite {
        content: Vec<u8>,
        removed: Vec<RemovedLine>,
    },
}

impl BlobDecision {
    pub fn is_keep(&self) -> bool {
        matches!(self, BlobDecision::Keep)
    }
}

/// Per-blob policy
pub trait BlobPolicy: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Whether `apply` reads `BlobInput::content`
    fn needs_content(&self) -> bool;

    /// Decide what to do with one blob
    fn apply(&self, blob: &BlobInput<'_>) -> BlobDecision;
}

/// Ordered policies; the first one that does not keep a blob decides
#[derive(Default)]
pub struct PolicyChain {
    policies: Vec<Box<dyn BlobPolicy>>,
}

impl PolicyChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, policy: impl BlobPolicy + 'static) {
        self.policies.push(Box::new(policy));
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.policies.iter().map(|p| p.name()).collect()
    }

    /// Run the chain, loading content lazily with `load`
    ///
    /// A blob gets at most one outcome.
    pub fn evaluate<E>(
        &self,
        id: ObjectId,
        size: u64,
        load: impl FnOnce() -> Result<bytes::Bytes, E>,
    ) -> Result<BlobDecision, E> {
        let mut load = Some(load);
        let mut content: Option<bytes::Bytes> = None;

        for policy in &self.policies {
            if policy.needs_content() && content.is_none() {
                if let Some(load) = load.take() {
                    content = Some(load()?);
                }
            }
            let input = BlobInput {
                id,
                size,
                content: content.as_deref(),
            };
            let decision = policy.apply(&input);
            if !decision.is_keep() {
                tracing::trace!(blob = %id, policy = policy.name(), "policy decided");
                return Ok(decision);
            }
        }
        Ok(BlobDecision::Keep)
    }
}
