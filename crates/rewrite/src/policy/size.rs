//! Size-threshold pruning

use super::{BlobDecision, BlobInput, BlobPolicy};
use crate::reachability::ProtectedSet;
use scrub_core::ObjectId;
use std::sync::Arc;

/// Drops blobs strictly larger than a threshold unless protected
///
/// Protection is per blob identity: a protected blob is kept everywhere in
/// history.
pub struct SizePruner {
    threshold: u64,
    protected: Arc<ProtectedSet>,
}

impl SizePruner {
    pub fn new(threshold: u64, protected: Arc<ProtectedSet>) -> Self {
        Self {
            threshold,
            protected,
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn should_drop(&self, id: &ObjectId, size: u64) -> bool {
        size > self.threshold && !self.protected.contains(id)
    }
}

impl BlobPolicy for SizePruner {
    fn name(&self) -> &'static str {
        "size"
    }

    fn needs_content(&self) -> bool {
        false
    }

    fn apply(&self, blob: &BlobInput<'_>) -> BlobDecision {
        if self.should_drop(&blob.id, blob.size) {
            BlobDecision::Drop
        } else {
            BlobDecision::Keep
        }
    }
}

const PLACEHOLDER_SUFFIX: &[u8] = b".REMOVED.git-id";

/// Upper bound on a marker blob: 40 hex digits, a `u64` and two newlines
pub const PLACEHOLDER_MAX_LEN: u64 = 62;

/// Content of the marker blob left in place of a pruned one
pub fn placeholder_content(id: &ObjectId, size: u64) -> Vec<u8> {
    format!("{id}\n{size}\n").into_bytes()
}

/// Name of the marker entry for a pruned entry `name`
pub fn placeholder_name(name: &[u8]) -> Vec<u8> {
    let mut out = name.to_vec();
    out.extend_from_slice(PLACEHOLDER_SUFFIX);
    out
}

pub fn is_placeholder_name(name: &[u8]) -> bool {
    name.len() > PLACEHOLDER_SUFFIX.len() && name.ends_with(PLACEHOLDER_SUFFIX)
}

/// True for content shaped like [`placeholder_content`]
pub fn is_placeholder_content(content: &[u8]) -> bool {
    let Some(body) = content.strip_suffix(b"\n") else {
        return false;
    };
    let Some(newline) = memchr::memchr(b'\n', body) else {
        return false;
    };
    let (id, size) = (&body[..newline], &body[newline + 1..]);
    id.len() == 40
        && id.iter().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        && !size.is_empty()
        && size.iter().all(u8::is_ascii_digit)
}
