//! Audit records: one per content mutation, in processing order

use scrub_core::ObjectId;
use serde::{Deserialize, Serialize};

/// What a mutation did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// A line containing a known secret was removed from a blob
    LineRemoved,
    /// A blob over the size threshold was pruned
    BlobDropped,
    /// A commit or tag message had markers replaced
    MessageRedacted,
    /// An annotated tag was re-created over a rewritten target
    TagRewritten,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MutationKind::LineRemoved => "line-removed",
            MutationKind::BlobDropped => "blob-dropped",
            MutationKind::MessageRedacted => "message-redacted",
            MutationKind::TagRewritten => "tag-rewritten",
        };
        f.write_str(name)
    }
}

/// A single audited mutation
///
/// Never carries the secret value itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Position in the audit log, assigned by the tracker
    pub seq: u64,
    pub kind: MutationKind,
    /// Original commit (or tag object) being processed when the mutation
    /// happened
    pub commit: ObjectId,
    /// Path of the blob within that commit's tree
    pub path: Option<String>,
    /// 1-based line number in that blob version
    pub line: Option<u64>,
    /// Original blob
    pub blob: Option<ObjectId>,
    /// Replacement blob, if any
    pub new_blob: Option<ObjectId>,
    /// Size in bytes of the original blob
    pub size: Option<u64>,
    /// Commit the scanner reported for the matching finding
    pub finding_commit: Option<String>,
    /// Scanner rule behind the matching finding
    pub rule: Option<String>,
}

impl AuditRecord {
    fn base(kind: MutationKind, commit: ObjectId) -> Self {
        Self {
            seq: 0,
            kind,
            commit,
            path: None,
            line: None,
            blob: None,
            new_blob: None,
            size: None,
            finding_commit: None,
            rule: None,
        }
    }

    /// A removed line
    pub fn line_removed(
        commit: ObjectId,
        path: &str,
        line: u64,
        blob: ObjectId,
        new_blob: ObjectId,
    ) -> Self {
        Self {
            path: Some(path.to_string()),
            line: Some(line),
            blob: Some(blob),
            new_blob: Some(new_blob),
            ..Self::base(MutationKind::LineRemoved, commit)
        }
    }

    /// A pruned blob; `placeholder` is the replacement blob if one was left
    pub fn blob_dropped(
        commit: ObjectId,
        path: &str,
        blob: ObjectId,
        size: u64,
        placeholder: Option<ObjectId>,
    ) -> Self {
        Self {
            path: Some(path.to_string()),
            blob: Some(blob),
            new_blob: placeholder,
            size: Some(size),
            ..Self::base(MutationKind::BlobDropped, commit)
        }
    }

    /// A redacted message
    pub fn message_redacted(commit: ObjectId) -> Self {
        Self::base(MutationKind::MessageRedacted, commit)
    }

    /// A re-created annotated tag
    pub fn tag_rewritten(tag: ObjectId, new_tag: ObjectId, name: &str) -> Self {
        Self {
            path: Some(name.to_string()),
            new_blob: Some(new_tag),
            ..Self::base(MutationKind::TagRewritten, tag)
        }
    }

    /// Attach the scanner finding that explains this mutation
    pub fn with_finding(mut self, commit: Option<String>, rule: Option<String>) -> Self {
        self.finding_commit = commit;
        self.rule = rule;
        self
    }
}
