//! Rewrite configuration and input validation
//!
//! Everything here runs before the object store is touched: a malformed
//! threshold or ref list aborts the run with nothing written.

use crate::error::RewriteError;
use crate::findings::SecretSet;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What happens to a tree entry whose blob is pruned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropMode {
    /// Remove the entry; directories left empty disappear as well
    #[default]
    Omit,
    /// Replace it with `<name>.REMOVED.git-id` holding the old id and size
    Placeholder,
}

impl FromStr for DropMode {
    type Err = RewriteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "omit" => Ok(DropMode::Omit),
            "placeholder" => Ok(DropMode::Placeholder),
            other => Err(RewriteError::InvalidConfig(format!(
                "unknown drop mode {other:?} (expected omit or placeholder)"
            ))),
        }
    }
}

impl std::fmt::Display for DropMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropMode::Omit => f.write_str("omit"),
            DropMode::Placeholder => f.write_str("placeholder"),
        }
    }
}

/// Commit and tag message redaction settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    /// Marker strings replaced verbatim
    pub literals: Vec<String>,
    /// Byte regular expressions replaced on match
    pub patterns: Vec<String>,
    /// Text substituted for each marker
    pub replacement: String,
    /// Also replace the secret literals from the findings
    pub redact_finding_literals: bool,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            literals: vec!["SECRET".to_string()],
            patterns: Vec::new(),
            replacement: "[REDACTED]".to_string(),
            redact_finding_literals: true,
        }
    }
}

/// Validated options for one rewrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Prune blobs strictly larger than this many bytes
    pub strip_blobs_bigger_than: Option<u64>,
    /// Refs whose reachable blobs are never pruned
    pub protected_refs: Vec<String>,
    /// Protect every ref instead of `protected_refs`
    pub protect_all_refs: bool,
    pub message: MessageConfig,
    pub drop_mode: DropMode,
    /// Keep old tips under `refs/scrub/original/`
    pub backup_refs: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            strip_blobs_bigger_than: None,
            protected_refs: vec!["HEAD".to_string()],
            protect_all_refs: false,
            message: MessageConfig::default(),
            drop_mode: DropMode::default(),
            backup_refs: false,
        }
    }
}

impl RewriteConfig {
    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<(), RewriteError> {
        for name in &self.protected_refs {
            check_ref_name(name)?;
        }
        for pattern in &self.message.patterns {
            regex::bytes::Regex::new(pattern).map_err(|e| {
                RewriteError::InvalidConfig(format!("bad message pattern {pattern:?}: {e}"))
            })?;
        }
        if self.message.literals.iter().any(|l| l.is_empty()) {
            return Err(RewriteError::InvalidConfig(
                "message literals must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Digest of every setting that affects the rewritten output
    ///
    /// A journal may only be resumed by a run with the same fingerprint.
    pub fn fingerprint(&self, secrets: &SecretSet) -> String {
        let mut hasher = blake3::Hasher::new();
        let mut field = |tag: &str, value: &[u8]| {
            hasher.update(tag.as_bytes());
            hasher.update(&(value.len() as u64).to_le_bytes());
            hasher.update(value);
        };

        for literal in secrets.literals() {
            field("secret", literal);
        }
        let threshold = self
            .strip_blobs_bigger_than
            .map(|t| t.to_string())
            .unwrap_or_default();
        field("threshold", threshold.as_bytes());
        if self.protect_all_refs {
            field("protect-all", b"1");
        } else {
            let mut refs = self.protected_refs.clone();
            refs.sort();
            for name in &refs {
                field("protect", name.as_bytes());
            }
        }
        for literal in &self.message.literals {
            field("msg-literal", literal.as_bytes());
        }
        for pattern in &self.message.patterns {
            field("msg-pattern", pattern.as_bytes());
        }
        field("msg-replacement", self.message.replacement.as_bytes());
        field(
            "msg-findings",
            if self.message.redact_finding_literals { b"1" } else { b"0" },
        );
        field("drop-mode", self.drop_mode.to_string().as_bytes());

        hasher.finalize().to_hex().to_string()
    }
}

/// Parse a byte threshold: a non-negative integer with an optional `K`, `M`
/// or `G` suffix (powers of 1024)
pub fn parse_threshold(input: &str) -> Result<u64, RewriteError> {
    let invalid = |reason| RewriteError::InvalidThreshold {
        input: input.to_string(),
        reason,
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty value"));
    }

    let (digits, multiplier) = match trimmed.as_bytes()[trimmed.len() - 1] {
        b'k' | b'K' => (&trimmed[..trimmed.len() - 1], 1u64 << 10),
        b'm' | b'M' => (&trimmed[..trimmed.len() - 1], 1u64 << 20),
        b'g' | b'G' => (&trimmed[..trimmed.len() - 1], 1u64 << 30),
        _ => (trimmed, 1),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("expected a non-negative integer with optional K, M or G suffix"));
    }

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| invalid("value does not fit in 64 bits"))
}

/// Parse a comma-separated ref list
pub fn parse_ref_list(input: &str) -> Result<Vec<String>, RewriteError> {
    let refs = input
        .split(',')
        .map(|entry| {
            let name = entry.trim();
            check_ref_name(name)?;
            Ok(name.to_string())
        })
        .collect::<Result<Vec<_>, RewriteError>>()?;

    let mut unique = Vec::with_capacity(refs.len());
    for name in refs {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }
    Ok(unique)
}

/// Reject names Git would not accept as a ref or revision name
pub fn check_ref_name(name: &str) -> Result<(), RewriteError> {
    let invalid = |reason| RewriteError::InvalidRefList {
        entry: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("empty entry"));
    }
    if name.starts_with('-') {
        return Err(invalid("must not start with '-'"));
    }
    if name.chars().any(|c| c.is_whitespace()) {
        return Err(invalid("contains whitespace"));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(invalid("contains a control character"));
    }
    if name.chars().any(|c| matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\')) {
        return Err(invalid("contains one of ~ ^ : ? * [ \\"));
    }
    if name.contains("..") {
        return Err(invalid("contains '..'"));
    }
    if name.contains("@{") {
        return Err(invalid("contains '@{'"));
    }
    if name.contains("//") || name.ends_with('/') || name.ends_with('.') || name.ends_with(".lock") {
        return Err(invalid("malformed path component"));
    }
    Ok(())
}
