//! Commit and tag message redaction

use crate::config::MessageConfig;
use crate::error::RewriteError;
use memchr::memmem::Finder;
use regex::bytes::{NoExpand, Regex};
use std::borrow::Cow;

/// Replaces sensitive markers in message text
pub struct MessageRedactor {
    literals: Vec<Finder<'static>>,
    patterns: Vec<Regex>,
    replacement: Vec<u8>,
}

impl MessageRedactor {
    /// Build from configuration plus extra literals (the secret set)
    ///
    /// Fails if the replacement would itself be redacted again.
    pub fn new(config: &MessageConfig, extra_literals: &[Vec<u8>]) -> Result<Self, RewriteError> {
        let mut literals: Vec<Vec<u8>> = config
            .literals
            .iter()
            .map(|l| l.as_bytes().to_vec())
            .chain(extra_literals.iter().cloned())
            .filter(|l| !l.is_empty())
            .collect();
        // Longest first so a literal containing another is replaced whole
        literals.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        literals.dedup();

        let patterns = config
            .patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| RewriteError::InvalidConfig(format!("bad message pattern {p:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let replacement = config.replacement.as_bytes().to_vec();
        let redactor = Self {
            literals: literals
                .iter()
                .map(|l| Finder::new(l.as_slice()).into_owned())
                .collect(),
            patterns,
            replacement,
        };

        if redactor.matches(&redactor.replacement) {
            return Err(RewriteError::InvalidConfig(format!(
                "message replacement {:?} matches a marker and would never settle",
                config.replacement
            )));
        }
        Ok(redactor)
    }

    /// True if any marker occurs in `text`
    pub fn matches(&self, text: &[u8]) -> bool {
        self.literals.iter().any(|f| f.find(text).is_some())
            || self.patterns.iter().any(|p| p.is_match(text))
    }

    /// Redact a message, reporting whether anything changed
    pub fn redact<'a>(&self, message: &'a [u8]) -> (Cow<'a, [u8]>, bool) {
        if !self.matches(message) {
            return (Cow::Borrowed(message), false);
        }

        let mut text = message.to_vec();
        for finder in &self.literals {
            text = replace_all(&text, finder, &self.replacement);
        }
        for pattern in &self.patterns {
            text = pattern
                .replace_all(&text, NoExpand(&self.replacement[..]))
                .into_owned();
        }

        let changed = text != message;
        (Cow::Owned(text), changed)
    }
}

fn replace_all(haystack: &[u8], finder: &Finder<'_>, replacement: &[u8]) -> Vec<u8> {
    let needle_len = finder.needle().len();
    let mut out = Vec::with_capacity(haystack.len());
    let mut last = 0;
    for start in finder.find_iter(haystack) {
        out.extend_from_slice(&haystack[last..start]);
        out.extend_from_slice(replacement);
        last = start + needle_len;
    }
    out.extend_from_slice(&haystack[last..]);
    out
}
