//! Line redaction: drop every line that contains a known secret literal

use super::{BlobDecision, BlobInput, BlobPolicy, RemovedLine};
use memchr::memmem::Finder;

/// Removes whole lines containing any of a fixed set of literals
///
/// Lines keep their exact terminators (`\n`, `\r\n`, or none on the last
/// line), so everything that survives is byte-identical.
pub struct LineRedactor {
    finders: Vec<Finder<'static>>,
}

impl LineRedactor {
    /// Build from literal byte strings; empty literals are ignored
    pub fn new(literals: &[Vec<u8>]) -> Self {
        let finders = literals
            .iter()
            .filter(|l| !l.is_empty())
            .map(|l| Finder::new(l.as_slice()).into_owned())
            .collect();
        Self { finders }
    }

    pub fn is_empty(&self) -> bool {
        self.finders.is_empty()
    }

    /// Index of the first literal found in `haystack`
    fn first_match(&self, haystack: &[u8]) -> Option<usize> {
        self.finders
            .iter()
            .position(|finder| finder.find(haystack).is_some())
    }

    /// Redact `content`, or `None` if no literal occurs in it
    pub fn redact(&self, content: &[u8]) -> Option<(Vec<u8>, Vec<RemovedLine>)> {
        // Whole-blob check first: most blobs contain no secret at all
        self.first_match(content)?;

        let mut out = Vec::with_capacity(content.len());
        let mut removed = Vec::new();
        for (index, line) in split_lines_inclusive(content).enumerate() {
            match self.first_match(line) {
                Some(secret) => removed.push(RemovedLine {
                    line: index as u64 + 1,
                    secret,
                }),
                None => out.extend_from_slice(line),
            }
        }
        // A literal spanning a line break matches no single line
        if removed.is_empty() {
            return None;
        }
        Some((out, removed))
    }
}

impl BlobPolicy for LineRedactor {
    fn name(&self) -> &'static str {
        "lines"
    }

    fn needs_content(&self) -> bool {
        true
    }

    fn apply(&self, blob: &BlobInput<'_>) -> BlobDecision {
        let Some(content) = blob.content else {
            return BlobDecision::Keep;
        };
        match self.redact(content) {
            Some((content, removed)) => BlobDecision::Rewrite { content, removed },
            None => BlobDecision::Keep,
        }
    }
}

/// Split into lines, each including its `\n`
fn split_lines_inclusive(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = data;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let end = memchr::memchr(b'\n', rest).map_or(rest.len(), |i| i + 1);
        let (line, tail) = rest.split_at(end);
        rest = tail;
        Some(line)
    })
}
