//! Scanner findings and the secret literal set derived from them

use crate::error::RewriteError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One reported occurrence of a secret
///
/// Accepts both the neutral field names and the gitleaks report names
/// (`Commit`, `File`, `StartLine`, `Secret`, `RuleID`). Unknown fields are
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default, alias = "Commit")]
    pub commit_hint: Option<String>,
    #[serde(default, alias = "File")]
    pub file_path: Option<String>,
    /// Line in the reported blob version; a hint only
    #[serde(default, alias = "StartLine")]
    pub line_number: Option<u64>,
    #[serde(alias = "Secret")]
    pub secret_literal: String,
    #[serde(default, alias = "RuleID")]
    pub rule: Option<String>,
}

/// Parse a findings report: a JSON array, or one JSON object per line
pub fn parse_findings(text: &str) -> Result<Vec<Finding>, serde_json::Error> {
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed);
    }
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect()
}

/// Read and parse a findings report from disk
pub fn load_findings(path: &Path) -> Result<Vec<Finding>, RewriteError> {
    let invalid = |reason: String| RewriteError::InvalidFindings {
        path: path.to_path_buf(),
        reason,
    };
    let text = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let findings = parse_findings(&text).map_err(|e| invalid(e.to_string()))?;
    tracing::debug!(path = %path.display(), count = findings.len(), "loaded findings");
    Ok(findings)
}

/// Distinct secret literals, sorted, with the findings that reported each
#[derive(Debug, Clone, Default)]
pub struct SecretSet {
    literals: Vec<Vec<u8>>,
    /// For each literal, indexes into `findings`
    sources: Vec<Vec<usize>>,
    findings: Vec<Finding>,
}

impl SecretSet {
    pub fn from_findings(findings: Vec<Finding>) -> Self {
        let mut literals: Vec<Vec<u8>> = findings
            .iter()
            .map(|f| f.secret_literal.as_bytes().to_vec())
            .filter(|l| !l.is_empty())
            .collect();
        literals.sort();
        literals.dedup();

        let skipped = findings.iter().filter(|f| f.secret_literal.is_empty()).count();
        if skipped > 0 {
            tracing::warn!(skipped, "ignoring findings with an empty secret");
        }

        let mut sources = vec![Vec::new(); literals.len()];
        for (index, finding) in findings.iter().enumerate() {
            if let Ok(pos) = literals.binary_search_by(|l| l.as_slice().cmp(finding.secret_literal.as_bytes())) {
                sources[pos].push(index);
            }
        }

        Self {
            literals,
            sources,
            findings,
        }
    }

    /// Build from bare literals with no finding metadata
    pub fn from_literals<I, T>(literals: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let findings = literals
            .into_iter()
            .map(|literal| Finding {
                commit_hint: None,
                file_path: None,
                line_number: None,
                secret_literal: literal.as_ref().to_string(),
                rule: None,
            })
            .collect();
        Self::from_findings(findings)
    }

    /// Sorted distinct literals
    pub fn literals(&self) -> &[Vec<u8>] {
        &self.literals
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// The finding that best explains literal `index` matching at `path`:
    /// one reported for the same file if any, otherwise the first
    pub fn attribution(&self, index: usize, path: &str) -> Option<&Finding> {
        let sources = self.sources.get(index)?;
        sources
            .iter()
            .map(|&i| &self.findings[i])
            .find(|f| f.file_path.as_deref() == Some(path))
            .or_else(|| sources.first().map(|&i| &self.findings[i]))
    }
}
