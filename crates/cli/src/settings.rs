//! `.scrub.toml` settings
//!
//! The file is optional. Values from it are overlaid by command-line flags
//! and then validated into a `RewriteConfig` before the repository is
//! touched.

use crate::RewriteArgs;
use scrub_rewrite::{
    load_findings, parse_ref_list, parse_threshold, DropMode, MessageConfig, RewriteConfig,
    RewriteError, SecretSet,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default settings file name, looked up in the work tree root
pub const SETTINGS_FILE: &str = ".scrub.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}

/// A threshold written either as a number or as a suffixed string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeSetting {
    Bytes(u64),
    Text(String),
}

impl SizeSetting {
    fn to_bytes(&self) -> Result<u64, RewriteError> {
        match self {
            SizeSetting::Bytes(n) => Ok(*n),
            SizeSetting::Text(text) => parse_threshold(text),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FindingsSection {
    /// Scanner report, relative to the settings file
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PruneSection {
    pub strip_blobs_bigger_than: Option<SizeSetting>,
    /// Comma-separated ref list
    pub protected_refs: String,
    pub protect_all_refs: bool,
    pub drop_mode: DropMode,
}

impl Default for PruneSection {
    fn default() -> Self {
        Self {
            strip_blobs_bigger_than: None,
            protected_refs: "HEAD".to_string(),
            protect_all_refs: false,
            drop_mode: DropMode::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    pub backup_refs: bool,
    /// Where `stats.json` and `audit.jsonl` go (default: next to the journal)
    pub dir: Option<PathBuf>,
}

/// Parsed settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub findings: FindingsSection,
    pub prune: PruneSection,
    pub message: MessageConfig,
    pub output: OutputSection,
    /// Directory relative paths in the file are resolved against
    #[serde(skip)]
    base_dir: PathBuf,
}

/// Locate the settings file: an explicit path, else `.scrub.toml` in `root`
pub fn settings_path(explicit: Option<&Path>, root: &Path) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => root.join(SETTINGS_FILE),
    }
}

/// Load settings; a missing default file yields the defaults
///
/// An explicitly named file must exist.
pub fn load(explicit: Option<&Path>, root: &Path) -> Result<Settings, SettingsError> {
    let path = settings_path(explicit, root);
    if explicit.is_none() && !path.exists() {
        tracing::debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(Settings {
            base_dir: root.to_path_buf(),
            ..Settings::default()
        });
    }

    let text = std::fs::read_to_string(&path).map_err(|source| SettingsError::Read {
        path: path.clone(),
        source,
    })?;
    let mut settings = parse(&text).map_err(|source| SettingsError::Parse {
        path: path.clone(),
        source,
    })?;
    settings.base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    tracing::debug!(path = %path.display(), "loaded settings");
    Ok(settings)
}

pub fn parse(text: &str) -> Result<Settings, toml::de::Error> {
    toml::from_str(text)
}

impl Settings {
    /// Apply command-line overrides
    pub fn overlay(&mut self, args: &RewriteArgs, cwd: &Path) {
        if let Some(path) = &args.findings {
            self.findings.path = Some(cwd.join(path));
        }
        if let Some(size) = &args.strip_blobs_bigger_than {
            self.prune.strip_blobs_bigger_than = Some(SizeSetting::Text(size.clone()));
        }
        if let Some(refs) = &args.protect {
            self.prune.protected_refs = refs.clone();
        }
        if args.protect_all {
            self.prune.protect_all_refs = true;
        }
        self.message
            .literals
            .extend(args.message_literals.iter().cloned());
        if args.backup_refs {
            self.output.backup_refs = true;
        }
    }

    /// Validated rewrite options
    ///
    /// `drop_mode` is taken from `mode_override` when given, so a bad
    /// command-line value fails here with the rest.
    pub fn rewrite_config(&self, mode_override: Option<&str>) -> Result<RewriteConfig, SettingsError> {
        let strip_blobs_bigger_than = self
            .prune
            .strip_blobs_bigger_than
            .as_ref()
            .map(SizeSetting::to_bytes)
            .transpose()?;
        let drop_mode = match mode_override {
            Some(mode) => mode.parse()?,
            None => self.prune.drop_mode,
        };

        let config = RewriteConfig {
            strip_blobs_bigger_than,
            protected_refs: parse_ref_list(&self.prune.protected_refs)?,
            protect_all_refs: self.prune.protect_all_refs,
            message: self.message.clone(),
            drop_mode,
            backup_refs: self.output.backup_refs,
        };
        config.validate()?;
        Ok(config)
    }

    /// Secrets from the findings report; none when no report is configured
    pub fn secrets(&self) -> Result<SecretSet, SettingsError> {
        match self.findings_path() {
            Some(path) => Ok(SecretSet::from_findings(load_findings(&path)?)),
            None => {
                tracing::warn!("no findings report configured, only pruning and message rules apply");
                Ok(SecretSet::default())
            }
        }
    }

    pub fn findings_path(&self) -> Option<PathBuf> {
        self.findings.path.as_ref().map(|p| self.base_dir.join(p))
    }

    /// Directory for `stats.json` and `audit.jsonl`
    pub fn output_dir(&self, scrub_dir: &Path) -> PathBuf {
        match &self.output.dir {
            Some(dir) => self.base_dir.join(dir),
            None => scrub_dir.to_path_buf(),
        }
    }
}

/// Commented example settings file
pub fn example() -> &'static str {
    r#"# .scrub.toml

[findings]
# gitleaks report or neutral findings JSON
path = "gitleaks-report.json"

[prune]
# bytes, or with a K/M/G suffix
strip_blobs_bigger_than = "10M"
protected_refs = "HEAD"
protect_all_refs = false
# omit | placeholder
drop_mode = "omit"

[message]
literals = ["SECRET"]
patterns = []
replacement = "[REDACTED]"
redact_finding_literals = true

[output]
backup_refs = false
# dir = "scrub-output"
"#
}
