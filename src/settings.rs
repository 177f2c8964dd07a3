//! Workspace settings and the deny matcher.
//!
//! Settings are read from `.iguana/settings.yaml` under the analysis root.
//! The only consumer-facing knob is `permissions.deny`: a list of glob
//! patterns for paths the analyzer must not read. Patterns may be written as
//! bare globs (`baml_client/**`) or wrapped in a `Read(...)` capability verb
//! (`Read(./baml_client/**)`).
//!
//! A missing settings file is not an error and yields a matcher that denies
//! nothing. An unparseable settings file is fatal to model generation.

use std::fs;
use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading workspace settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
}

/// Workspace configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub permissions: Permissions,
}

/// Permission rules controlling which files the analyzer reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Permissions {
    /// Glob patterns for paths that must not be read.
    /// Example: `["Read(./baml_client/**)"]`
    #[serde(default)]
    pub deny: Vec<String>,
}

impl Settings {
    /// Load `.iguana/settings.yaml` relative to `root`.
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load(root: &Path) -> Result<Option<Settings>, SettingsError> {
        let path = root.join(".iguana").join("settings.yaml");
        let data = match fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SettingsError::Read {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };
        let settings: Settings = serde_yaml::from_str(&data).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(Some(settings))
    }
}

/// A compiled deny rule.
///
/// `prefix/**` denies the prefix directory itself and everything rooted at
/// it. Every other pattern uses single-segment glob semantics: `*` does not
/// cross `/`.
enum DenyRule {
    Prefix(String),
    Glob(GlobMatcher),
}

/// Compiled deny list applied to root-relative forward-slash paths.
pub struct DenyMatcher {
    rules: Vec<DenyRule>,
}

impl DenyMatcher {
    /// A matcher that denies nothing.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Compile a matcher from optional settings. `None` denies nothing.
    /// Invalid glob patterns are skipped.
    pub fn from_settings(settings: Option<&Settings>) -> Self {
        let Some(settings) = settings else {
            return Self::empty();
        };
        let rules = settings
            .permissions
            .deny
            .iter()
            .filter_map(|rule| compile_deny_rule(rule))
            .collect();
        Self { rules }
    }

    /// Report whether `rel_path` (forward-slash, relative to the analysis
    /// root) matches any deny rule.
    pub fn is_denied(&self, rel_path: &str) -> bool {
        self.rules.iter().any(|rule| match rule {
            DenyRule::Prefix(prefix) => {
                rel_path == prefix || rel_path.starts_with(&format!("{}/", prefix))
            }
            DenyRule::Glob(matcher) => matcher.is_match(rel_path),
        })
    }
}

/// Extract the path glob from a deny rule and compile it.
///
///   `Read(./baml_client/**)` → `baml_client/**`
///   `baml_client/**`         → `baml_client/**`
fn compile_deny_rule(rule: &str) -> Option<DenyRule> {
    let mut pattern = rule;
    if let Some(inner) = pattern.strip_prefix("Read(").and_then(|r| r.strip_suffix(')')) {
        pattern = inner;
    }
    pattern = pattern.strip_prefix("./").unwrap_or(pattern);

    if let Some(prefix) = pattern.strip_suffix("/**") {
        return Some(DenyRule::Prefix(prefix.to_string()));
    }
    // Single-segment semantics: * must not cross path separators.
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .ok()
        .map(|g| DenyRule::Glob(g.compile_matcher()))
}
