//! The system model (version 1).
//!
//! Aggregates a set of evidence bundles into a single YAML artifact that
//! answers "what kind of system is this?". Two halves:
//!
//!   - Deterministic: inventory, boundaries, effects, concurrency domains,
//!     and the bundle-set hash recorded under `inputs`.
//!   - Inferred: state domains, trust zones, open questions (via the
//!     inference provider), plus the post-hoc effect → domain linkage.
//!
//! `generated_at` is the only environment-dependent value; everything else
//! is content-addressed, so a model is up to date exactly when its stored
//! bundle-set hash matches the live set.

pub mod aggregate;

use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::settings::DenyMatcher;

/// Model schema version produced by this crate.
pub const MODEL_VERSION: u32 = 1;

/// Default model file name under an analysis root.
pub const MODEL_FILE: &str = "system_model.yaml";

/// Root output artifact. Field order matches the YAML output order;
/// `transitions` is reserved and always serialized as an empty sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemModel {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub inputs: ModelInputs,
    #[serde(default)]
    pub inventory: Inventory,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state_domains: Vec<StateDomain>,
    #[serde(default)]
    pub boundaries: Boundaries,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trust_zones: Vec<TrustZone>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concurrency_domains: Vec<ConcurrencyDomain>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub open_questions: Vec<OpenQuestion>,
}

/// Provenance of the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelInputs {
    pub bundle_set_sha256: String,
}

/// All packages found in the analyzed root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<PackageEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoints: Vec<Entrypoint>,
}

/// One package in the inventory. `imports` lists intra-repo dependencies by
/// package name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_refs: Vec<String>,
}

/// A program entry point: package `main` with a `main` function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entrypoint {
    pub package: String,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_refs: Vec<String>,
}

/// An inferred cluster of logically related state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDomain {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<String>,
    pub aggregate: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub representations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_mutators: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_readers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_refs: Vec<String>,
    pub confidence: f64,
}

/// Side-effect boundary groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Boundaries {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub persistence: Vec<PersistenceBoundary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkBoundary>,
}

/// Storage kind for a persistence boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceKind {
    Db,
    Fs,
}

impl fmt::Display for PersistenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceKind::Db => write!(f, "db"),
            PersistenceKind::Fs => write!(f, "fs"),
        }
    }
}

/// A storage system used by the codebase and the files writing to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceBoundary {
    pub kind: PersistenceKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub writers: Vec<SymbolRef>,
}

/// Outbound network usage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkBoundary {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outbound: Vec<SymbolRef>,
}

/// Points at a source file, with evidence references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolRef {
    pub file: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_refs: Vec<String>,
}

/// Effect kinds, exactly these four. Variant order matches lexicographic
/// order of the serialized names, so the derived `Ord` is the sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    DbWrite,
    FsRead,
    FsWrite,
    NetCall,
}

impl EffectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectKind::DbWrite => "db_write",
            EffectKind::FsRead => "fs_read",
            EffectKind::FsWrite => "fs_write",
            EffectKind::NetCall => "net_call",
        }
    }

    /// Whether this effect mutates durable state.
    pub fn is_write(&self) -> bool {
        matches!(self, EffectKind::DbWrite | EffectKind::FsWrite)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A side effect observed at a file. `domain` is linked after inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Effect {
    pub kind: EffectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub via: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_refs: Vec<String>,
}

/// Reserved for call-graph-based state transitions (empty in v1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_refs: Vec<String>,
}

/// A group of packages at the same security boundary (inferred).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustZone {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_via: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_refs: Vec<String>,
}

/// A file with concurrent code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcurrencyDomain {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_refs: Vec<String>,
}

/// Something static analysis could not determine (inferred).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenQuestion {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_evidence: Vec<String>,
}

/// Marshal the model to YAML and write it to `path`. Overwriting is
/// permitted; the model is a replaceable derived artifact.
pub fn write(model: &SystemModel, path: &Path) -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(model).context("marshal system model")?;
    std::fs::write(path, yaml).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Read a system model from `path`. Unknown fields are tolerated.
pub fn read(path: &Path) -> anyhow::Result<SystemModel> {
    let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let model: SystemModel =
        serde_yaml::from_slice(&data).with_context(|| format!("unmarshal {}", path.display()))?;
    Ok(model)
}

/// Whether the model at `model_path` was generated from the bundle set
/// currently under `root`. A missing or unreadable model file is simply not
/// up to date (no error); an empty bundle set is never up to date.
pub fn up_to_date(root: &Path, model_path: &Path, deny: &DenyMatcher) -> anyhow::Result<bool> {
    let bundles = aggregate::load_bundles(root, deny)?;
    if bundles.is_empty() {
        return Ok(false);
    }
    let existing = match read(model_path) {
        Ok(model) => model,
        Err(_) => return Ok(false),
    };
    Ok(existing.inputs.bundle_set_sha256 == aggregate::bundle_set_hash(&bundles))
}
