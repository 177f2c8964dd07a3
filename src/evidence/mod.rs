//! Evidence bundles (version 2).
//!
//! An evidence bundle is the per-file deterministic analysis artifact:
//!
//!   file     — root-relative path and SHA-256 of the source bytes
//!   package  — package name and sorted import list
//!   symbols  — all top-level declarations, plus derived constructors
//!   calls    — deduplicated, sorted outbound call graph for the file
//!   signals  — the seven boolean behavioural heuristics
//!
//! Serialized form is YAML with the struct field order below. Empty
//! sequences are omitted; `signals` is always present with all seven fields.
//! No position data (line/column/offset) and no timestamps ever appear.

mod builder;
mod store;
mod walker;

pub use builder::build;
pub use store::{companion_path, read, validate, write, WriteOutcome};
pub use walker::{analyze_file, WalkReport, Walker};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::ParseError;

/// Bundle schema version produced by this crate.
pub const BUNDLE_VERSION: u32 = 2;

/// Suffix appended to a source path to form its companion bundle path.
pub const COMPANION_SUFFIX: &str = ".evidence.yaml";

/// Errors raised by per-file evidence operations. Walks accumulate these
/// per file so one bad file does not stop the others.
#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("decode {path}: {message}")]
    Decode { path: String, message: String },
    #[error("evidence bundle is stale: {path} hash changed (stored {stored}, current {current})")]
    Stale {
        path: String,
        stored: String,
        current: String,
    },
    #[error("write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Top-level container for a v2 evidence bundle. Field order matches the
/// YAML output order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub file: FileMeta,
    #[serde(default)]
    pub package: PackageMeta,
    #[serde(default)]
    pub symbols: Symbols,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<Call>,
    #[serde(default)]
    pub signals: Signals,
}

/// Source file identity: root-relative forward-slash path plus content hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub path: String,
    pub sha256: String,
}

/// Package name and sorted import list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<Import>,
}

/// A single import statement. The alias is omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// All top-level declarations in the file, each sequence sorted by name.
/// `constructors` lists the non-method functions returning a type declared
/// in the same file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Symbols {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<Function>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<TypeDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VarDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constants: Vec<VarDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constructors: Vec<String>,
}

/// A top-level function or method declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub exported: bool,
    /// Non-empty for methods (rendered receiver type, e.g. `*Config`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub returns: Vec<String>,
}

/// Kind of a top-level type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Struct,
    Interface,
    Alias,
}

/// A top-level type declaration. Struct fields are recorded in declaration
/// order (not name order); unexported fields are excluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub kind: TypeKind,
    pub exported: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
}

/// One exported struct field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub type_str: String,
}

/// A top-level variable or constant declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub exported: bool,
}

/// A single deduplicated outbound call edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Enclosing function (`<receiver>.<name>` for methods, `F.<anonymous>`
    /// for a function literal inside `F`, `<global>` at file scope).
    pub from: String,
    /// Qualified call target.
    pub to: String,
}

/// The seven boolean behavioural heuristics. Purely syntactic; adding code
/// can only flip a signal from false to true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals {
    pub fs_reads: bool,
    pub fs_writes: bool,
    pub db_calls: bool,
    pub net_calls: bool,
    pub concurrency: bool,
    pub yaml_io: bool,
    pub json_io: bool,
}

/// Serialize a bundle as YAML with the fixed field order.
pub fn encode(bundle: &EvidenceBundle) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(bundle)
}

/// Deserialize a bundle from YAML. Unknown fields are tolerated for forward
/// compatibility.
pub fn decode(data: &[u8]) -> Result<EvidenceBundle, serde_yaml::Error> {
    serde_yaml::from_slice(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bundle() -> EvidenceBundle {
        EvidenceBundle {
            version: BUNDLE_VERSION,
            file: FileMeta {
                path: "store/db.go".to_string(),
                sha256: "a".repeat(64),
            },
            package: PackageMeta {
                name: "store".to_string(),
                imports: vec![Import {
                    path: "database/sql".to_string(),
                    alias: None,
                }],
            },
            symbols: Symbols {
                functions: vec![Function {
                    name: "Save".to_string(),
                    exported: true,
                    receiver: None,
                    params: vec![],
                    returns: vec!["error".to_string()],
                }],
                ..Default::default()
            },
            calls: vec![Call {
                from: "Save".to_string(),
                to: "sql.Open".to_string(),
            }],
            signals: Signals {
                db_calls: true,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let bundle = sample_bundle();
        let yaml = encode(&bundle).unwrap();
        let decoded = decode(yaml.as_bytes()).unwrap();
        assert_eq!(decoded, bundle);
    }

    #[test]
    fn test_encode_field_order() {
        let yaml = encode(&sample_bundle()).unwrap();
        let version = yaml.find("version:").unwrap();
        let file = yaml.find("file:").unwrap();
        let package = yaml.find("package:").unwrap();
        let symbols = yaml.find("symbols:").unwrap();
        let calls = yaml.find("calls:").unwrap();
        let signals = yaml.find("signals:").unwrap();
        assert!(version < file && file < package && package < symbols);
        assert!(symbols < calls && calls < signals);
    }

    #[test]
    fn test_signals_always_present_all_seven() {
        let mut bundle = sample_bundle();
        bundle.signals = Signals::default();
        let yaml = encode(&bundle).unwrap();
        for field in [
            "fs_reads", "fs_writes", "db_calls", "net_calls", "concurrency", "yaml_io", "json_io",
        ] {
            assert!(yaml.contains(field), "missing signal field {}", field);
        }
    }

    #[test]
    fn test_empty_sequences_omitted() {
        let mut bundle = sample_bundle();
        bundle.calls = vec![];
        bundle.symbols = Symbols::default();
        let yaml = encode(&bundle).unwrap();
        assert!(!yaml.contains("\ncalls:"));
        assert!(!yaml.contains("functions:"));
    }

    #[test]
    fn test_decode_tolerates_unknown_fields() {
        let yaml = encode(&sample_bundle()).unwrap();
        let extended = format!("{}\nfuture_field: 42\n", yaml.trim_end());
        let decoded = decode(extended.as_bytes()).unwrap();
        assert_eq!(decoded.file.path, "store/db.go");
    }
}
