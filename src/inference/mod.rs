//! Inference adapter.
//!
//! Builds a bounded list of package summaries from the loaded bundle set and
//! submits it to an [`InferenceProvider`]. The provider is an external
//! collaborator with a fixed request/response contract: it receives the
//! summaries and returns state domains, trust zones, and open questions.
//! Aggregation without a provider still yields a valid system model, with
//! empty inferred sections and unlinked effects.
//!
//! The caps below bound the request size; they are tunable knobs, not
//! correctness constraints.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evidence::{EvidenceBundle, Function, TypeDecl, TypeKind};
use crate::settings::DenyMatcher;

/// At most this many package summaries are submitted.
pub const MAX_SUMMARY_PACKAGES: usize = 60;
/// Per-package cap on exported type names.
pub const MAX_TYPES: usize = 30;
/// Per-package cap on compact struct renderings.
pub const MAX_TYPE_DESCS: usize = 30;
/// Per-package cap on function signature renderings.
pub const MAX_FUNC_DESCS: usize = 20;
/// Per-package cap on exported function names.
pub const MAX_FUNCTIONS: usize = 10;
/// Per-package cap on import paths.
pub const MAX_IMPORTS: usize = 10;

/// Errors surfaced by an inference provider.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("inference provider: {0}")]
    Provider(String),
}

/// Union of a package's file signals (OR across its bundles).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSignals {
    pub fs_reads: bool,
    pub fs_writes: bool,
    pub db_calls: bool,
    pub net_calls: bool,
    pub concurrency: bool,
    pub yaml_io: bool,
    pub json_io: bool,
}

impl PackageSignals {
    /// Whether the package qualifies for a summary (side-effecting or
    /// concurrent somewhere).
    pub fn any_effect(&self) -> bool {
        self.fs_reads || self.fs_writes || self.db_calls || self.net_calls || self.concurrency
    }
}

/// One package summary submitted to the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageSummary {
    pub name: String,
    pub files: Vec<String>,
    pub types: Vec<String>,
    pub type_descriptions: Vec<String>,
    pub functions: Vec<String>,
    pub signals: PackageSignals,
    pub imports: Vec<String>,
}

/// A state domain as returned by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDomainSpec {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub aggregate: String,
    #[serde(default)]
    pub representations: Vec<String>,
    #[serde(default)]
    pub primary_mutators: Vec<String>,
    #[serde(default)]
    pub primary_readers: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}

/// A trust zone as returned by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustZoneSpec {
    pub id: String,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub external_via: Vec<String>,
}

/// An open question as returned by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenQuestionSpec {
    pub question: String,
    #[serde(default)]
    pub related_domain: Option<String>,
    #[serde(default)]
    pub missing_evidence: Vec<String>,
}

/// The provider's full response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferenceOutput {
    #[serde(default)]
    pub state_domains: Vec<StateDomainSpec>,
    #[serde(default)]
    pub trust_zones: Vec<TrustZoneSpec>,
    #[serde(default)]
    pub open_questions: Vec<OpenQuestionSpec>,
}

/// The opaque inference collaborator. Called once per aggregation with the
/// full summary list.
pub trait InferenceProvider {
    fn infer(&self, summaries: &[PackageSummary]) -> Result<InferenceOutput, InferenceError>;
}

/// Compact struct rendering for the provider: `Name{Field1:T1, Field2:T2}`.
/// Non-structs and field-less structs render nothing.
pub fn format_struct_desc(td: &TypeDecl) -> Option<String> {
    if td.kind != TypeKind::Struct || td.fields.is_empty() {
        return None;
    }
    let fields: Vec<String> = td
        .fields
        .iter()
        .map(|f| format!("{}:{}", f.name, f.type_str))
        .collect();
    Some(format!("{}{{{}}}", td.name, fields.join(", ")))
}

/// Compact signature rendering for exported non-method functions:
/// `Name(T1, T2) R` or `Name(T1) (R1, R2)`.
pub fn format_func_desc(func: &Function) -> Option<String> {
    if !func.exported || func.receiver.is_some() {
        return None;
    }
    let mut out = format!("{}({})", func.name, func.params.join(", "));
    match func.returns.len() {
        0 => {}
        1 => {
            out.push(' ');
            out.push_str(&func.returns[0]);
        }
        _ => {
            out.push_str(&format!(" ({})", func.returns.join(", ")));
        }
    }
    Some(out)
}

struct PackageAccum {
    files: Vec<String>,
    types: BTreeSet<String>,
    type_descs: BTreeSet<String>,
    functions: BTreeSet<String>,
    func_descs: BTreeSet<String>,
    imports: BTreeSet<String>,
    signals: PackageSignals,
}

impl PackageAccum {
    fn new() -> Self {
        Self {
            files: Vec::new(),
            types: BTreeSet::new(),
            type_descs: BTreeSet::new(),
            functions: BTreeSet::new(),
            func_descs: BTreeSet::new(),
            imports: BTreeSet::new(),
            signals: PackageSignals::default(),
        }
    }
}

/// Build the bounded package-summary list: group bundles by package, OR the
/// signals, collect capped sorted name/description/import sets, filter to
/// packages with at least one effect signal, and cap the whole list.
///
/// Imports whose module-relative path is denied are filtered out so the
/// provider never sees packages it has no evidence for.
pub fn build_package_summaries(
    bundles: &[EvidenceBundle],
    deny: &DenyMatcher,
    module_name: Option<&str>,
) -> Vec<PackageSummary> {
    let mut accum: BTreeMap<String, PackageAccum> = BTreeMap::new();

    for bundle in bundles {
        let entry = accum
            .entry(bundle.package.name.clone())
            .or_insert_with(PackageAccum::new);
        entry.files.push(bundle.file.path.clone());

        let s = &bundle.signals;
        entry.signals.fs_reads |= s.fs_reads;
        entry.signals.fs_writes |= s.fs_writes;
        entry.signals.db_calls |= s.db_calls;
        entry.signals.net_calls |= s.net_calls;
        entry.signals.concurrency |= s.concurrency;
        entry.signals.yaml_io |= s.yaml_io;
        entry.signals.json_io |= s.json_io;

        for td in &bundle.symbols.types {
            if td.exported {
                entry.types.insert(td.name.clone());
                if let Some(desc) = format_struct_desc(td) {
                    entry.type_descs.insert(desc);
                }
            }
        }
        for func in &bundle.symbols.functions {
            if func.exported {
                entry.functions.insert(func.name.clone());
            }
            if let Some(desc) = format_func_desc(func) {
                entry.func_descs.insert(desc);
            }
        }
        for imp in &bundle.package.imports {
            let rel = match module_name {
                Some(module) => imp
                    .path
                    .strip_prefix(&format!("{}/", module))
                    .unwrap_or(&imp.path),
                None => &imp.path,
            };
            if deny.is_denied(rel) {
                continue;
            }
            entry.imports.insert(imp.path.clone());
        }
    }

    let mut summaries = Vec::new();
    for (name, acc) in accum {
        if !acc.signals.any_effect() {
            continue;
        }
        let mut files = acc.files;
        files.sort();

        let mut descriptions = top_n(&acc.type_descs, MAX_TYPE_DESCS);
        descriptions.extend(top_n(&acc.func_descs, MAX_FUNC_DESCS));
        descriptions.sort();

        summaries.push(PackageSummary {
            name,
            files,
            types: top_n(&acc.types, MAX_TYPES),
            type_descriptions: descriptions,
            functions: top_n(&acc.functions, MAX_FUNCTIONS),
            signals: acc.signals,
            imports: top_n(&acc.imports, MAX_IMPORTS),
        });
    }

    summaries.truncate(MAX_SUMMARY_PACKAGES);
    summaries
}

/// First `n` entries of an already-sorted set.
fn top_n(set: &BTreeSet<String>, n: usize) -> Vec<String> {
    set.iter().take(n).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{
        Field, FileMeta, Import, PackageMeta, Signals, Symbols, BUNDLE_VERSION,
    };

    fn bundle(path: &str, pkg: &str, signals: Signals) -> EvidenceBundle {
        EvidenceBundle {
            version: BUNDLE_VERSION,
            file: FileMeta {
                path: path.to_string(),
                sha256: "0".repeat(64),
            },
            package: PackageMeta {
                name: pkg.to_string(),
                imports: vec![],
            },
            symbols: Symbols::default(),
            calls: vec![],
            signals,
        }
    }

    fn db_signals() -> Signals {
        Signals {
            db_calls: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_format_struct_desc() {
        let td = TypeDecl {
            name: "Widget".to_string(),
            kind: TypeKind::Struct,
            exported: true,
            fields: vec![
                Field {
                    name: "Name".to_string(),
                    type_str: "string".to_string(),
                },
                Field {
                    name: "Count".to_string(),
                    type_str: "int".to_string(),
                },
            ],
        };
        assert_eq!(
            format_struct_desc(&td).unwrap(),
            "Widget{Name:string, Count:int}"
        );

        let empty = TypeDecl {
            name: "Empty".to_string(),
            kind: TypeKind::Struct,
            exported: true,
            fields: vec![],
        };
        assert!(format_struct_desc(&empty).is_none());
    }

    #[test]
    fn test_format_func_desc() {
        let single = Function {
            name: "Save".to_string(),
            exported: true,
            receiver: None,
            params: vec!["string".to_string(), "int".to_string()],
            returns: vec!["error".to_string()],
        };
        assert_eq!(format_func_desc(&single).unwrap(), "Save(string, int) error");

        let multi = Function {
            name: "Load".to_string(),
            exported: true,
            receiver: None,
            params: vec!["string".to_string()],
            returns: vec!["*Widget".to_string(), "error".to_string()],
        };
        assert_eq!(
            format_func_desc(&multi).unwrap(),
            "Load(string) (*Widget, error)"
        );

        let method = Function {
            name: "Close".to_string(),
            exported: true,
            receiver: Some("*Widget".to_string()),
            params: vec![],
            returns: vec![],
        };
        assert!(format_func_desc(&method).is_none());

        let unexported = Function {
            name: "helper".to_string(),
            exported: false,
            ..Default::default()
        };
        assert!(format_func_desc(&unexported).is_none());
    }

    #[test]
    fn test_summaries_filter_to_signal_packages() {
        let bundles = vec![
            bundle("store/db.go", "store", db_signals()),
            bundle("util/strings.go", "util", Signals::default()),
        ];
        let summaries = build_package_summaries(&bundles, &DenyMatcher::empty(), None);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name, "store");
    }

    #[test]
    fn test_summaries_or_signals_across_files() {
        let mut fs_bundle = bundle("store/files.go", "store", Signals::default());
        fs_bundle.signals.fs_writes = true;
        let bundles = vec![bundle("store/db.go", "store", db_signals()), fs_bundle];

        let summaries = build_package_summaries(&bundles, &DenyMatcher::empty(), None);
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].signals.db_calls);
        assert!(summaries[0].signals.fs_writes);
        assert_eq!(summaries[0].files, vec!["store/db.go", "store/files.go"]);
    }

    #[test]
    fn test_summaries_filter_denied_imports() {
        let mut b = bundle("store/db.go", "store", db_signals());
        b.package.imports = vec![
            Import {
                path: "iguana/baml_client".to_string(),
                alias: None,
            },
            Import {
                path: "database/sql".to_string(),
                alias: None,
            },
        ];
        let settings = crate::settings::Settings {
            permissions: crate::settings::Permissions {
                deny: vec!["baml_client/**".to_string()],
            },
        };
        let deny = DenyMatcher::from_settings(Some(&settings));
        let summaries = build_package_summaries(&[b], &deny, Some("iguana"));
        assert_eq!(summaries[0].imports, vec!["database/sql"]);
    }

    #[test]
    fn test_summaries_cap() {
        let bundles: Vec<EvidenceBundle> = (0..70)
            .map(|i| bundle(&format!("p{:02}/f.go", i), &format!("p{:02}", i), db_signals()))
            .collect();
        let summaries = build_package_summaries(&bundles, &DenyMatcher::empty(), None);
        assert_eq!(summaries.len(), MAX_SUMMARY_PACKAGES);
    }
}
