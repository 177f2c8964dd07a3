//! Evidence bundle construction.
//!
//! `build` is a pure function from (path, raw bytes, parsed file) to an
//! `EvidenceBundle`: no I/O, no log output. Every emitted sequence is sorted
//! here so serialization is byte-for-byte deterministic.

use std::collections::{BTreeSet, HashSet};

use crate::analysis::{self, FileFacts, ParsedFile, TextualResolver, TypeKindFact};
use crate::hash::sha256_hex;

use super::{
    Call, EvidenceBundle, Field, FileMeta, Function, Import, PackageMeta, Signals, Symbols,
    TypeDecl, TypeKind, VarDecl, BUNDLE_VERSION,
};

/// Well-known file-read call targets.
const FS_READ_CALLS: &[&str] = &["os.Open", "os.ReadFile", "ioutil.ReadFile", "filepath.Walk"];

/// Well-known file-write/delete call targets.
const FS_WRITE_CALLS: &[&str] = &["os.Create", "os.WriteFile", "os.Remove"];

/// Build a v2 evidence bundle for one source file.
pub fn build(path: &str, bytes: &[u8], parsed: &ParsedFile) -> EvidenceBundle {
    let facts = analysis::extract_facts(parsed, &TextualResolver);
    assemble(path, bytes, &facts)
}

/// Assemble a bundle from pre-extracted facts.
fn assemble(path: &str, bytes: &[u8], facts: &FileFacts) -> EvidenceBundle {
    let hash = sha256_hex(bytes);
    let normalized = path.replace('\\', "/");

    let mut imports: Vec<Import> = facts
        .imports
        .iter()
        .map(|i| Import {
            path: i.path.clone(),
            alias: i.alias.clone(),
        })
        .collect();
    imports.sort_by(|a, b| a.path.cmp(&b.path));

    let symbols = build_symbols(facts);

    let mut calls: Vec<Call> = facts
        .calls
        .iter()
        .map(|c| Call {
            from: c.from.clone(),
            to: c.to.clone(),
        })
        .collect();
    calls.sort_by(|a, b| a.from.cmp(&b.from).then_with(|| a.to.cmp(&b.to)));

    let signals = derive_signals(facts);

    EvidenceBundle {
        version: BUNDLE_VERSION,
        file: FileMeta {
            path: normalized,
            sha256: hash,
        },
        package: PackageMeta {
            name: facts.package.clone(),
            imports,
        },
        symbols,
        calls,
        signals,
    }
}

/// Sort the declaration tables and derive the constructor list.
fn build_symbols(facts: &FileFacts) -> Symbols {
    let mut functions: Vec<Function> = facts
        .functions
        .iter()
        .map(|f| Function {
            name: f.name.clone(),
            exported: f.exported,
            receiver: f.receiver.clone(),
            params: f.params.clone(),
            returns: f.returns.clone(),
        })
        .collect();
    functions.sort_by(|a, b| a.name.cmp(&b.name));

    let mut types: Vec<TypeDecl> = facts
        .types
        .iter()
        .map(|t| TypeDecl {
            name: t.name.clone(),
            kind: match t.kind {
                TypeKindFact::Struct => TypeKind::Struct,
                TypeKindFact::Interface => TypeKind::Interface,
                TypeKindFact::Alias => TypeKind::Alias,
            },
            exported: t.exported,
            fields: t
                .fields
                .iter()
                .map(|f| Field {
                    name: f.name.clone(),
                    type_str: f.type_str.clone(),
                })
                .collect(),
        })
        .collect();
    types.sort_by(|a, b| a.name.cmp(&b.name));

    let mut variables: Vec<VarDecl> = facts
        .variables
        .iter()
        .map(|v| VarDecl {
            name: v.name.clone(),
            exported: v.exported,
        })
        .collect();
    variables.sort_by(|a, b| a.name.cmp(&b.name));

    let mut constants: Vec<VarDecl> = facts
        .constants
        .iter()
        .map(|c| VarDecl {
            name: c.name.clone(),
            exported: c.exported,
        })
        .collect();
    constants.sort_by(|a, b| a.name.cmp(&b.name));

    let constructors = derive_constructors(facts);

    Symbols {
        functions,
        types,
        variables,
        constants,
        constructors,
    }
}

/// A constructor is a non-method top-level function whose return list
/// contains at least one type declared in the same file.
fn derive_constructors(facts: &FileFacts) -> Vec<String> {
    let local_types: HashSet<&str> = facts.types.iter().map(|t| t.name.as_str()).collect();
    if local_types.is_empty() {
        return Vec::new();
    }
    let mut names = BTreeSet::new();
    for func in &facts.functions {
        if func.receiver.is_some() {
            continue;
        }
        let returns_local = func
            .returns
            .iter()
            .any(|ret| local_types.contains(base_type_name(ret)));
        if returns_local {
            names.insert(func.name.clone());
        }
    }
    names.into_iter().collect()
}

/// Peel `*` and `[]`/`[...]` prefixes and selector heads from a rendered
/// type string to get its base type name.
fn base_type_name(type_str: &str) -> &str {
    let mut t = type_str;
    loop {
        if let Some(rest) = t.strip_prefix('*') {
            t = rest;
        } else if let Some(rest) = t.strip_prefix("[...]") {
            t = rest;
        } else if let Some(rest) = t.strip_prefix("[]") {
            t = rest;
        } else {
            break;
        }
    }
    match t.rfind('.') {
        Some(idx) => &t[idx + 1..],
        None => t,
    }
}

/// Derive the seven behavioural signals from imports, call targets, and the
/// concurrency markers. All detection is purely syntactic.
fn derive_signals(facts: &FileFacts) -> Signals {
    let imports: HashSet<&str> = facts.imports.iter().map(|i| i.path.as_str()).collect();
    let calls: HashSet<&str> = facts.calls.iter().map(|c| c.to.as_str()).collect();

    let fs_reads = FS_READ_CALLS.iter().any(|fn_name| calls.contains(fn_name));
    let fs_writes = FS_WRITE_CALLS.iter().any(|fn_name| calls.contains(fn_name));

    let db_calls = imports.contains("database/sql")
        || calls
            .iter()
            .any(|t| t.contains("Query") || t.contains("Exec") || t.contains("Scan"));

    let net_calls = imports.contains("net")
        || imports.contains("net/http")
        || calls.iter().any(|t| t.contains("http.Client"));

    let concurrency = imports
        .iter()
        .any(|p| *p == "sync" || p.starts_with("sync/"))
        || facts.has_go_statement
        || facts.has_channel_type;

    let yaml_io = imports.iter().any(|p| p.contains("yaml"))
        || calls.iter().any(|t| t.starts_with("yaml."));

    let json_io =
        imports.contains("encoding/json") || calls.iter().any(|t| t.starts_with("json."));

    Signals {
        fs_reads,
        fs_writes,
        db_calls,
        net_calls,
        concurrency,
        yaml_io,
        json_io,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::parse;
    use crate::evidence::encode;

    fn build_source(source: &str) -> EvidenceBundle {
        let parsed = parse("test.go", source.as_bytes()).unwrap();
        build("test.go", source.as_bytes(), &parsed)
    }

    #[test]
    fn test_version_and_hash() {
        let source = "package main\n\nfunc main() {}\n";
        let bundle = build_source(source);
        assert_eq!(bundle.version, BUNDLE_VERSION);
        assert_eq!(bundle.file.path, "test.go");
        assert_eq!(bundle.file.sha256, sha256_hex(source.as_bytes()));
    }

    #[test]
    fn test_path_normalized_to_forward_slashes() {
        let source = "package main\n";
        let parsed = parse("pkg\\file.go", source.as_bytes()).unwrap();
        let bundle = build("pkg\\file.go", source.as_bytes(), &parsed);
        assert_eq!(bundle.file.path, "pkg/file.go");
    }

    #[test]
    fn test_imports_sorted_by_path() {
        let bundle = build_source(
            "package main\n\nimport (\n\t\"os\"\n\t\"fmt\"\n\t\"database/sql\"\n)\n",
        );
        let paths: Vec<&str> = bundle
            .package
            .imports
            .iter()
            .map(|i| i.path.as_str())
            .collect();
        assert_eq!(paths, vec!["database/sql", "fmt", "os"]);
    }

    #[test]
    fn test_symbols_sorted_by_name() {
        let bundle = build_source(
            r#"
package main

func zebra() {}

func alpha() {}

type Zed struct{}

type Abel struct{}
"#,
        );
        let fns: Vec<&str> = bundle
            .symbols
            .functions
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(fns, vec!["alpha", "zebra"]);
        let types: Vec<&str> = bundle
            .symbols
            .types
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(types, vec!["Abel", "Zed"]);
    }

    #[test]
    fn test_calls_sorted_and_deduplicated() {
        let bundle = build_source(
            r#"
package main

func run() {
    zeta()
    alpha()
    alpha()
}

func alpha() {}

func zeta() {}
"#,
        );
        let pairs: Vec<(&str, &str)> = bundle
            .calls
            .iter()
            .map(|c| (c.from.as_str(), c.to.as_str()))
            .collect();
        assert_eq!(pairs, vec![("run", "alpha"), ("run", "zeta")]);
    }

    #[test]
    fn test_constructors_local_type_return() {
        let bundle = build_source(
            r#"
package main

type Widget struct{}

func NewWidget() *Widget {
    return &Widget{}
}

func NewItems() []Widget {
    return nil
}

func Unrelated() error {
    return nil
}
"#,
        );
        assert_eq!(bundle.symbols.constructors, vec!["NewItems", "NewWidget"]);
    }

    #[test]
    fn test_constructors_exclude_methods() {
        let bundle = build_source(
            r#"
package main

type Widget struct{}

func (w *Widget) Clone() *Widget {
    return w
}
"#,
        );
        assert!(bundle.symbols.constructors.is_empty());
    }

    #[test]
    fn test_base_type_name_peeling() {
        assert_eq!(base_type_name("*Widget"), "Widget");
        assert_eq!(base_type_name("[]*Widget"), "Widget");
        assert_eq!(base_type_name("[...]Widget"), "Widget");
        assert_eq!(base_type_name("pkg.Widget"), "Widget");
        assert_eq!(base_type_name("*[]pkg.Widget"), "Widget");
        assert_eq!(base_type_name("Widget"), "Widget");
    }

    #[test]
    fn test_signal_fs_reads() {
        let bundle =
            build_source("package main\n\nfunc run() {\n\tos.ReadFile(\"x\")\n}\n");
        assert!(bundle.signals.fs_reads);
        assert!(!bundle.signals.fs_writes);
    }

    #[test]
    fn test_signal_fs_writes() {
        let bundle =
            build_source("package main\n\nfunc run() {\n\tos.WriteFile(\"x\", nil, 0)\n}\n");
        assert!(bundle.signals.fs_writes);
    }

    #[test]
    fn test_signal_db_calls_via_import() {
        let bundle = build_source("package store\n\nimport \"database/sql\"\n\nfunc Save() {}\n");
        assert!(bundle.signals.db_calls);
    }

    #[test]
    fn test_signal_db_calls_via_call_substring() {
        let bundle = build_source("package store\n\nfunc Load() {\n\tdb.QueryRow(\"q\")\n}\n");
        assert!(bundle.signals.db_calls);
    }

    #[test]
    fn test_signal_net_calls_via_import() {
        let bundle = build_source("package api\n\nimport \"net/http\"\n\nfunc Serve() {}\n");
        assert!(bundle.signals.net_calls);
    }

    #[test]
    fn test_signal_concurrency_variants() {
        let sync_import = build_source("package a\n\nimport \"sync\"\n\nfunc f() {}\n");
        assert!(sync_import.signals.concurrency);

        let goroutine = build_source("package a\n\nfunc f() {\n\tgo g()\n}\n\nfunc g() {}\n");
        assert!(goroutine.signals.concurrency);

        let channel = build_source("package a\n\nfunc f(ch chan int) {}\n");
        assert!(channel.signals.concurrency);

        let quiet = build_source("package a\n\nfunc f() {}\n");
        assert!(!quiet.signals.concurrency);
    }

    #[test]
    fn test_signal_yaml_and_json() {
        let yaml = build_source(
            "package a\n\nimport \"gopkg.in/yaml.v3\"\n\nfunc f() {}\n",
        );
        assert!(yaml.signals.yaml_io);
        assert!(!yaml.signals.json_io);

        let yaml_call = build_source("package a\n\nfunc f() {\n\tyaml.Marshal(nil)\n}\n");
        assert!(yaml_call.signals.yaml_io);

        let json = build_source("package a\n\nimport \"encoding/json\"\n\nfunc f() {}\n");
        assert!(json.signals.json_io);
        assert!(!json.signals.yaml_io);

        let json_call = build_source("package a\n\nfunc f() {\n\tjson.Marshal(nil)\n}\n");
        assert!(json_call.signals.json_io);
    }

    #[test]
    fn test_determinism_byte_identical() {
        let source = r#"
package store

import (
    "database/sql"
    "sync"
)

type Store struct {
    DB *sql.DB
}

func New() *Store {
    return &Store{}
}

func (s *Store) Save() error {
    s.mu.Lock()
    return nil
}
"#;
        let first = encode(&build_source(source)).unwrap();
        let second = encode(&build_source(source)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_position_data_in_yaml() {
        let yaml = encode(&build_source(
            "package main\n\nfunc main() {\n\tos.ReadFile(\"x\")\n}\n",
        ))
        .unwrap();
        for needle in ["line:", "column:", "offset:", "pos:", "position:"] {
            assert!(!yaml.contains(needle), "found forbidden substring {}", needle);
        }
    }
}
