//! Bundle aggregation into a system model.
//!
//! Loads every `*.evidence.yaml` under a root (honouring the walker's skip
//! rules and the deny matcher), computes the bundle-set hash, derives the
//! deterministic sections, and — when an inference provider is supplied —
//! maps the inferred output back and links effects to their owning domains.
//!
//! Every emitted sequence is the result of a total sort on a declared key,
//! so the discovery order of bundles never shows in the output.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use chrono::{SecondsFormat, Utc};
use walkdir::WalkDir;

use crate::evidence::{self, EvidenceBundle};
use crate::hash::sha256_hex;
use crate::inference::{
    self, InferenceProvider, OpenQuestionSpec, StateDomainSpec, TrustZoneSpec,
};
use crate::settings::DenyMatcher;

use super::{
    Boundaries, ConcurrencyDomain, Effect, EffectKind, Entrypoint, Inventory, ModelInputs,
    NetworkBoundary, OpenQuestion, PackageEntry, PersistenceBoundary, PersistenceKind,
    StateDomain, SymbolRef, SystemModel, TrustZone, MODEL_VERSION,
};

/// Directory names excluded when discovering bundle files (same rules as the
/// source walk).
const SKIP_DIRS: &[&str] = &["vendor", "testdata", "examples", "docs"];

// ---------------------------------------------------------------------------
// Evidence references
// ---------------------------------------------------------------------------

/// Format an evidence reference: `bundle:<path>[#<fragment>]`.
pub fn evidence_ref(path: &str, fragment: Option<&str>) -> String {
    match fragment {
        Some(frag) => format!("bundle:{}#{}", path, frag),
        None => format!("bundle:{}", path),
    }
}

/// A parsed evidence reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceRef {
    pub path: String,
    /// `symbol:<name>` or `signal:<name>`.
    pub fragment: Option<String>,
}

/// Parse an evidence reference string. A legacy `@v<digits>` suffix on the
/// path segment is ignored.
pub fn parse_evidence_ref(s: &str) -> Option<EvidenceRef> {
    let rest = s.strip_prefix("bundle:")?;
    let (mut path, fragment) = match rest.split_once('#') {
        Some((p, f)) => (p, Some(f.to_string())),
        None => (rest, None),
    };
    if let Some(at) = path.rfind("@v") {
        if path[at + 2..].chars().all(|c| c.is_ascii_digit()) && at + 2 < path.len() {
            path = &path[..at];
        }
    }
    if path.is_empty() {
        return None;
    }
    Some(EvidenceRef {
        path: path.to_string(),
        fragment,
    })
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Walk `root` for `*.evidence.yaml` files, decode each, and return them
/// sorted by `file.path`. Test-file bundles and denied paths are skipped.
pub fn load_bundles(root: &Path, deny: &DenyMatcher) -> anyhow::Result<Vec<EvidenceBundle>> {
    let mut bundles = Vec::new();

    let rel_slash = |path: &Path| -> String {
        path.strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    };

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_dir() {
                if SKIP_DIRS.contains(&name.as_ref()) || name.starts_with('.') {
                    return false;
                }
            }
            !deny.is_denied(&rel_slash(entry.path()))
        });

    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !name.ends_with(".evidence.yaml") || name.ends_with("_test.go.evidence.yaml") {
            continue;
        }
        let data = fs::read(entry.path())
            .with_context(|| format!("read {}", entry.path().display()))?;
        let bundle = evidence::decode(&data)
            .with_context(|| format!("unmarshal {}", entry.path().display()))?;
        bundles.push(bundle);
    }

    bundles.sort_by(|a, b| a.file.path.cmp(&b.file.path));
    Ok(bundles)
}

// ---------------------------------------------------------------------------
// Bundle set hash
// ---------------------------------------------------------------------------

/// SHA-256 over the sorted `<path>@<sha256>` lines of the bundle set,
/// joined by `\n` with no trailing newline.
pub fn bundle_set_hash(bundles: &[EvidenceBundle]) -> String {
    let mut lines: Vec<String> = bundles
        .iter()
        .map(|b| format!("{}@{}", b.file.path, b.file.sha256))
        .collect();
    lines.sort();
    sha256_hex(lines.join("\n").as_bytes())
}

// ---------------------------------------------------------------------------
// Deterministic builders
// ---------------------------------------------------------------------------

fn has_function(bundle: &EvidenceBundle, name: &str) -> bool {
    bundle.symbols.functions.iter().any(|f| f.name == name)
}

/// Read the module name from a `go.mod` at the root. Returns `None` when the
/// file is absent or carries no module line.
pub fn read_module_name(root: &Path) -> Option<String> {
    let data = fs::read_to_string(root.join("go.mod")).ok()?;
    data.lines().find_map(|line| {
        line.strip_prefix("module ")
            .map(|rest| rest.trim().to_string())
    })
}

/// Group bundles by package name, derive intra-repo imports, and identify
/// entrypoints (package `main` with a `main` function).
fn build_inventory(bundles: &[EvidenceBundle], module_name: Option<&str>) -> Inventory {
    let mut pkg_files: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut pkg_refs: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for bundle in bundles {
        let pkg = bundle.package.name.clone();
        pkg_files
            .entry(pkg.clone())
            .or_default()
            .push(bundle.file.path.clone());
        pkg_refs
            .entry(pkg)
            .or_default()
            .push(evidence_ref(&bundle.file.path, None));
    }

    let known: HashSet<&str> = pkg_files.keys().map(|s| s.as_str()).collect();

    // Intra-repo imports: strip the module prefix, take the last path
    // segment, keep only known package names, drop self-imports.
    let mut pkg_imports: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for bundle in bundles {
        let name = &bundle.package.name;
        for imp in &bundle.package.imports {
            let rel = match module_name {
                Some(module) => imp
                    .path
                    .strip_prefix(&format!("{}/", module))
                    .unwrap_or(&imp.path),
                None => &imp.path,
            };
            let dep = rel.rsplit('/').next().unwrap_or(rel);
            if known.contains(dep) && dep != name {
                pkg_imports
                    .entry(name.clone())
                    .or_default()
                    .insert(dep.to_string());
            }
        }
    }

    let mut packages = Vec::new();
    let mut entrypoints = Vec::new();

    for (name, mut files) in pkg_files {
        files.sort();
        let mut refs = pkg_refs.remove(&name).unwrap_or_default();
        refs.sort();
        let imports: Vec<String> = pkg_imports
            .get(&name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        if name == "main" {
            for bundle in bundles {
                if bundle.package.name == "main" && has_function(bundle, "main") {
                    entrypoints.push(Entrypoint {
                        package: bundle.package.name.clone(),
                        symbol: "main".to_string(),
                        evidence_refs: vec![evidence_ref(&bundle.file.path, Some("symbol:main"))],
                    });
                }
            }
        }

        packages.push(PackageEntry {
            name,
            files,
            imports,
            evidence_refs: refs,
        });
    }

    Inventory {
        packages,
        entrypoints,
    }
}

/// Derive persistence and network boundaries from signals. Persistence
/// groups appear in fixed kind order (db, fs); the network section is
/// omitted when empty.
fn build_boundaries(bundles: &[EvidenceBundle]) -> Boundaries {
    let mut db_writers = Vec::new();
    let mut fs_writers = Vec::new();
    let mut outbound = Vec::new();

    for bundle in bundles {
        if bundle.signals.db_calls {
            db_writers.push(SymbolRef {
                file: bundle.file.path.clone(),
                evidence_refs: vec![evidence_ref(&bundle.file.path, Some("signal:db_calls"))],
            });
        }
        if bundle.signals.fs_writes {
            fs_writers.push(SymbolRef {
                file: bundle.file.path.clone(),
                evidence_refs: vec![evidence_ref(&bundle.file.path, Some("signal:fs_writes"))],
            });
        }
        if bundle.signals.net_calls {
            outbound.push(SymbolRef {
                file: bundle.file.path.clone(),
                evidence_refs: vec![evidence_ref(&bundle.file.path, Some("signal:net_calls"))],
            });
        }
    }

    let mut boundaries = Boundaries::default();
    if !db_writers.is_empty() {
        boundaries.persistence.push(PersistenceBoundary {
            kind: PersistenceKind::Db,
            writers: db_writers,
        });
    }
    if !fs_writers.is_empty() {
        boundaries.persistence.push(PersistenceBoundary {
            kind: PersistenceKind::Fs,
            writers: fs_writers,
        });
    }
    if !outbound.is_empty() {
        boundaries.network = Some(NetworkBoundary { outbound });
    }
    boundaries
}

/// One effect per file × true signal kind, sorted by (kind, via).
fn build_effects(bundles: &[EvidenceBundle]) -> Vec<Effect> {
    let mut effects = Vec::new();

    for bundle in bundles {
        let mut push = |kind: EffectKind, signal: &str| {
            effects.push(Effect {
                kind,
                domain: None,
                via: bundle.file.path.clone(),
                evidence_refs: vec![evidence_ref(
                    &bundle.file.path,
                    Some(&format!("signal:{}", signal)),
                )],
            });
        };
        if bundle.signals.db_calls {
            push(EffectKind::DbWrite, "db_calls");
        }
        if bundle.signals.fs_reads {
            push(EffectKind::FsRead, "fs_reads");
        }
        if bundle.signals.fs_writes {
            push(EffectKind::FsWrite, "fs_writes");
        }
        if bundle.signals.net_calls {
            push(EffectKind::NetCall, "net_calls");
        }
    }

    effects.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.via.cmp(&b.via)));
    effects
}

/// One concurrency domain per file with the concurrency signal, sorted by id.
fn build_concurrency_domains(bundles: &[EvidenceBundle]) -> Vec<ConcurrencyDomain> {
    let mut domains: Vec<ConcurrencyDomain> = bundles
        .iter()
        .filter(|b| b.signals.concurrency)
        .map(|b| ConcurrencyDomain {
            id: b.file.path.clone(),
            files: vec![b.file.path.clone()],
            evidence_refs: vec![evidence_ref(&b.file.path, Some("signal:concurrency"))],
        })
        .collect();
    domains.sort_by(|a, b| a.id.cmp(&b.id));
    domains
}

// ---------------------------------------------------------------------------
// Inference output mapping
// ---------------------------------------------------------------------------

/// Sorted `bundle:<path>` refs of all bundles whose package appears in
/// `pkg_names`.
fn pkg_bundle_refs(bundles: &[EvidenceBundle], pkg_names: &[String]) -> Vec<String> {
    let wanted: HashSet<&str> = pkg_names.iter().map(|s| s.as_str()).collect();
    let mut refs: Vec<String> = bundles
        .iter()
        .filter(|b| wanted.contains(b.package.name.as_str()))
        .map(|b| evidence_ref(&b.file.path, None))
        .collect();
    refs.sort();
    refs
}

/// Map provider state-domain specs to model state domains, sorted by id.
fn map_state_domains(specs: &[StateDomainSpec], bundles: &[EvidenceBundle]) -> Vec<StateDomain> {
    let mut domains: Vec<StateDomain> = specs
        .iter()
        .map(|spec| StateDomain {
            id: spec.id.clone(),
            description: spec.description.clone(),
            owners: sorted_copy(&spec.owners),
            aggregate: spec.aggregate.clone(),
            representations: sorted_copy(&spec.representations),
            primary_mutators: sorted_copy(&spec.primary_mutators),
            primary_readers: sorted_copy(&spec.primary_readers),
            evidence_refs: pkg_bundle_refs(bundles, &spec.owners),
            confidence: spec.confidence,
        })
        .collect();
    domains.sort_by(|a, b| a.id.cmp(&b.id));
    domains
}

/// Map provider trust-zone specs to model trust zones, sorted by id.
fn map_trust_zones(specs: &[TrustZoneSpec], bundles: &[EvidenceBundle]) -> Vec<TrustZone> {
    let mut zones: Vec<TrustZone> = specs
        .iter()
        .map(|spec| TrustZone {
            id: spec.id.clone(),
            packages: sorted_copy(&spec.packages),
            external_via: sorted_copy(&spec.external_via),
            evidence_refs: pkg_bundle_refs(bundles, &spec.packages),
        })
        .collect();
    zones.sort_by(|a, b| a.id.cmp(&b.id));
    zones
}

/// Map provider open-question specs, sorted by question text.
fn map_open_questions(specs: &[OpenQuestionSpec]) -> Vec<OpenQuestion> {
    let mut questions: Vec<OpenQuestion> = specs
        .iter()
        .map(|spec| OpenQuestion {
            question: spec.question.clone(),
            related_domain: spec
                .related_domain
                .as_ref()
                .filter(|d| !d.is_empty())
                .cloned(),
            missing_evidence: sorted_copy(&spec.missing_evidence),
        })
        .collect();
    questions.sort_by(|a, b| a.question.cmp(&b.question));
    questions
}

/// Annotate effects with their owning domain: file → package → the first
/// domain (in sorted id order) listing that package among its owners. A
/// package claimed by several domains keeps the first claim. Produces a new
/// sequence; the input effects are unchanged.
pub fn link_effects(
    effects: &[Effect],
    domains: &[StateDomain],
    bundles: &[EvidenceBundle],
) -> Vec<Effect> {
    let file_to_pkg: HashMap<&str, &str> = bundles
        .iter()
        .map(|b| (b.file.path.as_str(), b.package.name.as_str()))
        .collect();

    let mut domain_by_package: HashMap<&str, &str> = HashMap::new();
    for domain in domains {
        for pkg in &domain.owners {
            domain_by_package
                .entry(pkg.as_str())
                .or_insert(domain.id.as_str());
        }
    }

    effects
        .iter()
        .map(|effect| {
            let domain = file_to_pkg
                .get(effect.via.as_str())
                .and_then(|pkg| domain_by_package.get(pkg))
                .map(|id| id.to_string());
            Effect {
                domain,
                ..effect.clone()
            }
        })
        .collect()
}

fn sorted_copy(items: &[String]) -> Vec<String> {
    let mut out = items.to_vec();
    out.sort();
    out
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Generate a system model from the bundles under `root`.
///
/// With a provider, the inferred sections are populated and effects are
/// linked to domains; without one, the model is still valid with empty
/// inferred sections. Provider failures propagate.
pub fn generate(
    root: &Path,
    provider: Option<&dyn InferenceProvider>,
    deny: &DenyMatcher,
) -> anyhow::Result<SystemModel> {
    let bundles = load_bundles(root, deny)?;
    if bundles.is_empty() {
        bail!(
            "no evidence bundles found in {} (run analyze on the directory first)",
            root.display()
        );
    }

    let bundle_hash = bundle_set_hash(&bundles);
    let module_name = read_module_name(root);

    let inventory = build_inventory(&bundles, module_name.as_deref());
    let boundaries = build_boundaries(&bundles);
    let mut effects = build_effects(&bundles);
    let concurrency_domains = build_concurrency_domains(&bundles);

    let mut state_domains = Vec::new();
    let mut trust_zones = Vec::new();
    let mut open_questions = Vec::new();

    if let Some(provider) = provider {
        let summaries =
            inference::build_package_summaries(&bundles, deny, module_name.as_deref());
        if !summaries.is_empty() {
            let output = provider.infer(&summaries).context("infer system model")?;
            state_domains = map_state_domains(&output.state_domains, &bundles);
            trust_zones = map_trust_zones(&output.trust_zones, &bundles);
            open_questions = map_open_questions(&output.open_questions);
            effects = link_effects(&effects, &state_domains, &bundles);
        }
    }

    Ok(SystemModel {
        version: MODEL_VERSION,
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        inputs: ModelInputs {
            bundle_set_sha256: bundle_hash,
        },
        inventory,
        state_domains,
        boundaries,
        effects,
        transitions: Vec::new(),
        trust_zones,
        concurrency_domains,
        open_questions,
    })
}
