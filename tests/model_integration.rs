//! End-to-end tests for bundle aggregation: inventory, boundaries, effects,
//! the bundle-set hash, the up-to-date check, and inference mapping.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use iguana::inference::{
    InferenceError, InferenceOutput, InferenceProvider, OpenQuestionSpec, PackageSummary,
    StateDomainSpec, TrustZoneSpec,
};
use iguana::model::{self, aggregate, EffectKind, PersistenceKind};
use iguana::settings::DenyMatcher;
use iguana::Walker;

fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

fn analyze(root: &Path) {
    let deny = DenyMatcher::empty();
    let report = Walker::new(root, &deny).run().unwrap();
    assert!(report.errors.is_empty());
}

/// Provider stub returning a canned response.
struct StubProvider {
    output: InferenceOutput,
}

impl InferenceProvider for StubProvider {
    fn infer(&self, _summaries: &[PackageSummary]) -> Result<InferenceOutput, InferenceError> {
        Ok(self.output.clone())
    }
}

/// Provider stub that always fails.
struct FailingProvider;

impl InferenceProvider for FailingProvider {
    fn infer(&self, _summaries: &[PackageSummary]) -> Result<InferenceOutput, InferenceError> {
        Err(InferenceError::Provider("model unavailable".to_string()))
    }
}

const MAIN_GO: &str = "package main\n\nfunc main() {}\n";
const STORE_GO: &str = "package store\n\nimport \"database/sql\"\n\nfunc Save() {}\n";

#[test]
fn two_file_tree_aggregates_expected_model() {
    let temp = TempDir::new().unwrap();
    write_tree(
        temp.path(),
        &[("main.go", MAIN_GO), ("store/db.go", STORE_GO)],
    );
    analyze(temp.path());

    let deny = DenyMatcher::empty();
    let model = aggregate::generate(temp.path(), None, &deny).unwrap();

    assert_eq!(model.version, 1);

    let names: Vec<&str> = model
        .inventory
        .packages
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(names, vec!["main", "store"]);

    assert_eq!(model.inventory.entrypoints.len(), 1);
    let entry = &model.inventory.entrypoints[0];
    assert_eq!(entry.package, "main");
    assert_eq!(entry.symbol, "main");
    assert_eq!(entry.evidence_refs, vec!["bundle:main.go#symbol:main"]);

    assert_eq!(model.boundaries.persistence.len(), 1);
    let persistence = &model.boundaries.persistence[0];
    assert_eq!(persistence.kind, PersistenceKind::Db);
    assert_eq!(persistence.writers.len(), 1);
    assert_eq!(persistence.writers[0].file, "store/db.go");

    assert_eq!(model.effects.len(), 1);
    assert_eq!(model.effects[0].kind, EffectKind::DbWrite);
    assert_eq!(model.effects[0].via, "store/db.go");
    assert_eq!(
        model.effects[0].evidence_refs,
        vec!["bundle:store/db.go#signal:db_calls"]
    );

    assert!(model.transitions.is_empty());
    assert!(model.state_domains.is_empty());
}

#[test]
fn bundle_set_hash_stable_under_discovery_order() {
    let temp = TempDir::new().unwrap();
    write_tree(
        temp.path(),
        &[
            ("a.go", "package main\n\nfunc main() {}\n"),
            ("z/last.go", "package z\n\nfunc Z() {}\n"),
            ("m/mid.go", "package m\n\nfunc M() {}\n"),
        ],
    );
    analyze(temp.path());

    let deny = DenyMatcher::empty();
    let bundles = aggregate::load_bundles(temp.path(), &deny).unwrap();
    let hash = aggregate::bundle_set_hash(&bundles);

    // Permute the set: the hash is defined over sorted lines.
    let mut reversed = bundles.clone();
    reversed.reverse();
    assert_eq!(aggregate::bundle_set_hash(&reversed), hash);

    let model = aggregate::generate(temp.path(), None, &deny).unwrap();
    assert_eq!(model.inputs.bundle_set_sha256, hash);
}

#[test]
fn denied_package_absent_from_model() {
    let temp = TempDir::new().unwrap();
    write_tree(
        temp.path(),
        &[
            ("main.go", MAIN_GO),
            ("baml_client/x.go", "package baml_client\n\nfunc X() {}\n"),
        ],
    );
    // Bundles exist for everything (analyzed before the deny rule landed).
    analyze(temp.path());

    fs::create_dir_all(temp.path().join(".iguana")).unwrap();
    fs::write(
        temp.path().join(".iguana/settings.yaml"),
        "permissions:\n  deny:\n    - \"Read(./baml_client/**)\"\n",
    )
    .unwrap();
    let settings = iguana::Settings::load(temp.path()).unwrap();
    let deny = DenyMatcher::from_settings(settings.as_ref());

    let model = aggregate::generate(temp.path(), None, &deny).unwrap();
    assert!(model
        .inventory
        .packages
        .iter()
        .all(|p| p.name != "baml_client"));
}

#[test]
fn every_bundle_appears_in_some_evidence_refs() {
    let temp = TempDir::new().unwrap();
    write_tree(
        temp.path(),
        &[
            ("main.go", MAIN_GO),
            ("store/db.go", STORE_GO),
            ("util/str.go", "package util\n\nfunc Upper() {}\n"),
        ],
    );
    analyze(temp.path());

    let deny = DenyMatcher::empty();
    let bundles = aggregate::load_bundles(temp.path(), &deny).unwrap();
    let model = aggregate::generate(temp.path(), None, &deny).unwrap();

    for bundle in &bundles {
        let needle = format!("bundle:{}", bundle.file.path);
        let found = model.inventory.packages.iter().any(|p| {
            p.files.contains(&bundle.file.path) && p.evidence_refs.contains(&needle)
        });
        assert!(found, "no evidence ref for {}", bundle.file.path);
    }
}

#[test]
fn intra_repo_imports_resolved_via_module_prefix() {
    let temp = TempDir::new().unwrap();
    write_tree(
        temp.path(),
        &[
            ("go.mod", "module example.com/widget\n\ngo 1.21\n"),
            (
                "main.go",
                "package main\n\nimport \"example.com/widget/store\"\n\nfunc main() {\n\tstore.Save()\n}\n",
            ),
            ("store/db.go", STORE_GO),
        ],
    );
    analyze(temp.path());

    let deny = DenyMatcher::empty();
    let model = aggregate::generate(temp.path(), None, &deny).unwrap();
    let main_pkg = model
        .inventory
        .packages
        .iter()
        .find(|p| p.name == "main")
        .unwrap();
    assert_eq!(main_pkg.imports, vec!["store"]);
}

#[test]
fn model_write_read_round_trip_and_up_to_date() {
    let temp = TempDir::new().unwrap();
    write_tree(
        temp.path(),
        &[("main.go", MAIN_GO), ("store/db.go", STORE_GO)],
    );
    analyze(temp.path());

    let deny = DenyMatcher::empty();
    let model_path = temp.path().join("system_model.yaml");

    // No model yet: not up to date.
    assert!(!model::up_to_date(temp.path(), &model_path, &deny).unwrap());

    let generated = aggregate::generate(temp.path(), None, &deny).unwrap();
    model::write(&generated, &model_path).unwrap();

    let reread = model::read(&model_path).unwrap();
    assert_eq!(
        reread.inputs.bundle_set_sha256,
        generated.inputs.bundle_set_sha256
    );
    assert!(model::up_to_date(temp.path(), &model_path, &deny).unwrap());

    // Change a source and regenerate its bundle: the stored model is stale.
    fs::write(
        temp.path().join("store/db.go"),
        "package store\n\nimport \"database/sql\"\n\nfunc Save() {}\n\nfunc Delete() {}\n",
    )
    .unwrap();
    analyze(temp.path());
    assert!(!model::up_to_date(temp.path(), &model_path, &deny).unwrap());
}

#[test]
fn no_bundles_is_fatal_for_generation() {
    let temp = TempDir::new().unwrap();
    write_tree(temp.path(), &[("readme.txt", "no go files here\n")]);

    let deny = DenyMatcher::empty();
    assert!(aggregate::generate(temp.path(), None, &deny).is_err());
    assert!(!model::up_to_date(temp.path(), &temp.path().join("system_model.yaml"), &deny).unwrap());
}

#[test]
fn inference_output_mapped_sorted_and_linked() {
    let temp = TempDir::new().unwrap();
    write_tree(
        temp.path(),
        &[("main.go", MAIN_GO), ("store/db.go", STORE_GO)],
    );
    analyze(temp.path());

    let provider = StubProvider {
        output: InferenceOutput {
            state_domains: vec![
                StateDomainSpec {
                    id: "zeta_state".to_string(),
                    description: "later".to_string(),
                    owners: vec!["store".to_string()],
                    aggregate: "Z".to_string(),
                    confidence: 0.6,
                    ..Default::default()
                },
                StateDomainSpec {
                    id: "user_state".to_string(),
                    description: "user records".to_string(),
                    owners: vec!["store".to_string()],
                    aggregate: "User".to_string(),
                    confidence: 0.85,
                    ..Default::default()
                },
            ],
            trust_zones: vec![TrustZoneSpec {
                id: "internal".to_string(),
                packages: vec!["store".to_string(), "main".to_string()],
                external_via: vec![],
            }],
            open_questions: vec![OpenQuestionSpec {
                question: "Is Save transactional?".to_string(),
                related_domain: Some("user_state".to_string()),
                missing_evidence: vec![],
            }],
        },
    };

    let deny = DenyMatcher::empty();
    let model = aggregate::generate(temp.path(), Some(&provider), &deny).unwrap();

    let ids: Vec<&str> = model.state_domains.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["user_state", "zeta_state"]);
    assert_eq!(
        model.state_domains[0].evidence_refs,
        vec!["bundle:store/db.go"]
    );

    // Both domains own "store"; the first in sorted order wins the linkage.
    assert_eq!(model.effects[0].domain.as_deref(), Some("user_state"));

    assert_eq!(model.trust_zones.len(), 1);
    assert_eq!(model.trust_zones[0].packages, vec!["main", "store"]);
    assert_eq!(
        model.trust_zones[0].evidence_refs,
        vec!["bundle:main.go", "bundle:store/db.go"]
    );

    assert_eq!(model.open_questions.len(), 1);
    assert_eq!(
        model.open_questions[0].related_domain.as_deref(),
        Some("user_state")
    );
}

#[test]
fn provider_failure_propagates() {
    let temp = TempDir::new().unwrap();
    write_tree(temp.path(), &[("store/db.go", STORE_GO)]);
    analyze(temp.path());

    let deny = DenyMatcher::empty();
    let err = aggregate::generate(temp.path(), Some(&FailingProvider), &deny);
    assert!(err.is_err());

    // Without a provider the same root still yields a valid model.
    let model = aggregate::generate(temp.path(), None, &deny).unwrap();
    assert!(model.state_domains.is_empty());
    assert!(model.effects[0].domain.is_none());
}

#[test]
fn model_yaml_top_level_key_order() {
    let temp = TempDir::new().unwrap();
    write_tree(
        temp.path(),
        &[("main.go", MAIN_GO), ("store/db.go", STORE_GO)],
    );
    analyze(temp.path());

    let deny = DenyMatcher::empty();
    let model = aggregate::generate(temp.path(), None, &deny).unwrap();
    let model_path = temp.path().join("system_model.yaml");
    model::write(&model, &model_path).unwrap();

    let yaml = fs::read_to_string(&model_path).unwrap();
    let version = yaml.find("version:").unwrap();
    let generated = yaml.find("generated_at:").unwrap();
    let inputs = yaml.find("inputs:").unwrap();
    let inventory = yaml.find("inventory:").unwrap();
    let boundaries = yaml.find("boundaries:").unwrap();
    let transitions = yaml.find("transitions: []").unwrap();
    assert!(version < generated && generated < inputs && inputs < inventory);
    assert!(inventory < boundaries && boundaries < transitions);
}
