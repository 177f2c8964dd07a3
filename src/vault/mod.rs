//! Vault projection.
//!
//! `project` is a pure function from a system model to a map of relative
//! page path → markdown content. Pages:
//!
//!   index.md                 — lists all state domains
//!   domains/<id>.md          — one per state domain
//!   boundaries.md            — persistence + network tables
//!   risk.md                  — in-degree ranking, write domains, import cycles
//!   open-questions.md        — grouped by domain, General last
//!   graphs/dependencies.md   — Mermaid LR import graph
//!
//! Every page begins with a YAML frontmatter block whose `tags` entries are
//! sorted alphabetically. Wiki links have the shape
//! `[[<relative-path-without-md>|<display>]]`.

mod writer;

pub use writer::write_vault;

use std::collections::{BTreeMap, HashMap};

use crate::model::{Effect, PackageEntry, StateDomain, SystemModel};

/// Project a system model into its vault pages, keyed by relative path.
pub fn project(model: &SystemModel) -> BTreeMap<String, String> {
    let mut pages = BTreeMap::new();

    pages.insert("index.md".to_string(), build_overview_page(model));

    for domain in &model.state_domains {
        let id = sanitize_filename(&domain.id);
        pages.insert(
            format!("domains/{}.md", id),
            build_domain_page(domain, &model.effects),
        );
    }

    pages.insert("boundaries.md".to_string(), build_boundary_map(model));
    pages.insert("risk.md".to_string(), build_risk_report(model));
    pages.insert(
        "open-questions.md".to_string(),
        build_open_questions_index(model),
    );
    pages.insert(
        "graphs/dependencies.md".to_string(),
        build_dependency_graph(model),
    );

    pages
}

// ---------------------------------------------------------------------------
// Page builders
// ---------------------------------------------------------------------------

/// index.md — entry point listing all state domains.
fn build_overview_page(model: &SystemModel) -> String {
    let mut b = String::new();
    b.push_str(&frontmatter(&["iguana/index"]));
    b.push_str("# System Model\n\n");
    b.push_str(&format!("- **Generated**: {}\n", model.generated_at));
    b.push_str(&format!(
        "- **Bundle hash**: `{}`\n\n",
        model.inputs.bundle_set_sha256
    ));
    b.push_str("## State Domains\n\n");
    for domain in &model.state_domains {
        let id = sanitize_filename(&domain.id);
        b.push_str(&format!(
            "- {} — {}\n",
            wiki_link(&format!("domains/{}", id), &domain.id),
            domain.description
        ));
    }
    b
}

/// domains/<id>.md — one page per state domain. Symbols are plain text;
/// the Evidence section appears when evidence_refs is non-empty.
fn build_domain_page(domain: &StateDomain, effects: &[Effect]) -> String {
    let mut b = String::new();

    let conf_tag = confidence_tag(domain.confidence);
    b.push_str(&frontmatter(&["state-domain", conf_tag]));
    b.push_str(&format!("# {}\n\n", domain.id));
    b.push_str(&domain.description);
    b.push_str("\n\n");
    b.push_str(&format!("**Confidence**: {:.2}\n", domain.confidence));
    if !domain.owners.is_empty() {
        b.push_str(&format!("**Owners**: {}\n", domain.owners.join(", ")));
    }

    if !domain.aggregate.is_empty() {
        b.push_str("\n## Aggregate\n\n");
        b.push_str(&domain.aggregate);
        b.push('\n');
    }

    if !domain.representations.is_empty() {
        b.push_str("\n## Representations\n\n");
        for r in &domain.representations {
            b.push_str(&format!("- {}\n", r));
        }
    }

    if !domain.primary_mutators.is_empty() {
        b.push_str("\n## Primary Mutators\n\n");
        for m in &domain.primary_mutators {
            b.push_str(&format!("- {}\n", m));
        }
    }

    if !domain.primary_readers.is_empty() {
        b.push_str("\n## Primary Readers\n\n");
        for r in &domain.primary_readers {
            b.push_str(&format!("- {}\n", r));
        }
    }

    let own: Vec<&Effect> = effects
        .iter()
        .filter(|e| e.domain.as_deref() == Some(domain.id.as_str()))
        .collect();
    if !own.is_empty() {
        b.push_str("\n## Effects\n\n");
        b.push_str("| Kind | Via |\n");
        b.push_str("|------|-----|\n");
        for effect in own {
            b.push_str(&format!("| {} | `{}` |\n", effect.kind, effect.via));
        }
    }

    if !domain.evidence_refs.is_empty() {
        b.push_str("\n## Evidence\n\n");
        for r in &domain.evidence_refs {
            b.push_str(&format!("- {}\n", r));
        }
    }

    b
}

/// boundaries.md — persistence and network boundary tables.
fn build_boundary_map(model: &SystemModel) -> String {
    let mut b = String::new();
    b.push_str(&frontmatter(&["iguana/boundaries"]));
    b.push_str("# Boundaries\n\n");

    if !model.boundaries.persistence.is_empty() {
        b.push_str("## Persistence\n\n");
        b.push_str("| Kind | File |\n");
        b.push_str("|------|------|\n");
        for boundary in &model.boundaries.persistence {
            for writer in &boundary.writers {
                b.push_str(&format!("| {} | `{}` |\n", boundary.kind, writer.file));
            }
        }
        b.push('\n');
    }

    if let Some(network) = &model.boundaries.network {
        if !network.outbound.is_empty() {
            b.push_str("## Network\n\n");
            b.push_str("| File |\n");
            b.push_str("|------|\n");
            for outbound in &network.outbound {
                b.push_str(&format!("| `{}` |\n", outbound.file));
            }
        }
    }

    b
}

/// risk.md — in-degree ranking, domains with write effects, import cycles.
fn build_risk_report(model: &SystemModel) -> String {
    let mut b = String::new();
    b.push_str(&frontmatter(&["iguana/risk"]));
    b.push_str("# Risk Report\n\n");

    // Top packages by in-degree over the intra-repo import graph.
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    for pkg in &model.inventory.packages {
        for imp in &pkg.imports {
            *in_degree.entry(imp.as_str()).or_insert(0) += 1;
        }
    }
    let mut counts: Vec<(&str, usize)> = in_degree.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    counts.truncate(10);

    b.push_str("## Top Packages by In-Degree\n\n");
    if !counts.is_empty() {
        b.push_str("| Package | Dependents |\n");
        b.push_str("|---------|------------|\n");
        for (name, count) in &counts {
            b.push_str(&format!("| {} | {} |\n", name, count));
        }
    }
    b.push('\n');

    // Domains that receive write effects.
    let mut write_domains: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for effect in &model.effects {
        if effect.kind.is_write() {
            if let Some(domain) = &effect.domain {
                write_domains
                    .entry(domain.as_str())
                    .or_default()
                    .push(effect.via.as_str());
            }
        }
    }

    b.push_str("## Domains with Write Effects\n\n");
    if !write_domains.is_empty() {
        b.push_str("| Domain | Writers |\n");
        b.push_str("|--------|----------|\n");
        for (id, writers) in &write_domains {
            let san = sanitize_filename(id);
            b.push_str(&format!(
                "| {} | {} |\n",
                wiki_link(&format!("domains/{}", san), id),
                writers.join(", ")
            ));
        }
    }
    b.push('\n');

    // Import cycles.
    b.push_str("## Import Cycles\n\n");
    let cycles = find_cycles(&model.inventory.packages);
    if cycles.is_empty() {
        b.push_str("_None found._\n");
    } else {
        for cycle in &cycles {
            b.push_str(&format!("- {}\n", cycle));
        }
    }

    b
}

/// open-questions.md — questions grouped by related domain; questions with
/// no domain appear under `## General`, last.
fn build_open_questions_index(model: &SystemModel) -> String {
    let mut b = String::new();
    b.push_str(&frontmatter(&["iguana/open-questions"]));
    b.push_str("# Open Questions\n\n");

    let mut by_domain: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut general: Vec<&str> = Vec::new();
    for q in &model.open_questions {
        match q.related_domain.as_deref() {
            Some(domain) if !domain.is_empty() => {
                by_domain.entry(domain).or_default().push(q.question.as_str())
            }
            _ => general.push(q.question.as_str()),
        }
    }

    for (domain, questions) in &by_domain {
        let san = sanitize_filename(domain);
        b.push_str(&format!(
            "## {}\n\n",
            wiki_link(&format!("domains/{}", san), domain)
        ));
        for q in questions {
            b.push_str(&format!("- {}\n", q));
        }
        b.push('\n');
    }

    if !general.is_empty() {
        b.push_str("## General\n\n");
        for q in &general {
            b.push_str(&format!("- {}\n", q));
        }
    }

    b
}

/// graphs/dependencies.md — Mermaid LR graph of intra-repo import edges.
fn build_dependency_graph(model: &SystemModel) -> String {
    let mut b = String::new();
    b.push_str(&frontmatter(&["iguana/graph"]));
    b.push_str("# Dependency Graph\n\n");

    let mut edges: Vec<(&str, &str)> = Vec::new();
    for pkg in &model.inventory.packages {
        for imp in &pkg.imports {
            edges.push((pkg.name.as_str(), imp.as_str()));
        }
    }

    if edges.is_empty() {
        b.push_str("_No packages._\n");
        return b;
    }

    edges.sort();

    b.push_str("```mermaid\ngraph LR\n");
    for (from, to) in &edges {
        b.push_str(&format!("  {} --> {}\n", from, to));
    }
    b.push_str("```\n");

    b
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Confidence tag thresholds: ≥0.80 high, ≥0.70 medium, else low.
fn confidence_tag(confidence: f64) -> &'static str {
    if confidence >= 0.8 {
        "confidence-high"
    } else if confidence >= 0.7 {
        "confidence-medium"
    } else {
        "confidence-low"
    }
}

/// YAML frontmatter block with sorted tags, followed by one blank line.
fn frontmatter(tags: &[&str]) -> String {
    let mut sorted: Vec<&str> = tags.to_vec();
    sorted.sort();
    let mut b = String::from("---\ntags:\n");
    for tag in sorted {
        b.push_str(&format!("  - {}\n", tag));
    }
    b.push_str("---\n\n");
    b
}

/// `[[<path>|<display>]]` — the path segment never carries a `.md` suffix.
fn wiki_link(path: &str, display: &str) -> String {
    format!("[[{}|{}]]", path, display)
}

/// Replace `/` and `.` with `-`, collapse repeated `-`, trim leading and
/// trailing `-`.
pub fn sanitize_filename(s: &str) -> String {
    let replaced: String = s
        .chars()
        .map(|c| if c == '/' || c == '.' { '-' } else { c })
        .collect();
    let mut collapsed = String::with_capacity(replaced.len());
    let mut prev_dash = false;
    for c in replaced.chars() {
        if c == '-' {
            if !prev_dash {
                collapsed.push(c);
            }
            prev_dash = true;
        } else {
            collapsed.push(c);
            prev_dash = false;
        }
    }
    collapsed.trim_matches('-').to_string()
}

/// Three-colour DFS over the intra-repo import graph. Nodes and adjacency
/// lists are iterated in sorted order, so cycle strings are deterministic.
/// Each cycle renders as `a → b → … → a`.
fn find_cycles(packages: &[PackageEntry]) -> Vec<String> {
    let mut graph: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for pkg in packages {
        let mut neighbors: Vec<&str> = pkg.imports.iter().map(|s| s.as_str()).collect();
        neighbors.sort();
        graph.insert(pkg.name.as_str(), neighbors);
    }

    const WHITE: u8 = 0;
    const GRAY: u8 = 1;
    const BLACK: u8 = 2;

    struct Dfs<'a> {
        graph: &'a BTreeMap<&'a str, Vec<&'a str>>,
        color: HashMap<&'a str, u8>,
        path: Vec<&'a str>,
        cycles: Vec<String>,
    }

    impl<'a> Dfs<'a> {
        fn visit(&mut self, node: &'a str) {
            match self.color.get(node).copied().unwrap_or(WHITE) {
                BLACK => return,
                GRAY => {
                    // Back edge to a gray ancestor: emit the cycle.
                    if let Some(start) = self.path.iter().position(|n| *n == node) {
                        let mut cycle: Vec<&str> = self.path[start..].to_vec();
                        cycle.push(node);
                        self.cycles.push(cycle.join(" → "));
                    }
                    return;
                }
                _ => {}
            }
            self.color.insert(node, GRAY);
            self.path.push(node);
            let graph = self.graph;
            if let Some(neighbors) = graph.get(node) {
                for &neighbor in neighbors {
                    if graph.contains_key(neighbor) {
                        self.visit(neighbor);
                    }
                }
            }
            self.path.pop();
            self.color.insert(node, BLACK);
        }
    }

    let mut dfs = Dfs {
        graph: &graph,
        color: HashMap::new(),
        path: Vec::new(),
        cycles: Vec::new(),
    };
    let nodes: Vec<&str> = graph.keys().copied().collect();
    for node in nodes {
        if dfs.color.get(node).copied().unwrap_or(WHITE) == WHITE {
            dfs.visit(node);
        }
    }
    dfs.cycles
}
