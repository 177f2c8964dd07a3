//! iguana — evidence-driven system modeler.
//!
//! A three-stage deterministic pipeline over a source tree:
//!
//! 1. Per-file static analysis produces an *evidence bundle* next to each
//!    source file: integrity hash, sorted symbol/import/call tables, and the
//!    seven behavioural signals.
//! 2. A set of bundles aggregates into a *system model*: package inventory,
//!    side-effect boundaries, effects, concurrency domains, and a bundle-set
//!    hash, plus inferred state domains linked back to effects.
//! 3. The model projects into a linked markdown *vault*.
//!
//! Correctness is byte-for-byte determinism: every emitted collection is
//! totally ordered, derived artifacts are content-addressed, and unchanged
//! inputs never touch disk (the skip-cache).
//!
//! # Architecture
//!
//! - `analysis`: tree-sitter parsing and per-file fact extraction
//! - `evidence`: bundle data model, builder, companion-file store, walker
//! - `model`: system model types, aggregation, up-to-date check
//! - `inference`: package summaries and the inference-provider seam
//! - `vault`: markdown projection and deterministic writing
//! - `settings`: workspace deny rules
//! - `frontmatter`: standalone markdown frontmatter codec
//! - `cli`: command surface (analyze / system-model / obsidian-vault)

pub mod analysis;
pub mod cli;
pub mod evidence;
pub mod frontmatter;
pub mod hash;
pub mod inference;
pub mod model;
pub mod settings;
pub mod vault;

pub use analysis::{parse, CallResolver, ParsedFile, TextualResolver};
pub use evidence::{build, EvidenceBundle, WalkReport, Walker, WriteOutcome};
pub use inference::{InferenceOutput, InferenceProvider, PackageSummary};
pub use model::{aggregate, SystemModel};
pub use settings::{DenyMatcher, Settings};
pub use vault::{project, write_vault};
