//! Command-line interface.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::evidence::{analyze_file, WalkReport, Walker, WriteOutcome};
use crate::model::{self, MODEL_FILE};
use crate::settings::{DenyMatcher, Settings};
use crate::vault;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Evidence-driven system modeler.
///
/// Analyzes a source tree into deterministic per-file evidence bundles,
/// aggregates them into a system model, and projects the model into a linked
/// markdown vault.
#[derive(Parser)]
#[command(name = "iguana")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a file or source tree and write companion evidence bundles
    Analyze(AnalyzeArgs),
    /// Aggregate evidence bundles into a system model
    #[command(name = "system-model")]
    SystemModel(SystemModelArgs),
    /// Project a system model into an Obsidian-compatible markdown vault
    #[command(name = "obsidian-vault")]
    ObsidianVault(VaultArgs),
}

/// Arguments for the analyze command.
#[derive(Parser)]
pub struct AnalyzeArgs {
    /// Path to analyze (a .go file or a directory)
    pub path: PathBuf,

    /// Rewrite bundles even when the source content is unchanged
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the system-model command.
#[derive(Parser)]
pub struct SystemModelArgs {
    /// Analysis root containing evidence bundles
    pub root: PathBuf,

    /// Output path (default: <root>/system_model.yaml)
    pub output: Option<PathBuf>,

    /// Regenerate even when the stored bundle-set hash is current
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the obsidian-vault command.
#[derive(Parser)]
pub struct VaultArgs {
    /// Analysis root containing system_model.yaml
    pub root: PathBuf,

    /// Vault output directory
    pub output: PathBuf,
}

/// Load workspace settings and compile the deny matcher. A missing settings
/// file denies nothing; an unparseable one is fatal.
fn load_deny_matcher(root: &Path) -> anyhow::Result<DenyMatcher> {
    let settings = Settings::load(root)?;
    Ok(DenyMatcher::from_settings(settings.as_ref()))
}

/// Run the analyze command.
pub fn run_analyze(args: &AnalyzeArgs) -> anyhow::Result<i32> {
    let metadata = match std::fs::metadata(&args.path) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: cannot access path {:?}: {}", args.path, e);
            return Ok(EXIT_ERROR);
        }
    };

    // Single-file mode.
    if metadata.is_file() {
        if args.path.extension().and_then(|e| e.to_str()) != Some("go") {
            eprintln!("Error: {:?} is not a .go file", args.path);
            return Ok(EXIT_ERROR);
        }
        match analyze_file(&args.path, args.force) {
            Ok(WriteOutcome::Written) => {
                println!("wrote {}.evidence.yaml", args.path.display());
            }
            Ok(WriteOutcome::Skipped) => {
                println!("{}.evidence.yaml up to date", args.path.display());
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
        return Ok(EXIT_SUCCESS);
    }

    let start = Instant::now();
    let deny = load_deny_matcher(&args.path)?;

    let pb = ProgressBar::hidden();
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    let pb_clone = pb.clone();

    let report: WalkReport = Walker::new(&args.path, &deny)
        .force(args.force)
        .with_progress(move |current, total| {
            // The bar only appears for walks big enough to watch.
            if total > 10 && pb_clone.is_hidden() {
                pb_clone.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                pb_clone.set_length(total as u64);
            }
            pb_clone.set_position(current as u64);
        })
        .run()?;
    pb.finish_and_clear();

    for (path, err) in &report.errors {
        eprintln!("{}: {}: {}", "error".red(), path, err);
    }
    if report.skipped > 0 {
        println!("skipped {} up-to-date bundles", report.skipped);
    }
    println!("wrote {} bundles, {} errors", report.written, report.errors.len());
    if start.elapsed().as_secs_f32() > 1.0 {
        eprintln!("  {} {:.1}s", "✓".green(), start.elapsed().as_secs_f32());
    }

    if report.errors.is_empty() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILED)
    }
}

/// Run the system-model command.
///
/// The inference provider is an external collaborator; without one the model
/// carries empty inferred sections and unlinked effects.
pub fn run_system_model(args: &SystemModelArgs) -> anyhow::Result<i32> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.root.join(MODEL_FILE));
    let deny = load_deny_matcher(&args.root)?;

    if !args.force && model::up_to_date(&args.root, &output, &deny)? {
        println!("{} up to date", output.display());
        return Ok(EXIT_SUCCESS);
    }

    let generated = model::aggregate::generate(&args.root, None, &deny)?;
    model::write(&generated, &output)?;
    println!(
        "wrote {} ({} packages, {} effects)",
        output.display(),
        generated.inventory.packages.len(),
        generated.effects.len()
    );
    Ok(EXIT_SUCCESS)
}

/// Run the obsidian-vault command.
pub fn run_obsidian_vault(args: &VaultArgs) -> anyhow::Result<i32> {
    let model_path = args.root.join(MODEL_FILE);
    if !model_path.exists() {
        eprintln!(
            "Error: {} not found (run 'iguana system-model {}' first)",
            model_path.display(),
            args.root.display()
        );
        return Ok(EXIT_ERROR);
    }

    let loaded = model::read(&model_path)?;
    let pages = vault::project(&loaded);
    vault::write_vault(&pages, &args.output)?;
    println!(
        "wrote vault to {} ({} pages)",
        args.output.display(),
        pages.len()
    );
    Ok(EXIT_SUCCESS)
}
