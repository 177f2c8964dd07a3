//! Deterministic tree walk driving per-file bundle generation.
//!
//! Skip rules, applied on each directory entry:
//!   - directories named `vendor`, `testdata`, `examples`, `docs`, or
//!     starting with `.` are skipped entirely
//!   - `_test.go` files are skipped; only `.go` files are consumed
//!   - any entry whose root-relative forward-slash path matches the deny
//!     matcher is skipped
//!
//! Entries are visited in sorted order. Files are grouped per directory and
//! directories are processed as independent batches (no parse state is
//! shared), so batches run in parallel; the only shared state is the progress
//! counter, and every observable output is re-sorted downstream.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::analysis;
use crate::settings::DenyMatcher;

use super::{build, store, EvidenceError, WriteOutcome};

/// Directory names excluded from every walk.
const SKIP_DIRS: &[&str] = &["vendor", "testdata", "examples", "docs"];

/// Progress callback: (files processed, total files).
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Accumulated result of a walk. Single-file failures are collected here so
/// one bad file does not stop the others.
#[derive(Default)]
pub struct WalkReport {
    pub written: usize,
    pub skipped: usize,
    pub errors: Vec<(String, EvidenceError)>,
}

impl WalkReport {
    fn merge(&mut self, other: WalkReport) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }
}

/// Walks an analysis root and writes one evidence bundle per source file.
pub struct Walker<'a> {
    root: PathBuf,
    deny: &'a DenyMatcher,
    force: bool,
    progress: Option<ProgressCallback>,
}

impl<'a> Walker<'a> {
    pub fn new<P: AsRef<Path>>(root: P, deny: &'a DenyMatcher) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            deny,
            force: false,
            progress: None,
        }
    }

    /// Bypass the per-file skip-cache.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set a progress callback invoked as files are processed.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Run the walk. Structural failures (unreadable root) are fatal;
    /// per-file failures land in the report.
    pub fn run(&self) -> anyhow::Result<WalkReport> {
        let files_by_dir = self.collect_files()?;
        let total: usize = files_by_dir.values().map(|v| v.len()).sum();
        let processed = AtomicUsize::new(0);

        let reports: Vec<WalkReport> = files_by_dir
            .par_iter()
            .map(|(_dir, files)| {
                let mut report = WalkReport::default();
                for file in files {
                    match self.process_file(file) {
                        Ok(WriteOutcome::Written) => report.written += 1,
                        Ok(WriteOutcome::Skipped) => report.skipped += 1,
                        Err(e) => {
                            let rel = self.rel_slash(file);
                            report.errors.push((rel, e));
                        }
                    }
                    let current = processed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(ref cb) = self.progress {
                        cb(current, total);
                    }
                }
                report
            })
            .collect();

        let mut merged = WalkReport::default();
        for report in reports {
            merged.merge(report);
        }
        Ok(merged)
    }

    /// Collect source files grouped by directory, in sorted order.
    fn collect_files(&self) -> anyhow::Result<BTreeMap<PathBuf, Vec<PathBuf>>> {
        let mut files_by_dir: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();

        let walker = WalkDir::new(&self.root)
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
                !self.deny.is_denied(&self.rel_slash(entry.path()))
            });

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !name.ends_with(".go") || name.ends_with("_test.go") {
                continue;
            }
            let path = entry.path().to_path_buf();
            let dir = path.parent().unwrap_or(&self.root).to_path_buf();
            files_by_dir.entry(dir).or_default().push(path);
        }

        for files in files_by_dir.values_mut() {
            files.sort();
        }
        Ok(files_by_dir)
    }

    fn process_file(&self, path: &Path) -> Result<WriteOutcome, EvidenceError> {
        let rel = self.rel_slash(path);
        build_and_write(path, &rel, self.force)
    }

    fn rel_slash(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// Analyze one source file and write its companion bundle. `rel` is the
/// root-relative forward-slash path recorded in the bundle.
fn build_and_write(path: &Path, rel: &str, force: bool) -> Result<WriteOutcome, EvidenceError> {
    let bytes = fs::read(path).map_err(|e| EvidenceError::Read {
        path: rel.to_string(),
        source: e,
    })?;
    let parsed = analysis::parse(rel, &bytes)?;
    let bundle = build(rel, &bytes, &parsed);
    store::write(&bundle, path, force)
}

/// Single-file mode: the given path is used as the bundle path verbatim
/// (slash-normalized).
pub fn analyze_file(path: &Path, force: bool) -> Result<WriteOutcome, EvidenceError> {
    let rel = path.to_string_lossy().replace('\\', "/");
    build_and_write(path, &rel, force)
}
