//! Companion-file persistence for evidence bundles.
//!
//! The companion file for a source is `<source>.evidence.yaml`, written next
//! to it. The skip-cache protocol keeps unchanged trees untouched: when the
//! stored bundle's hash matches the candidate's, the write is skipped and the
//! file is never opened for writing.

use std::fs;
use std::path::{Path, PathBuf};

use crate::hash::sha256_hex;

use super::{decode, encode, EvidenceBundle, EvidenceError, COMPANION_SUFFIX};

/// Result of a bundle write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Skipped,
}

/// The companion bundle path for a source file: the literal source path with
/// `.evidence.yaml` appended.
pub fn companion_path(source_path: &Path) -> PathBuf {
    let mut os = source_path.as_os_str().to_os_string();
    os.push(COMPANION_SUFFIX);
    PathBuf::from(os)
}

/// Write `bundle` to the companion path of `source_path`.
///
/// Skip protocol: unless `force` is set, an existing companion whose stored
/// `file.sha256` equals the candidate's is left untouched and `Skipped` is
/// returned. An existing companion that fails to decode is treated as stale
/// and overwritten.
pub fn write(
    bundle: &EvidenceBundle,
    source_path: &Path,
    force: bool,
) -> Result<WriteOutcome, EvidenceError> {
    let companion = companion_path(source_path);

    if !force {
        if let Ok(existing) = fs::read(&companion) {
            if let Ok(stored) = decode(&existing) {
                if stored.file.sha256 == bundle.file.sha256 {
                    return Ok(WriteOutcome::Skipped);
                }
            }
        }
    }

    let yaml = encode(bundle).map_err(|e| EvidenceError::Decode {
        path: companion.display().to_string(),
        message: e.to_string(),
    })?;
    fs::write(&companion, yaml).map_err(|e| EvidenceError::Write {
        path: companion.display().to_string(),
        source: e,
    })?;
    Ok(WriteOutcome::Written)
}

/// Read and decode a companion bundle file.
pub fn read(path: &Path) -> Result<EvidenceBundle, EvidenceError> {
    let data = fs::read(path).map_err(|e| EvidenceError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    decode(&data).map_err(|e| EvidenceError::Decode {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Re-hash the bundle's source file (resolved against `root`) and fail with
/// `Stale` if the content hash has changed. The source file is not modified.
pub fn validate(bundle: &EvidenceBundle, root: &Path) -> Result<(), EvidenceError> {
    let source_path = root.join(&bundle.file.path);
    let raw = fs::read(&source_path).map_err(|e| EvidenceError::Read {
        path: source_path.display().to_string(),
        source: e,
    })?;
    let current = sha256_hex(&raw);
    if current != bundle.file.sha256 {
        return Err(EvidenceError::Stale {
            path: bundle.file.path.clone(),
            stored: bundle.file.sha256.clone(),
            current,
        });
    }
    Ok(())
}
