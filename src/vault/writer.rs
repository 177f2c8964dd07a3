//! Vault writing.
//!
//! Writes the projector's output byte-for-byte, in sorted path order.
//! The `domains/` and `graphs/` subdirectories are always created, even when
//! the projection put nothing in them. Existing files are overwritten; the
//! vault is a replaceable derived artifact.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;

/// Write every page under `output_dir`, creating parent directories as
/// needed.
pub fn write_vault(pages: &BTreeMap<String, String>, output_dir: &Path) -> anyhow::Result<()> {
    for sub in ["domains", "graphs"] {
        fs::create_dir_all(output_dir.join(sub))
            .with_context(|| format!("mkdir {}", output_dir.join(sub).display()))?;
    }

    for (rel, content) in pages {
        let path = output_dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("mkdir {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;
    }
    Ok(())
}
