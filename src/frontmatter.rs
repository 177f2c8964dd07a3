//! Markdown frontmatter codec.
//!
//! A self-contained two-function module for markdown documents that carry a
//! YAML block between `---` delimiters. It shares no types with the evidence
//! bundle codec: bundles are pure YAML files, while vault pages are markdown
//! with a leading frontmatter block.

use serde::Serialize;
use thiserror::Error;

/// Errors raised while splitting a frontmatter document.
#[derive(Error, Debug)]
pub enum FrontmatterError {
    #[error("frontmatter: missing opening --- delimiter")]
    MissingOpen,
    #[error("frontmatter: missing closing --- delimiter")]
    MissingClose,
    #[error("frontmatter: marshal: {0}")]
    Marshal(#[from] serde_yaml::Error),
}

/// Marshal `value` as YAML frontmatter and concatenate `body`, returning the
/// complete markdown document with `---` delimiters.
pub fn encode<T: Serialize>(value: &T, body: &str) -> Result<Vec<u8>, FrontmatterError> {
    let yaml = serde_yaml::to_string(value)?;
    let mut out = Vec::with_capacity(yaml.len() + body.len() + 8);
    out.extend_from_slice(b"---\n");
    out.extend_from_slice(yaml.as_bytes());
    out.extend_from_slice(b"---\n");
    out.extend_from_slice(body.as_bytes());
    Ok(out)
}

/// Split a markdown document into its raw frontmatter bytes and body.
///
/// The document must begin with `---\n`; the next line whose first three
/// bytes are `---` closes the block. One newline following the closing
/// delimiter is consumed.
pub fn decode(data: &[u8]) -> Result<(Vec<u8>, Vec<u8>), FrontmatterError> {
    const OPEN: &[u8] = b"---\n";
    if !data.starts_with(OPEN) {
        return Err(FrontmatterError::MissingOpen);
    }
    let rest = &data[OPEN.len()..];
    let idx = find(rest, b"\n---").ok_or(FrontmatterError::MissingClose)?;
    let fm = &rest[..idx];
    // Skip past the closing delimiter and one optional newline.
    let mut tail = &rest[idx + 4..];
    if let Some((b'\n', after)) = tail.split_first() {
        tail = after;
    }
    Ok((fm.to_vec(), tail.to_vec()))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Meta {
        tags: Vec<String>,
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let meta = Meta {
            tags: vec!["state-domain".to_string()],
        };
        let doc = encode(&meta, "# Title\n\nBody.\n").unwrap();
        assert!(doc.starts_with(b"---\n"));

        let (fm, body) = decode(&doc).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_slice(&fm).unwrap();
        assert_eq!(parsed["tags"][0], "state-domain");
        assert_eq!(body, b"# Title\n\nBody.\n");
    }

    #[test]
    fn test_decode_missing_open() {
        let err = decode(b"# No frontmatter\n");
        assert!(matches!(err, Err(FrontmatterError::MissingOpen)));
    }

    #[test]
    fn test_decode_missing_close() {
        let err = decode(b"---\ntags:\n  - x\n");
        assert!(matches!(err, Err(FrontmatterError::MissingClose)));
    }

    #[test]
    fn test_decode_preserves_leading_blank_line_in_body() {
        // Vault pages separate frontmatter from body with one blank line.
        let doc = b"---\ntags:\n  - iguana/index\n---\n\n# System Model\n";
        let (fm, body) = decode(doc).unwrap();
        assert_eq!(fm, b"tags:\n  - iguana/index");
        assert_eq!(body, b"\n# System Model\n");
    }
}
