//! AST-backed source analysis.
//!
//! This module parses one Go source file with tree-sitter and extracts the
//! "facts" the evidence builder consumes: package metadata, imports,
//! top-level declarations with rendered type strings, the outbound call
//! graph, and the concurrency markers used by the signal derivation.
//!
//! Tree-sitter provides no cross-file type information, so call targets are
//! resolved best-effort from selector text. The [`CallResolver`] trait is the
//! seam for that resolution; [`TextualResolver`] is the production
//! implementation, and tests can substitute their own.

mod go;
mod resolver;

pub use go::extract_facts;
pub use resolver::{CallResolver, TextualResolver};

use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

/// Errors raised while parsing a source file.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("parse {path}: source contains syntax errors")]
    Syntax { path: String },
    #[error("parse {path}: {message}")]
    Parser { path: String, message: String },
}

/// A parsed source file: the syntax tree plus the source it was built from.
pub struct ParsedFile {
    pub tree: Tree,
    pub source: Vec<u8>,
    pub path: String,
}

impl ParsedFile {
    /// Get the text of a node from the source.
    pub fn node_text(&self, node: Node) -> &str {
        node.utf8_text(&self.source).unwrap_or("")
    }
}

/// Parse `bytes` as Go source. Fails on syntactically invalid input; the
/// caller accumulates the failure and moves on to the next file.
pub fn parse(path: &str, bytes: &[u8]) -> Result<ParsedFile, ParseError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| ParseError::Parser {
            path: path.to_string(),
            message: e.to_string(),
        })?;
    let tree = parser.parse(bytes, None).ok_or_else(|| ParseError::Parser {
        path: path.to_string(),
        message: "failed to parse source".to_string(),
    })?;
    if tree.root_node().has_error() {
        return Err(ParseError::Syntax {
            path: path.to_string(),
        });
    }
    Ok(ParsedFile {
        tree,
        source: bytes.to_vec(),
        path: path.to_string(),
    })
}

/// Whether a Go identifier is exported (first character uppercase).
pub fn is_exported(name: &str) -> bool {
    name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
}

/// An import declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFact {
    pub path: String,
    pub alias: Option<String>,
}

/// A top-level function or method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionFact {
    pub name: String,
    pub exported: bool,
    /// Rendered receiver type for methods (e.g. `*Config`); `None` for plain
    /// functions.
    pub receiver: Option<String>,
    pub params: Vec<String>,
    pub returns: Vec<String>,
}

/// Kind of a top-level type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKindFact {
    Struct,
    Interface,
    Alias,
}

/// A struct field (exported fields only; declaration order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFact {
    pub name: String,
    pub type_str: String,
}

/// A top-level type declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeFact {
    pub name: String,
    pub kind: TypeKindFact,
    pub exported: bool,
    pub fields: Vec<FieldFact>,
}

/// A top-level variable or constant declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameFact {
    pub name: String,
    pub exported: bool,
}

/// One outbound call edge: enclosing function → qualified target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFact {
    pub from: String,
    pub to: String,
}

/// Everything extracted from a single parsed file. Collections preserve
/// source order; the evidence builder applies the canonical sorts.
#[derive(Debug, Clone, Default)]
pub struct FileFacts {
    pub package: String,
    pub imports: Vec<ImportFact>,
    pub functions: Vec<FunctionFact>,
    pub types: Vec<TypeFact>,
    pub variables: Vec<NameFact>,
    pub constants: Vec<NameFact>,
    pub calls: Vec<CallFact>,
    pub has_go_statement: bool,
    pub has_channel_type: bool,
}
