//! Go fact extraction using tree-sitter.
//!
//! Extracts:
//! - Package name and imports (with aliases)
//! - Top-level declarations: functions, methods, types, variables, constants
//! - Struct fields (exported, declaration order)
//! - Deduplicated outbound call edges with enclosing-function tracking
//! - Concurrency markers (goroutine launches, channel types)
//!
//! Type strings are rendered from the syntax tree: the current package is
//! unqualified, other packages keep their selector (`X.Sel`), pointers prefix
//! `*`, slices `[]T`, fixed-size arrays `[...]T`, maps `map[K]V`, channels
//! carry their direction, and a variadic last parameter is prefixed `...`.
//! Interface and struct literals render as `interface{}` and `struct{}`.

use std::collections::HashSet;

use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Query, QueryCursor};

use super::{
    is_exported, CallFact, CallResolver, FieldFact, FileFacts, FunctionFact, ImportFact, NameFact,
    ParsedFile, TypeFact, TypeKindFact,
};

/// Name used for call sites outside any function.
const GLOBAL_SCOPE: &str = "<global>";

/// Tree-sitter query for the package declaration.
const PACKAGE_QUERY: &str = r#"
(package_clause
  (package_identifier) @package_name
)
"#;

/// Extract all facts from a parsed file.
pub fn extract_facts(parsed: &ParsedFile, resolver: &dyn CallResolver) -> FileFacts {
    let root = parsed.tree.root_node();
    let mut facts = FileFacts {
        package: extract_package(parsed).unwrap_or_default(),
        imports: extract_imports(parsed, root),
        ..Default::default()
    };
    extract_declarations(parsed, root, &mut facts);

    let mut collector = CallCollector {
        resolver,
        stack: Vec::new(),
        seen: HashSet::new(),
    };
    collector.walk(parsed, root, &mut facts);

    facts
}

/// Extract the package name.
fn extract_package(parsed: &ParsedFile) -> Option<String> {
    let language: tree_sitter::Language = tree_sitter_go::LANGUAGE.into();
    let query = Query::new(&language, PACKAGE_QUERY).ok()?;
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

    if let Some(m) = matches.next() {
        for capture in m.captures {
            let name = query.capture_names()[capture.index as usize];
            if name == "package_name" {
                return Some(parsed.node_text(capture.node).to_string());
            }
        }
    }
    None
}

/// Extract imports in source order. Quotes and backticks are stripped from
/// the path; `.`/`_` imports keep the marker as their alias.
fn extract_imports(parsed: &ParsedFile, root: Node) -> Vec<ImportFact> {
    let mut imports = Vec::new();
    let mut cursor = root.walk();
    for decl in root.children(&mut cursor) {
        if decl.kind() != "import_declaration" {
            continue;
        }
        let mut decl_cursor = decl.walk();
        for child in decl.named_children(&mut decl_cursor) {
            match child.kind() {
                "import_spec" => push_import(parsed, child, &mut imports),
                "import_spec_list" => {
                    let mut list_cursor = child.walk();
                    for spec in child.named_children(&mut list_cursor) {
                        if spec.kind() == "import_spec" {
                            push_import(parsed, spec, &mut imports);
                        }
                    }
                }
                _ => {}
            }
        }
    }
    imports
}

fn push_import(parsed: &ParsedFile, spec: Node, out: &mut Vec<ImportFact>) {
    let Some(path_node) = spec.child_by_field_name("path") else {
        return;
    };
    let path = parsed
        .node_text(path_node)
        .trim_matches(|c| c == '"' || c == '`')
        .to_string();
    if path.is_empty() {
        return;
    }
    let alias = spec
        .child_by_field_name("name")
        .map(|n| parsed.node_text(n).to_string());
    out.push(ImportFact { path, alias });
}

/// Enumerate top-level declarations into the facts.
fn extract_declarations(parsed: &ParsedFile, root: Node, facts: &mut FileFacts) {
    let mut cursor = root.walk();
    for decl in root.children(&mut cursor) {
        match decl.kind() {
            "function_declaration" => {
                if let Some(fact) = extract_function(parsed, decl, None) {
                    facts.functions.push(fact);
                }
            }
            "method_declaration" => {
                let receiver = receiver_of(parsed, decl);
                if let Some(fact) = extract_function(parsed, decl, receiver) {
                    facts.functions.push(fact);
                }
            }
            "type_declaration" => extract_types(parsed, decl, facts),
            "var_declaration" => extract_value_names(parsed, decl, "var_spec", &mut facts.variables),
            "const_declaration" => {
                extract_value_names(parsed, decl, "const_spec", &mut facts.constants)
            }
            _ => {}
        }
    }
}

/// Build a FunctionFact from a function or method declaration node.
fn extract_function(parsed: &ParsedFile, node: Node, receiver: Option<String>) -> Option<FunctionFact> {
    let name = parsed.node_text(node.child_by_field_name("name")?).to_string();
    let params = params_of(parsed, node.child_by_field_name("parameters"));
    let returns = returns_of(parsed, node.child_by_field_name("result"));
    Some(FunctionFact {
        exported: is_exported(&name),
        name,
        receiver,
        params,
        returns,
    })
}

/// Render the receiver type of a method declaration (e.g. `*Config`).
fn receiver_of(parsed: &ParsedFile, method: Node) -> Option<String> {
    let list = method.child_by_field_name("receiver")?;
    let mut cursor = list.walk();
    let decl = list
        .named_children(&mut cursor)
        .find(|n| n.kind() == "parameter_declaration")?;
    let ty = decl.child_by_field_name("type")?;
    Some(render_type(parsed, ty))
}

/// Render each parameter in a parameter list, one entry per declared name
/// (or one per unnamed declaration). The variadic parameter is prefixed `...`.
fn params_of(parsed: &ParsedFile, list: Option<Node>) -> Vec<String> {
    let Some(list) = list else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut cursor = list.walk();
    for decl in list.named_children(&mut cursor) {
        match decl.kind() {
            "parameter_declaration" => {
                let ty = decl
                    .child_by_field_name("type")
                    .map(|t| render_type(parsed, t))
                    .unwrap_or_default();
                let mut name_cursor = decl.walk();
                let names = decl.children_by_field_name("name", &mut name_cursor).count();
                if names == 0 {
                    out.push(ty);
                } else {
                    for _ in 0..names {
                        out.push(ty.clone());
                    }
                }
            }
            "variadic_parameter_declaration" => {
                let ty = decl
                    .child_by_field_name("type")
                    .map(|t| render_type(parsed, t))
                    .unwrap_or_default();
                out.push(format!("...{}", ty));
            }
            _ => {}
        }
    }
    out
}

/// Render the return types of a function. The result may be a bare type or a
/// parenthesized (possibly named) parameter list.
fn returns_of(parsed: &ParsedFile, result: Option<Node>) -> Vec<String> {
    let Some(result) = result else {
        return Vec::new();
    };
    if result.kind() == "parameter_list" {
        return params_of(parsed, Some(result));
    }
    vec![render_type(parsed, result)]
}

/// Extract type declarations (plain, grouped, and aliases).
fn extract_types(parsed: &ParsedFile, decl: Node, facts: &mut FileFacts) {
    let mut cursor = decl.walk();
    for spec in decl.named_children(&mut cursor) {
        match spec.kind() {
            "type_spec" => {
                let Some(name_node) = spec.child_by_field_name("name") else {
                    continue;
                };
                let Some(ty) = spec.child_by_field_name("type") else {
                    continue;
                };
                let name = parsed.node_text(name_node).to_string();
                let (kind, fields) = match ty.kind() {
                    "struct_type" => (TypeKindFact::Struct, struct_fields(parsed, ty)),
                    "interface_type" => (TypeKindFact::Interface, Vec::new()),
                    _ => (TypeKindFact::Alias, Vec::new()),
                };
                facts.types.push(TypeFact {
                    exported: is_exported(&name),
                    name,
                    kind,
                    fields,
                });
            }
            "type_alias" => {
                let Some(name_node) = spec.child_by_field_name("name") else {
                    continue;
                };
                let name = parsed.node_text(name_node).to_string();
                facts.types.push(TypeFact {
                    exported: is_exported(&name),
                    name,
                    kind: TypeKindFact::Alias,
                    fields: Vec::new(),
                });
            }
            _ => {}
        }
    }
}

/// Collect exported struct fields in declaration order. An embedded
/// identifier (optionally pointer) contributes a field named after its base
/// type; qualified embeds and unexported fields are skipped.
fn struct_fields(parsed: &ParsedFile, struct_type: Node) -> Vec<FieldFact> {
    let mut fields = Vec::new();
    let Some(list) = struct_type
        .children(&mut struct_type.walk())
        .find(|n| n.kind() == "field_declaration_list")
    else {
        return fields;
    };
    let mut cursor = list.walk();
    for decl in list.named_children(&mut cursor) {
        if decl.kind() != "field_declaration" {
            continue;
        }
        let Some(ty) = decl.child_by_field_name("type") else {
            continue;
        };
        let mut name_cursor = decl.walk();
        let names: Vec<String> = decl
            .children_by_field_name("name", &mut name_cursor)
            .map(|n| parsed.node_text(n).to_string())
            .collect();

        if names.is_empty() {
            // Embedded field.
            let starred = decl.child(0).map(|c| c.kind() == "*").unwrap_or(false);
            if ty.kind() != "type_identifier" {
                continue;
            }
            let base = parsed.node_text(ty).to_string();
            if !is_exported(&base) {
                continue;
            }
            let rendered = render_type(parsed, ty);
            let type_str = if starred {
                format!("*{}", rendered)
            } else {
                rendered
            };
            fields.push(FieldFact {
                name: base,
                type_str,
            });
        } else {
            let type_str = render_type(parsed, ty);
            for name in names {
                if !is_exported(&name) {
                    continue;
                }
                fields.push(FieldFact {
                    name,
                    type_str: type_str.clone(),
                });
            }
        }
    }
    fields
}

/// Collect declared names from `var` / `const` declarations, including
/// grouped forms.
fn extract_value_names(parsed: &ParsedFile, decl: Node, spec_kind: &str, out: &mut Vec<NameFact>) {
    let mut cursor = decl.walk();
    for child in decl.named_children(&mut cursor) {
        if child.kind() == spec_kind {
            push_value_names(parsed, child, out);
        } else if child.kind() == "var_spec_list" || child.kind() == "const_spec_list" {
            let mut list_cursor = child.walk();
            for spec in child.named_children(&mut list_cursor) {
                if spec.kind() == spec_kind {
                    push_value_names(parsed, spec, out);
                }
            }
        }
    }
}

fn push_value_names(parsed: &ParsedFile, spec: Node, out: &mut Vec<NameFact>) {
    let mut cursor = spec.walk();
    for name_node in spec.children_by_field_name("name", &mut cursor) {
        let name = parsed.node_text(name_node).to_string();
        out.push(NameFact {
            exported: is_exported(&name),
            name,
        });
    }
}

/// Render a type expression to its canonical string form.
fn render_type(parsed: &ParsedFile, node: Node) -> String {
    match node.kind() {
        "type_identifier" | "identifier" | "package_identifier" => {
            parsed.node_text(node).to_string()
        }
        "qualified_type" => {
            let pkg = node
                .child_by_field_name("package")
                .map(|n| parsed.node_text(n))
                .unwrap_or("");
            let name = node
                .child_by_field_name("name")
                .map(|n| parsed.node_text(n))
                .unwrap_or("");
            format!("{}.{}", pkg, name)
        }
        "pointer_type" => {
            let inner = node
                .named_child(0)
                .map(|n| render_type(parsed, n))
                .unwrap_or_default();
            format!("*{}", inner)
        }
        "slice_type" => {
            let elem = node
                .child_by_field_name("element")
                .map(|n| render_type(parsed, n))
                .unwrap_or_default();
            format!("[]{}", elem)
        }
        "array_type" => {
            // Fixed-size; the length is elided from the canonical form.
            let elem = node
                .child_by_field_name("element")
                .map(|n| render_type(parsed, n))
                .unwrap_or_default();
            format!("[...]{}", elem)
        }
        "map_type" => {
            let key = node
                .child_by_field_name("key")
                .map(|n| render_type(parsed, n))
                .unwrap_or_default();
            let value = node
                .child_by_field_name("value")
                .map(|n| render_type(parsed, n))
                .unwrap_or_default();
            format!("map[{}]{}", key, value)
        }
        "channel_type" => {
            let value = node
                .child_by_field_name("value")
                .map(|n| render_type(parsed, n))
                .unwrap_or_default();
            let first = node.child(0).map(|c| c.kind());
            let second = node.child(1).map(|c| c.kind());
            if first == Some("<-") {
                format!("<-chan {}", value)
            } else if second == Some("<-") {
                format!("chan<- {}", value)
            } else {
                format!("chan {}", value)
            }
        }
        "interface_type" => "interface{}".to_string(),
        "struct_type" => "struct{}".to_string(),
        "function_type" => "func(...)".to_string(),
        "parenthesized_type" => {
            let inner = node
                .named_child(0)
                .map(|n| render_type(parsed, n))
                .unwrap_or_default();
            format!("({})", inner)
        }
        "generic_type" => node
            .child_by_field_name("type")
            .map(|n| render_type(parsed, n))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Walks the tree collecting call edges and concurrency markers while
/// tracking the enclosing function.
struct CallCollector<'a> {
    resolver: &'a dyn CallResolver,
    stack: Vec<String>,
    seen: HashSet<(String, String)>,
}

impl<'a> CallCollector<'a> {
    fn current(&self) -> String {
        self.stack
            .last()
            .cloned()
            .unwrap_or_else(|| GLOBAL_SCOPE.to_string())
    }

    fn walk(&mut self, parsed: &ParsedFile, node: Node, facts: &mut FileFacts) {
        let mut pushed = false;
        match node.kind() {
            "function_declaration" => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| parsed.node_text(n).to_string())
                    .unwrap_or_default();
                self.stack.push(name);
                pushed = true;
            }
            "method_declaration" => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| parsed.node_text(n).to_string())
                    .unwrap_or_default();
                let qualified = match receiver_of(parsed, node) {
                    Some(recv) if !recv.is_empty() => format!("{}.{}", recv, name),
                    _ => name,
                };
                self.stack.push(qualified);
                pushed = true;
            }
            "func_literal" => {
                self.stack.push(format!("{}.<anonymous>", self.current()));
                pushed = true;
            }
            "call_expression" => {
                if let Some(func) = node.child_by_field_name("function") {
                    if let Some(to) = self.resolver.resolve(func, &parsed.source) {
                        let from = self.current();
                        if self.seen.insert((from.clone(), to.clone())) {
                            facts.calls.push(CallFact { from, to });
                        }
                    }
                }
            }
            "go_statement" => facts.has_go_statement = true,
            "channel_type" => facts.has_channel_type = true,
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(parsed, child, facts);
        }

        if pushed {
            self.stack.pop();
        }
    }
}
