//! Call-target resolution.
//!
//! Without cross-file type information, a call target can only be qualified
//! from what the call site spells out. `TextualResolver` implements that
//! best-effort rule: the selector's left-hand identifier is taken as the
//! target package (`yaml.Marshal` → `yaml.Marshal`), bare identifiers resolve
//! to themselves, and anonymous targets resolve to nothing.

use tree_sitter::Node;

/// Maps an expression in call position to a qualified target string.
pub trait CallResolver {
    /// Resolve the function expression of a call. Returns `None` for
    /// unresolvable or anonymous targets.
    fn resolve(&self, func: Node, source: &[u8]) -> Option<String>;
}

/// Best-effort textual resolution over the syntax tree alone.
pub struct TextualResolver;

impl CallResolver for TextualResolver {
    fn resolve(&self, func: Node, source: &[u8]) -> Option<String> {
        match func.kind() {
            "selector_expression" => {
                let field = func.child_by_field_name("field")?;
                let sel = field.utf8_text(source).ok()?;
                let operand = func.child_by_field_name("operand")?;
                if operand.kind() == "identifier" {
                    let left = operand.utf8_text(source).ok()?;
                    Some(format!("{}.{}", left, sel))
                } else {
                    // Chained or computed receiver: keep the method name only.
                    Some(sel.to_string())
                }
            }
            "identifier" => func.utf8_text(source).ok().map(|s| s.to_string()),
            "parenthesized_expression" => {
                let inner = func.named_child(0)?;
                self.resolve(inner, source)
            }
            // Calling a function literal inline is not a named target.
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::parse;

    fn resolve_targets(source: &str) -> Vec<String> {
        let parsed = parse("test.go", source.as_bytes()).unwrap();
        let resolver = TextualResolver;
        let mut out = Vec::new();
        collect(parsed.tree.root_node(), &parsed.source, &resolver, &mut out);
        out
    }

    fn collect(node: Node, source: &[u8], resolver: &TextualResolver, out: &mut Vec<String>) {
        if node.kind() == "call_expression" {
            if let Some(func) = node.child_by_field_name("function") {
                if let Some(target) = resolver.resolve(func, source) {
                    out.push(target);
                }
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            collect(child, source, resolver, out);
        }
    }

    #[test]
    fn test_selector_with_identifier_operand() {
        let targets = resolve_targets(
            "package main\n\nfunc f() {\n\tos.ReadFile(\"x\")\n}\n",
        );
        assert_eq!(targets, vec!["os.ReadFile"]);
    }

    #[test]
    fn test_bare_identifier() {
        let targets = resolve_targets("package main\n\nfunc f() {\n\thelper()\n}\n");
        assert_eq!(targets, vec!["helper"]);
    }

    #[test]
    fn test_chained_selector_keeps_method_name() {
        let targets =
            resolve_targets("package main\n\nfunc f() {\n\tc.client.Do(req)\n}\n");
        assert_eq!(targets, vec!["Do"]);
    }

    #[test]
    fn test_builtin_call() {
        let targets = resolve_targets(
            "package main\n\nfunc f() {\n\t_ = make([]int, 0)\n}\n",
        );
        assert_eq!(targets, vec!["make"]);
    }
}
