//! The primary chunking entry point: parse once, classify nodes table-driven
//! via `LanguageRules`, and walk depth-first emitting size-bounded
//! `RawChunk`s with hierarchy metadata (§4.2).

use tree_sitter::{Node, Parser, Tree};

use super::rules::{rules_for, LanguageRules, NodeClass, NAME_FALLBACK_KINDS};
use crate::errors::ChunkError;
use crate::types::{HierarchyEntry, HierarchyKind, RawChunk};

fn ts_language(tag: &str) -> Option<tree_sitter::Language> {
    match tag {
        "rust" => Some(tree_sitter_rust::LANGUAGE.into()),
        "python" => Some(tree_sitter_python::LANGUAGE.into()),
        "typescript" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "javascript" => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        #[cfg(feature = "lang-go")]
        "go" => Some(tree_sitter_go::LANGUAGE.into()),
        #[cfg(feature = "lang-java")]
        "java" => Some(tree_sitter_java::LANGUAGE.into()),
        #[cfg(feature = "lang-csharp")]
        "csharp" => Some(tree_sitter_c_sharp::LANGUAGE.into()),
        #[cfg(feature = "lang-php")]
        "php" => Some(tree_sitter_php::LANGUAGE_PHP.into()),
        #[cfg(feature = "lang-proto")]
        "proto" => Some(tree_sitter_proto::LANGUAGE.into()),
        #[cfg(feature = "lang-c")]
        "c" => Some(tree_sitter_c::LANGUAGE.into()),
        #[cfg(feature = "lang-cpp")]
        "cpp" => Some(tree_sitter_cpp::LANGUAGE.into()),
        #[cfg(feature = "lang-ruby")]
        "ruby" => Some(tree_sitter_ruby::LANGUAGE.into()),
        _ => None,
    }
}

pub fn has_grammar(tag: &str) -> bool {
    ts_language(tag).is_some()
}

fn parse(source: &[u8], tag: &str) -> Result<Tree, ChunkError> {
    let language = ts_language(tag).ok_or_else(|| ChunkError {
        path: String::new(),
        reason: format!("no grammar for language '{tag}'"),
    })?;
    let mut parser = Parser::new();
    parser.set_language(&language).map_err(|e| ChunkError {
        path: String::new(),
        reason: e.to_string(),
    })?;
    parser.parse(source, None).ok_or_else(|| ChunkError {
        path: String::new(),
        reason: "tree-sitter parse returned no tree".into(),
    })
}

fn node_name(node: Node, source: &[u8], rules: &LanguageRules) -> String {
    for field in rules.name_fields {
        if let Some(child) = node.child_by_field_name(field) {
            if let Ok(text) = child.utf8_text(source) {
                return text.to_string();
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if NAME_FALLBACK_KINDS.contains(&child.kind()) {
            if let Ok(text) = child.utf8_text(source) {
                return text.to_string();
            }
        }
    }
    "unnamed".to_string()
}

fn to_line(byte_row: usize) -> usize {
    byte_row + 1
}

struct Walker<'a> {
    source: &'a [u8],
    rules: &'a LanguageRules,
    max_chars: usize,
    out: Vec<RawChunk>,
    all_classes: Vec<String>,
    all_functions: Vec<String>,
}

impl<'a> Walker<'a> {
    fn emit(
        &mut self,
        node: Node,
        name: String,
        kind_label: &str,
        hierarchy: Vec<HierarchyEntry>,
        parent_name: Option<String>,
        parent_type: Option<String>,
        is_import: bool,
    ) {
        let text = node.utf8_text(self.source).unwrap_or("").to_string();
        self.out.push(RawChunk {
            node_name: name,
            node_type: kind_label.to_string(),
            start_line: to_line(node.start_position().row),
            end_line: to_line(node.end_position().row),
            parent_name,
            parent_type,
            text,
            hierarchy,
            is_import_block: is_import,
            is_other_block: false,
        });
    }

    /// Emit an unclassified node (module-level statement, bare expression,
    /// `if __name__ == "__main__":` block, etc.) verbatim instead of
    /// dropping it — `visit` only calls this once it has confirmed the node
    /// contains no nested class/function/import it would otherwise recurse
    /// into and capture.
    fn emit_other(&mut self, node: Node, ancestors: &[HierarchyEntry]) {
        let text = node.utf8_text(self.source).unwrap_or("").to_string();
        let parent = ancestors.last().cloned();
        self.out.push(RawChunk {
            node_name: "unnamed".to_string(),
            node_type: node.kind().to_string(),
            start_line: to_line(node.start_position().row),
            end_line: to_line(node.end_position().row),
            parent_name: parent.as_ref().map(|h| h.value.clone()),
            parent_type: parent.as_ref().map(|h| format!("{:?}", h.kind)),
            text,
            hierarchy: ancestors.to_vec(),
            is_import_block: false,
            is_other_block: true,
        });
    }

    /// Whether `node` or any of its descendants is itself a class-like,
    /// function-like, import-like, or decorator-wrapped node — i.e. whether
    /// recursing into it would actually surface a chunk, as opposed to
    /// recursing past it forever and emitting nothing (§4.2/§8 coverage
    /// invariant).
    fn has_classified_descendant(&self, node: Node) -> bool {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            let kind = child.kind();
            if self.rules.class_kinds.contains(&kind)
                || self.rules.function_kinds.contains(&kind)
                || self.rules.import_kinds.contains(&kind)
                || self.rules.decorator_wrapper_kinds.contains(&kind)
            {
                return true;
            }
            if self.has_classified_descendant(child) {
                return true;
            }
        }
        false
    }

    /// Depth-first walk. `ancestors` is the live stack of containing
    /// class-like/namespace-like scopes, outermost first.
    fn walk(&mut self, node: Node, ancestors: &mut Vec<HierarchyEntry>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, ancestors);
        }
    }

    fn visit(&mut self, node: Node, ancestors: &mut Vec<HierarchyEntry>) {
        let kind = node.kind();

        // Python decorators: the wrapper node already spans the stacked
        // `@decorator` lines plus the definition, so we classify by the
        // inner definition but emit the wrapper's own (wider) span.
        if self.rules.decorator_wrapper_kinds.contains(&kind) {
            let inner = node.child_by_field_name("definition").unwrap_or(node);
            let inner_kind = inner.kind();
            if self.rules.class_kinds.contains(&inner_kind) {
                self.handle_class_like(node, inner, ancestors);
            } else if self.rules.function_kinds.contains(&inner_kind) {
                self.handle_function_like(node, inner, ancestors);
            } else if self.has_classified_descendant(node) {
                self.walk(node, ancestors);
            } else {
                self.emit_other(node, ancestors);
            }
            return;
        }

        match self.rules.classify(kind) {
            NodeClass::ClassLike => self.handle_class_like(node, node, ancestors),
            NodeClass::FunctionLike => self.handle_function_like(node, node, ancestors),
            NodeClass::ImportLike => {
                let name = node_name(node, self.source, self.rules);
                self.emit(
                    node,
                    name,
                    kind,
                    ancestors.clone(),
                    ancestors.last().map(|h| h.value.clone()),
                    ancestors.last().map(|h| format!("{:?}", h.kind)),
                    true,
                );
            }
            NodeClass::DecoratorWrapper | NodeClass::Other => {
                if self.has_classified_descendant(node) {
                    self.walk(node, ancestors);
                } else {
                    self.emit_other(node, ancestors);
                }
            }
        }
    }

    fn handle_class_like(&mut self, span_node: Node, name_node: Node, ancestors: &mut Vec<HierarchyEntry>) {
        let name = node_name(name_node, self.source, self.rules);
        self.all_classes.push(name.clone());

        let byte_len = span_node.byte_range().len();
        if byte_len > self.max_chars {
            // Oversized: don't emit the class as a whole, recurse into its
            // children so member functions still become individual chunks.
            ancestors.push(HierarchyEntry {
                kind: HierarchyKind::Class,
                value: name,
                is_breakable_node: true,
            });
            self.walk(span_node, ancestors);
            ancestors.pop();
        } else {
            let parent = ancestors.last().cloned();
            self.emit(
                span_node,
                name,
                name_node.kind(),
                ancestors.clone(),
                parent.as_ref().map(|h| h.value.clone()),
                parent.as_ref().map(|h| format!("{:?}", h.kind)),
                false,
            );
        }
    }

    fn handle_function_like(&mut self, span_node: Node, name_node: Node, ancestors: &mut Vec<HierarchyEntry>) {
        let name = node_name(name_node, self.source, self.rules);
        self.all_functions.push(name.clone());

        let byte_len = span_node.byte_range().len();
        let parent = ancestors.last().cloned();
        if byte_len > self.max_chars {
            // Indivisible at this granularity (no nested class-like scopes
            // expected inside a function in these grammars); emit anyway —
            // a function is the smallest structural unit we classify.
            let has_nested_classish = {
                let mut cursor = span_node.walk();
                span_node
                    .children(&mut cursor)
                    .any(|c| self.rules.class_kinds.contains(&c.kind()) || self.rules.function_kinds.contains(&c.kind()))
            };
            if has_nested_classish {
                ancestors.push(HierarchyEntry {
                    kind: HierarchyKind::Function,
                    value: name,
                    is_breakable_node: true,
                });
                self.walk(span_node, ancestors);
                ancestors.pop();
                return;
            }
        }
        self.emit(
            span_node,
            name,
            name_node.kind(),
            ancestors.clone(),
            parent.as_ref().map(|h| h.value.clone()),
            parent.as_ref().map(|h| format!("{:?}", h.kind)),
            false,
        );
    }
}

/// Merge consecutive import-like chunks separated only by blank/comment
/// lines into one `imports_block` span (§4.2 step 3), and likewise merge
/// consecutive unclassified ("other") chunks into one `statements_block`
/// span so a run of module-level statements doesn't explode into one chunk
/// per statement.
fn coalesce_imports(mut chunks: Vec<RawChunk>) -> Vec<RawChunk> {
    chunks.sort_by_key(|c| c.start_line);
    let mut out: Vec<RawChunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks.into_iter() {
        if chunk.is_import_block || chunk.is_other_block {
            if let Some(last) = out.last_mut() {
                let same_class = last.is_import_block == chunk.is_import_block && last.is_other_block == chunk.is_other_block;
                if same_class && chunk.start_line <= last.end_line + 3 {
                    last.end_line = last.end_line.max(chunk.end_line);
                    last.text.push('\n');
                    last.text.push_str(&chunk.text);
                    let label = if chunk.is_import_block { "imports_block" } else { "statements_block" };
                    last.node_name = label.to_string();
                    last.node_type = label.to_string();
                    continue;
                }
            }
        }
        out.push(chunk);
    }
    out
}

/// `extract(bytes, language) -> [RawChunk]` (§4.2).
///
/// Returns an empty vec (not an error) when there's no tree-sitter grammar
/// for `language`, matching §4.2's "parse failure yields zero chunks ...
/// reported as unsupported rather than fatal" — callers that want the
/// regex-based fallback should check `has_grammar` first or use
/// `crate::chunker::chunk_file`, which does this automatically.
pub fn extract(source: &[u8], language: &str, max_chars: usize) -> Result<Vec<RawChunk>, ChunkError> {
    let rules = match rules_for(language) {
        Some(r) => r,
        None => return Ok(Vec::new()),
    };
    let tree = parse(source, language)?;

    let mut walker = Walker {
        source,
        rules: &rules,
        max_chars,
        out: Vec::new(),
        all_classes: Vec::new(),
        all_functions: Vec::new(),
    };
    let mut ancestors = Vec::new();
    walker.walk(tree.root_node(), &mut ancestors);

    Ok(coalesce_imports(walker.out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_function_becomes_one_chunk() {
        let src = b"fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n";
        let chunks = extract(src, "rust", 4000).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].node_name, "add");
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 3);
    }

    #[test]
    fn rust_impl_block_attaches_parent_hierarchy() {
        let src = b"struct Foo;\n\nimpl Foo {\n    fn bar(&self) {}\n}\n";
        let chunks = extract(src, "rust", 4000).unwrap();
        let bar = chunks.iter().find(|c| c.node_name == "bar").unwrap();
        assert!(!bar.hierarchy.is_empty());
        assert_eq!(bar.hierarchy.last().unwrap().value, "Foo");
    }

    #[test]
    fn python_decorator_is_included_in_span() {
        let src = b"@app.route('/x')\ndef handler():\n    return 1\n";
        let chunks = extract(src, "python", 4000).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
        assert!(chunks[0].text.starts_with('@'));
    }

    #[test]
    fn consecutive_imports_coalesce() {
        let src = b"use std::fmt;\nuse std::io;\n\nfn f() {}\n";
        let chunks = extract(src, "rust", 4000).unwrap();
        let imports: Vec<_> = chunks.iter().filter(|c| c.is_import_block).collect();
        assert_eq!(imports.len(), 1);
        assert!(imports[0].text.contains("fmt"));
        assert!(imports[0].text.contains("io"));
    }

    #[test]
    fn module_level_statement_is_not_dropped() {
        let src = b"import os\n\nVERSION = \"1.0\"\n\ndef f():\n    return 1\n";
        let chunks = extract(src, "python", 4000).unwrap();
        let other = chunks.iter().find(|c| c.is_other_block).expect("module-level statement should be emitted");
        assert!(other.text.contains("VERSION"));
    }

    #[test]
    fn main_guard_block_is_not_dropped() {
        let src = b"def f():\n    return 1\n\nif __name__ == \"__main__\":\n    f()\n";
        let chunks = extract(src, "python", 4000).unwrap();
        let other = chunks.iter().find(|c| c.is_other_block).expect("if __name__ guard should be emitted");
        assert!(other.text.contains("__main__"));
    }

    #[test]
    fn unsupported_language_yields_zero_chunks_not_error() {
        let chunks = extract(b"whatever", "cobol", 4000).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn oversized_function_is_emitted_anyway() {
        let body = "x".repeat(50);
        let src = format!("fn big() {{\n    let s = \"{body}\";\n}}\n");
        let chunks = extract(src.as_bytes(), "rust", 10).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.len() > 10);
    }
}
