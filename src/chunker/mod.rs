//! Tree Chunker (C2, §4.2): turns a file's bytes into size-bounded,
//! hierarchy-annotated chunks.

pub mod fallback;
pub mod legacy;
pub mod rules;
pub mod walker;

use crate::errors::ChunkError;
use crate::types::RawChunk;

/// Primary entry point. Dispatches to the tree-sitter walker when a grammar
/// is wired up for `language`, otherwise to the regex-based fallback for any
/// known language tag, and finally to nothing for `"unknown"` — matching
/// §4.1's "unknown suffixes ... disable structural chunking but not
/// ingestion": callers that still want *some* chunk for an unknown file
/// should fall back to `legacy::chunk_code` explicitly, since a language-less
/// file has no structural signal to key a fallback off of.
pub fn chunk_file(
    source: &str,
    language: &str,
    max_chars: usize,
) -> Result<Vec<RawChunk>, ChunkError> {
    if walker::has_grammar(language) {
        return walker::extract(source.as_bytes(), language, max_chars);
    }
    if language != crate::language::UNKNOWN {
        return Ok(fallback::chunk_by_definitions(source, max_chars));
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_language_yields_no_structural_chunks() {
        let chunks = chunk_file("anything at all", "unknown", 100).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn known_language_without_grammar_uses_fallback() {
        let src = "func a() {\n  1\n}\n";
        let chunks = chunk_file(src, "kotlin", 1000).unwrap();
        assert!(!chunks.is_empty());
    }

    #[test]
    fn grammared_language_uses_walker() {
        let src = "fn f() {}\n";
        let chunks = chunk_file(src, "rust", 1000).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].node_name, "f");
    }
}
