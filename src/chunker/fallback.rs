//! Regex-based fallback chunker for languages with a known tag but no
//! tree-sitter grammar wired up (Kotlin, Swift, and anything else added to
//! the language table without a grammar). Grounded on the teacher's
//! `universal.rs` definition-line detector, repurposed here to delimit
//! chunks instead of rendering a skeleton.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::types::RawChunk;

fn def_regexes() -> &'static [Regex] {
    static RE: OnceCell<Vec<Regex>> = OnceCell::new();
    RE.get_or_init(|| {
        vec![
            Regex::new(r"^\s*(function|class|def|func|struct|interface|enum)\s+([a-zA-Z0-9_]+)")
                .unwrap(),
            Regex::new(r"^\s*(?:public|private|protected)?\s*(?:static\s*)?(?:fn|var|val)\s+([a-zA-Z0-9_]+)")
                .unwrap(),
            Regex::new(r"^\s*(?:public|private|protected)?\s*(?:static\s*)?func\s+([a-zA-Z0-9_]+)")
                .unwrap(),
        ]
    })
}

fn is_definition_line(line: &str) -> bool {
    let t = line.trim_start();
    if t.is_empty() {
        return false;
    }
    if !(t.starts_with("function")
        || t.starts_with("class")
        || t.starts_with("def")
        || t.starts_with("func")
        || t.starts_with("struct")
        || t.starts_with("interface")
        || t.starts_with("enum")
        || t.starts_with("public")
        || t.starts_with("private")
        || t.starts_with("protected")
        || t.starts_with("static")
        || t.starts_with("fn")
        || t.starts_with("var")
        || t.starts_with("val"))
    {
        return false;
    }
    def_regexes().iter().any(|re| re.is_match(line))
}

/// Splits source into chunks delimited by definition-looking lines, each
/// capped at `max_chars`. Used when §4.1 resolves a language tag but §4.2
/// has no grammar for it; the file is still ingested, never dropped
/// (§4.1 "unknown suffixes ... disable structural chunking but not
/// ingestion" — the same applies to known-but-ungrammared languages).
pub fn chunk_by_definitions(source: &str, max_chars: usize) -> Vec<RawChunk> {
    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let mut boundaries: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| is_definition_line(l))
        .map(|(i, _)| i)
        .collect();
    if boundaries.first() != Some(&0) {
        boundaries.insert(0, 0);
    }
    boundaries.push(lines.len());
    boundaries.dedup();

    let mut out = Vec::new();
    for w in boundaries.windows(2) {
        let (start, mut end) = (w[0], w[1]);
        if start == end {
            continue;
        }
        // Re-split oversized definition bodies into max_chars-sized pieces.
        let mut chunk_start = start;
        while chunk_start < end {
            let mut len = 0usize;
            let mut chunk_end = chunk_start;
            while chunk_end < end && (len == 0 || len + lines[chunk_end].len() <= max_chars) {
                len += lines[chunk_end].len() + 1;
                chunk_end += 1;
            }
            if chunk_end == chunk_start {
                chunk_end = chunk_start + 1;
            }
            out.push(RawChunk {
                node_name: "unnamed".to_string(),
                node_type: "fallback_region".to_string(),
                start_line: chunk_start + 1,
                end_line: chunk_end,
                parent_name: None,
                parent_type: None,
                text: lines[chunk_start..chunk_end].join("\n"),
                hierarchy: Vec::new(),
                is_import_block: false,
                is_other_block: false,
            });
            chunk_start = chunk_end;
        }
        end = w[1];
        let _ = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_definition_lines() {
        let src = "func a() {\n  1\n}\nfunc b() {\n  2\n}\n";
        let chunks = chunk_by_definitions(src, 1000);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.contains("func a"));
        assert!(chunks[1].text.contains("func b"));
    }

    #[test]
    fn empty_source_yields_no_chunks() {
        assert!(chunk_by_definitions("", 100).is_empty());
    }
}
