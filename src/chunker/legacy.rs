//! The legacy byte-span chunker. Per §9 Open Questions, the metadata-aware
//! walker (`super::walker`) is canonical; this path survives only as a
//! reference test oracle it can be checked against for basic coverage and
//! no-dropped-content properties.

use crate::types::RawChunk;

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

/// `chunk_code(bytes, max_chars, coalesce) -> [Span]` (§4.2 step 6/7),
/// simplified to operate over raw lines rather than a syntax tree: pack
/// consecutive lines up to `max_chars`, then merge adjacent small spans
/// whose combined non-whitespace length stays below `coalesce`, then merge
/// a span beginning with a closing delimiter backward into its predecessor.
pub fn chunk_code(source: &str, max_chars: usize, coalesce: usize) -> Vec<RawChunk> {
    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let mut spans: Vec<Span> = Vec::new();
    let mut cur_start = 0usize;
    let mut cur_len = 0usize;
    for (i, line) in lines.iter().enumerate() {
        let line_len = line.len() + 1;
        if cur_len + line_len > max_chars && cur_len > 0 {
            spans.push(Span { start: cur_start, end: i });
            cur_start = i;
            cur_len = 0;
        }
        cur_len += line_len;
    }
    spans.push(Span {
        start: cur_start,
        end: lines.len(),
    });

    // Merge adjacent small spans whose combined non-whitespace length stays
    // under `coalesce`.
    let nonws_len = |s: Span| -> usize {
        lines[s.start..s.end]
            .iter()
            .map(|l| l.trim().len())
            .sum()
    };
    let mut merged: Vec<Span> = Vec::new();
    for span in spans {
        if let Some(&last) = merged.last() {
            if nonws_len(last) + nonws_len(span) < coalesce {
                merged.pop();
                merged.push(Span {
                    start: last.start,
                    end: span.end,
                });
                continue;
            }
        }
        merged.push(span);
    }

    // A span beginning with a closing delimiter merges backward.
    let mut delim_fixed: Vec<Span> = Vec::new();
    for span in merged {
        let first_nonblank = lines[span.start..span.end]
            .iter()
            .map(|l| l.trim_start())
            .find(|l| !l.is_empty());
        let starts_with_closer = matches!(first_nonblank, Some(l) if l.starts_with(')') || l.starts_with('}') || l.starts_with(']'));
        if starts_with_closer {
            if let Some(last) = delim_fixed.last_mut() {
                last.end = span.end;
                continue;
            }
        }
        delim_fixed.push(span);
    }

    // Drop empty spans; merge a trailing chunk smaller than `coalesce` into
    // its predecessor.
    let mut final_spans: Vec<Span> = delim_fixed.into_iter().filter(|s| s.end > s.start).collect();
    if final_spans.len() > 1 {
        let last = *final_spans.last().unwrap();
        if nonws_len(last) < coalesce {
            final_spans.pop();
            let prev = final_spans.last_mut().unwrap();
            prev.end = last.end;
        }
    }

    final_spans
        .into_iter()
        .map(|s| RawChunk {
            node_name: "unnamed".to_string(),
            node_type: "span".to_string(),
            start_line: s.start + 1,
            end_line: s.end,
            parent_name: None,
            parent_type: None,
            text: lines[s.start..s.end].join("\n"),
            hierarchy: Vec::new(),
            is_import_block: false,
            is_other_block: false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_yields_no_spans() {
        assert!(chunk_code("", 100, 20).is_empty());
    }

    #[test]
    fn small_file_is_one_span() {
        let chunks = chunk_code("a\nb\nc\n", 100, 20);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
    }

    #[test]
    fn line_ranges_are_non_decreasing() {
        let src = "x".repeat(500);
        let multi = (0..20).map(|_| src.clone()).collect::<Vec<_>>().join("\n");
        let chunks = chunk_code(&multi, 300, 10);
        for w in chunks.windows(2) {
            assert!(w[1].start_line >= w[0].start_line);
        }
    }

    #[test]
    fn closing_delimiter_merges_backward() {
        let src = "fn f() {\n    1\n}\nfn g() {\n    2\n}\n";
        let chunks = chunk_code(src, 12, 0);
        assert!(!chunks
            .iter()
            .any(|c| c.text.trim_start().starts_with('}')));
    }
}
