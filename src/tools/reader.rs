//! Iterative file reader (C11, §4.11): backs focus snippets and lazy
//! scrolling in a UI. Grounded on the teacher's paginated-read helper in
//! `inspector.rs` (`max_lines` cap, `eof_reached` flag).

use std::path::Path;

use crate::errors::ValidationError;

#[derive(Debug, Clone)]
pub struct ReadResult {
    pub lines: Vec<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub eof_reached: bool,
}

const DEFAULT_MAX_LINES: usize = 100;

/// `read(start_line, end_line)` with a per-call cap (default 100 lines).
/// 1-indexed, inclusive range, matching focus-chunk addressing (§4.7).
pub fn read(path: &Path, start_line: usize, end_line: usize, max_lines: Option<usize>) -> Result<ReadResult, ValidationError> {
    let content = std::fs::read_to_string(path)
        .map_err(|_| ValidationError::FileNotFound(path.display().to_string()))?;
    let all_lines: Vec<&str> = content.lines().collect();
    let total = all_lines.len();

    if start_line == 0 || start_line > end_line || start_line > total.max(1) {
        return Err(ValidationError::BadLineRange {
            path: path.display().to_string(),
            start: start_line,
            end: end_line,
            len: total,
        });
    }

    let cap = max_lines.unwrap_or(DEFAULT_MAX_LINES).max(1);
    let requested_end = end_line.min(total);
    let capped_end = (start_line - 1 + cap).min(requested_end).max(start_line);
    let eof_reached = capped_end >= total;

    let lines: Vec<String> = all_lines[start_line - 1..capped_end].iter().map(|s| s.to_string()).collect();

    Ok(ReadResult {
        lines,
        start_line,
        end_line: capped_end,
        eof_reached,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_within_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "l1\nl2\nl3\nl4\nl5\n").unwrap();

        let result = read(&path, 2, 4, None).unwrap();
        assert_eq!(result.lines, vec!["l2", "l3", "l4"]);
        assert!(result.eof_reached);
    }

    #[test]
    fn caps_at_max_lines_and_clears_eof_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let content: String = (1..=300).map(|i| format!("line{i}\n")).collect();
        std::fs::write(&path, content).unwrap();

        let result = read(&path, 1, 300, Some(100)).unwrap();
        assert_eq!(result.lines.len(), 100);
        assert!(!result.eof_reached);
        assert_eq!(result.end_line, 100);
    }

    #[test]
    fn invalid_range_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "only one line\n").unwrap();
        assert!(read(&path, 5, 10, None).is_err());
    }
}
