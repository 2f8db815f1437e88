//! Ripgrep wrapper (C11, §4.11): prefers the `rg` binary's streaming JSON
//! output for speed and correctness; falls back to an in-process regex walk
//! (sharing the scanner's exclude rules) when `rg` isn't on `PATH`, the same
//! "degrade gracefully, never hard-fail" posture as the chunker's fallback
//! path. Grounded on `scanner.rs` for the exclude-dir/glob reuse and on
//! `chunker/fallback.rs` for the degrade-to-regex shape.

use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;

use regex::Regex;
use serde::Deserialize;
use tokio::process::Command;

use crate::config::ScanConfig;

const CONTEXT_LINES: usize = 2;
const MAX_CHUNKS: usize = 50;
const MAX_LINE_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct GrepMatch {
    pub file_path: String,
    pub line_number: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct GrepChunk {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

/// 200-char cap with head/tail preserved, matching the "don't blow up the
/// caller's context window on a minified line" rule (§4.11).
fn truncate_line(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    if chars.len() <= MAX_LINE_CHARS {
        return line.to_string();
    }
    let head = MAX_LINE_CHARS / 2 - 2;
    let tail = MAX_LINE_CHARS / 2 - 1;
    let head_str: String = chars[..head].iter().collect();
    let tail_str: String = chars[chars.len() - tail..].iter().collect();
    format!("{head_str}...{tail_str}")
}

fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

#[derive(Deserialize)]
struct RgJsonLine {
    #[serde(rename = "type")]
    kind: String,
    data: Option<RgJsonData>,
}

#[derive(Deserialize)]
struct RgJsonData {
    path: Option<RgText>,
    lines: Option<RgText>,
    line_number: Option<usize>,
}

#[derive(Deserialize)]
struct RgText {
    text: String,
}

/// Try the `rg` binary's `--json` stream; returns `None` if it isn't
/// available or fails to launch, letting the caller degrade to the regex
/// walk instead of erroring out.
async fn try_ripgrep(repo_root: &Path, pattern: &str, fixed_string: bool, scan: &ScanConfig) -> Option<Vec<GrepMatch>> {
    let mut cmd = Command::new("rg");
    cmd.current_dir(repo_root)
        .arg("--json")
        .arg("--context")
        .arg(CONTEXT_LINES.to_string());
    if fixed_string {
        cmd.arg("--fixed-strings");
    }
    for dir in &scan.exclude_dir_names {
        cmd.arg("--glob").arg(format!("!{dir}/**"));
    }
    cmd.arg(pattern).stdout(Stdio::piped()).stderr(Stdio::null());

    let output = cmd.output().await.ok()?;
    if !output.status.success() && output.stdout.is_empty() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut matches = Vec::new();
    for line in stdout.lines() {
        let Ok(parsed) = serde_json::from_str::<RgJsonLine>(line) else {
            continue;
        };
        if parsed.kind != "match" {
            continue;
        }
        let Some(data) = parsed.data else { continue };
        let (Some(path), Some(lines), Some(line_number)) = (data.path, data.lines, data.line_number) else {
            continue;
        };
        matches.push(GrepMatch {
            file_path: normalize_path(&path.text),
            line_number,
            text: truncate_line(lines.text.trim_end_matches('\n')),
        });
    }
    Some(matches)
}

/// In-process fallback: walk the repo with the scanner's exclude rules and
/// regex-match every text file line by line.
fn fallback_search(repo_root: &Path, pattern: &str, fixed_string: bool, scan: &ScanConfig) -> anyhow::Result<Vec<GrepMatch>> {
    let regex = if fixed_string {
        Regex::new(&regex::escape(pattern))?
    } else {
        Regex::new(pattern)?
    };
    let excluded: HashSet<&str> = scan.exclude_dir_names.iter().map(|s| s.as_str()).collect();

    let entries = crate::scanner::scan_workspace(repo_root, scan, scan.max_file_bytes_search)?;
    let mut matches = Vec::new();
    for entry in entries {
        if entry
            .rel_path
            .split('/')
            .any(|seg| excluded.contains(seg))
        {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&entry.abs_path) else {
            continue;
        };
        for (idx, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                matches.push(GrepMatch {
                    file_path: normalize_path(&entry.rel_path),
                    line_number: idx + 1,
                    text: truncate_line(line),
                });
            }
        }
    }
    Ok(matches)
}

/// Groups matches that fall within `2 * CONTEXT_LINES` of each other in the
/// same file into one chunk, reading surrounding context from disk; caps at
/// 50 chunks total (§4.11).
fn group_matches(repo_root: &Path, mut matches: Vec<GrepMatch>) -> Vec<GrepChunk> {
    matches.sort_by(|a, b| (a.file_path.as_str(), a.line_number).cmp(&(b.file_path.as_str(), b.line_number)));

    let mut chunks: Vec<GrepChunk> = Vec::new();
    let mut current_file: Option<String> = None;
    let mut current_start = 0usize;
    let mut current_end = 0usize;

    for m in matches {
        let same_group = current_file.as_deref() == Some(m.file_path.as_str())
            && m.line_number <= current_end + 2 * CONTEXT_LINES + 1;
        if same_group {
            current_end = m.line_number;
        } else {
            if let Some(file) = current_file.take() {
                chunks.push(finalize_chunk(repo_root, &file, current_start, current_end));
            }
            current_file = Some(m.file_path.clone());
            current_start = m.line_number;
            current_end = m.line_number;
        }
        if chunks.len() >= MAX_CHUNKS {
            break;
        }
    }
    if let Some(file) = current_file {
        if chunks.len() < MAX_CHUNKS {
            chunks.push(finalize_chunk(repo_root, &file, current_start, current_end));
        }
    }
    chunks.truncate(MAX_CHUNKS);
    chunks
}

fn finalize_chunk(repo_root: &Path, file_path: &str, start: usize, end: usize) -> GrepChunk {
    let lo = start.saturating_sub(CONTEXT_LINES).max(1);
    let hi = end + CONTEXT_LINES;
    let abs = repo_root.join(file_path);
    let text = match std::fs::read_to_string(&abs) {
        Ok(content) => {
            let lines: Vec<&str> = content.lines().collect();
            let hi = hi.min(lines.len());
            if lo <= hi && lo >= 1 {
                lines[lo - 1..hi].iter().map(|l| truncate_line(l)).collect::<Vec<_>>().join("\n")
            } else {
                String::new()
            }
        }
        Err(_) => String::new(),
    };
    GrepChunk {
        file_path: file_path.to_string(),
        start_line: lo,
        end_line: hi,
        text,
    }
}

pub async fn search(repo_root: &Path, pattern: &str, fixed_string: bool, scan: &ScanConfig) -> anyhow::Result<Vec<GrepChunk>> {
    let matches = match try_ripgrep(repo_root, pattern, fixed_string, scan).await {
        Some(m) => m,
        None => fallback_search(repo_root, pattern, fixed_string, scan)?,
    };
    Ok(group_matches(repo_root, matches))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_line_preserves_head_and_tail() {
        let long = "x".repeat(500);
        let truncated = truncate_line(&long);
        assert!(truncated.len() < 500);
        assert!(truncated.contains("..."));
    }

    #[test]
    fn truncate_line_leaves_short_lines_alone() {
        assert_eq!(truncate_line("short"), "short");
    }

    #[tokio::test]
    async fn fallback_search_finds_matches_and_groups_adjacent_ones() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.py"),
            "def foo():\n    return 1\n\n\n\ndef bar():\n    return 2\n",
        )
        .unwrap();
        let scan = ScanConfig::default();
        let matches = fallback_search(dir.path(), "return", false, &scan).unwrap();
        assert_eq!(matches.len(), 2);
        let chunks = group_matches(dir.path(), matches);
        assert_eq!(chunks.len(), 2);
    }

    #[tokio::test]
    async fn fallback_search_respects_excluded_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/skip.js"), "needle").unwrap();
        std::fs::write(dir.path().join("keep.js"), "needle").unwrap();
        let scan = ScanConfig::default();
        let matches = fallback_search(dir.path(), "needle", true, &scan).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].file_path, "keep.js");
    }
}
