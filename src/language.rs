//! Language Probe (C1): a pure function mapping a path to a language tag.
//!
//! Resolution order per §4.1: exact filename match, longest compound suffix,
//! then single suffix. Unknown suffixes yield `"unknown"`, which disables
//! structural chunking but not ingestion (the chunker falls back to treating
//! the whole file as one chunk via the universal fallback).

use std::path::Path;

pub const UNKNOWN: &str = "unknown";

/// Filenames resolved without looking at any extension at all.
const EXACT_NAMES: &[(&str, &str)] = &[
    ("Dockerfile", "dockerfile"),
    ("Makefile", "makefile"),
    ("GNUmakefile", "makefile"),
    ("CMakeLists.txt", "cmake"),
    ("Rakefile", "ruby"),
    ("Gemfile", "ruby"),
];

/// Compound suffixes checked before the single final extension, longest
/// first so `.spec.ts` wins over `.ts` and `.tar.gz` wins over `.gz`.
const COMPOUND_SUFFIXES: &[(&str, &str)] = &[
    (".d.ts", "typescript"),
    (".spec.ts", "typescript"),
    (".test.ts", "typescript"),
    (".spec.tsx", "typescript"),
    (".test.tsx", "typescript"),
    (".tar.gz", "archive"),
    (".tar.bz2", "archive"),
];

/// Single-extension table. Kept flat and data-driven rather than a match
/// statement so new languages are a one-line addition (§9 REDESIGN FLAGS —
/// the same value-type-over-inheritance idea applied to the probe itself).
const SINGLE_SUFFIXES: &[(&str, &str)] = &[
    ("rs", "rust"),
    ("py", "python"),
    ("pyi", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("go", "go"),
    ("java", "java"),
    ("cs", "csharp"),
    ("php", "php"),
    ("proto", "proto"),
    ("c", "c"),
    ("h", "c"),
    ("cc", "cpp"),
    ("cpp", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("hh", "cpp"),
    ("rb", "ruby"),
    ("kt", "kotlin"),
    ("kts", "kotlin"),
    ("swift", "swift"),
    ("toml", "toml"),
    ("json", "json"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("md", "markdown"),
];

/// All language tags the probe can emit for a non-fallback classification,
/// surfacing `--languages`-style diagnostics (SPEC_FULL §4.1 supplement).
pub fn supported_languages() -> Vec<&'static str> {
    let mut tags: Vec<&'static str> = EXACT_NAMES
        .iter()
        .map(|(_, t)| *t)
        .chain(COMPOUND_SUFFIXES.iter().map(|(_, t)| *t))
        .chain(SINGLE_SUFFIXES.iter().map(|(_, t)| *t))
        .collect();
    tags.sort_unstable();
    tags.dedup();
    tags
}

pub fn is_known(tag: &str) -> bool {
    tag != UNKNOWN && supported_languages().contains(&tag)
}

/// `language_of(path) -> tag | "unknown"` (§4.1).
pub fn language_of(path: &Path) -> &'static str {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        for (exact, tag) in EXACT_NAMES {
            if name == *exact {
                return tag;
            }
        }

        let lower = name.to_ascii_lowercase();
        for (suffix, tag) in COMPOUND_SUFFIXES {
            if lower.ends_with(suffix) {
                return tag;
            }
        }
    }

    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
    {
        Some(ext) => SINGLE_SUFFIXES
            .iter()
            .find(|(suf, _)| *suf == ext)
            .map(|(_, tag)| *tag)
            .unwrap_or(UNKNOWN),
        None => UNKNOWN,
    }
}

/// Languages the Tree Chunker (C2) can parse with a real tree-sitter grammar.
/// Everything else still gets ingested, via the regex-based fallback chunker.
pub fn has_structural_grammar(tag: &str) -> bool {
    matches!(
        tag,
        "rust"
            | "python"
            | "typescript"
            | "javascript"
            | "go"
            | "java"
            | "csharp"
            | "php"
            | "proto"
            | "c"
            | "cpp"
            | "ruby"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn of(s: &str) -> &'static str {
        language_of(&PathBuf::from(s))
    }

    #[test]
    fn exact_filename_wins_over_extension() {
        assert_eq!(of("Dockerfile"), "dockerfile");
        assert_eq!(of("src/Makefile"), "makefile");
    }

    #[test]
    fn longest_compound_suffix_wins() {
        assert_eq!(of("a/b.spec.ts"), "typescript");
        assert_eq!(of("a/b.d.ts"), "typescript");
        assert_eq!(of("a/b.ts"), "typescript");
    }

    #[test]
    fn plain_extension_resolution() {
        assert_eq!(of("main.rs"), "rust");
        assert_eq!(of("app/models.py"), "python");
        assert_eq!(of("lib.go"), "go");
    }

    #[test]
    fn unknown_is_returned_for_unrecognized_suffix() {
        assert_eq!(of("weird.xyzzy"), UNKNOWN);
        assert_eq!(of("noext"), UNKNOWN);
    }

    #[test]
    fn probe_is_pure() {
        let p = PathBuf::from("a/b/c.rs");
        assert_eq!(language_of(&p), language_of(&p));
    }
}
