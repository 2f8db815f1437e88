//! Ancillary Tools (C11, §4.11): small, dependency-light helpers used by the
//! retrieval pipeline and any interactive caller — a paginated file reader
//! and a ripgrep-backed (with regex fallback) grep.

pub mod grep;
pub mod reader;
