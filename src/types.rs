//! The data model (§3), as tagged records rather than free-form dicts (§9
//! "Dynamic typing in result payloads").

use serde::{Deserialize, Serialize};

/// One entry in a chunk's containing-scope stack, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyEntry {
    pub kind: HierarchyKind,
    pub value: String,
    pub is_breakable_node: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyKind {
    Class,
    Function,
    Namespace,
}

/// Search-helper and provenance metadata carried alongside a ChunkFile (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetaInfo {
    pub hierarchy: Vec<HierarchyEntry>,
    pub dechunk: bool,
    pub import_only_chunk: bool,
    pub all_classes: Vec<String>,
    pub all_functions: Vec<String>,
    pub byte_size: usize,
}

/// A content-addressed retrievable unit (§3 "Chunk").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_hash: String,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub created_at: i64,
    pub last_used: i64,
}

/// A placement record linking one chunk to one file location (§3 "ChunkFile").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkFile {
    pub file_path: String,
    pub file_hash: String,
    pub start_line: usize,
    pub end_line: usize,
    pub total_chunks: usize,
    pub chunk_hash: String,
    pub classes: Vec<String>,
    pub functions: Vec<String>,
    pub entities: String,
    pub searchable_file_path: String,
    pub searchable_file_name: String,
    pub meta_info: ChunkMetaInfo,
}

impl ChunkFile {
    /// `id5(file_path ‖ file_hash ‖ start_line ‖ end_line)` (§4.5).
    pub fn id(&self) -> String {
        crate::hashing::id5(&[
            &self.file_path,
            &self.file_hash,
            &self.start_line.to_string(),
            &self.end_line.to_string(),
        ])
    }
}

/// Scanner-level record, not persisted in the vector store (§3 "FileRecord").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub repo_path: String,
    pub file_path: String,
    pub file_name: String,
    pub file_hash: String,
    pub language: String,
    pub num_lines: usize,
}

/// `(usage_hash, last_usage_timestamp, references)` (§3 "UsageRecord").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub usage_hash: String,
    pub last_usage_timestamp: i64,
    pub references: Vec<String>,
}

/// What C6 emits and C5 stores: the result of chunking one unit of source
/// text, before embedding.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub node_name: String,
    pub node_type: String,
    pub start_line: usize,
    pub end_line: usize,
    pub parent_name: Option<String>,
    pub parent_type: Option<String>,
    pub text: String,
    pub hierarchy: Vec<HierarchyEntry>,
    pub is_import_block: bool,
    /// Set by the AST walker for unclassified nodes it emits to preserve
    /// file coverage (module-level statements, bare expressions, etc.);
    /// always `false` for the legacy and regex-fallback chunkers, which
    /// cover the file by construction already.
    pub is_other_block: bool,
}

/// Kind filter used by keyword search helper-field lookups (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Class,
    Function,
    File,
}

/// The wire shape returned to a retrieval caller (§6 "ChunkJSON").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkJson {
    pub content: String,
    pub source_details: ChunkSourceDetails,
    pub search_score: Option<f32>,
    pub metadata: Option<ChunkMetaInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSourceDetails {
    pub file_path: String,
    pub file_hash: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
}
