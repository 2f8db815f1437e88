//! Vector Store Adapter (C5, §4.5): typed CRUD over two collections
//! (`Chunks`, `ChunkFiles`) plus one schema-bookkeeping row. Grounded
//! primarily on the teacher's `vector_store.rs` (content-addressed ids,
//! `IndexStore`-style persistence) and, for the two-collection shape, on
//! the original Weaviate-backed schema (`examples/original_source`).
//!
//! Two implementations share this trait: [`sqlite::SqliteStore`], an
//! embedded backend used by default and by tests, and [`http::HttpStore`],
//! a client for the externally-specified HTTP+gRPC vector-store process
//! (§6). Nothing above this trait needs to know which one is in use (§9
//! "Embedded database spin-up").

pub mod http;
pub mod sqlite;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::errors::BackendError;
use crate::types::{Chunk, ChunkFile, SearchKind};

/// One scored hit from a lexical, dense, or hybrid query.
#[derive(Debug, Clone)]
pub struct ScoredChunkFile {
    pub chunk_file: ChunkFile,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    // ---- Schema-details collection (§4.5 "Schema-details collection") ----

    async fn schema_version(&self) -> Result<Option<u32>, BackendError>;
    async fn set_schema_version(&self, version: u32) -> Result<(), BackendError>;
    async fn wipe_all(&self) -> Result<(), BackendError>;
    async fn ensure_collections(&self) -> Result<(), BackendError>;

    // ---- ChunkFiles ----

    /// Batched fetch; batch size 1000, max 10000 per query (§4.5).
    async fn get_by_file_hashes(
        &self,
        files: &HashMap<String, String>,
    ) -> Result<Vec<ChunkFile>, BackendError>;

    /// Same fetch, filtered to `import_only_chunk = true`.
    async fn get_only_import_chunk_files(
        &self,
        files: &HashMap<String, String>,
    ) -> Result<Vec<ChunkFile>, BackendError>;

    /// BM25 when `keyword.len() >= 3`, substring `LIKE` otherwise (§4.5).
    async fn keyword_search(
        &self,
        keyword: &str,
        kind: SearchKind,
        files: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<ScoredChunkFile>, BackendError>;

    /// Array-contains filter on `classes[]` or `functions[]`.
    async fn get_chunk_files_matching_exact(
        &self,
        search_key: &str,
        kind: SearchKind,
        file_path: &str,
        file_hash: &str,
    ) -> Result<Vec<ChunkFile>, BackendError>;

    /// Idempotent insert keyed by `id5(file_path, file_hash, start, end)`.
    async fn bulk_insert_chunk_files(&self, records: &[ChunkFile]) -> Result<(), BackendError>;

    // ---- Chunks ----

    /// Hybrid BM25+vector over a pre-filter set, mixed by `alpha` (§4.5,
    /// §4.7). `query_vector` is `None` when the caller has no embedding
    /// (falls back to BM25-only scoring).
    async fn filtered_vector_hybrid_search(
        &self,
        chunk_hashes: &[String],
        query: &str,
        query_vector: Option<&[f32]>,
        limit: usize,
        alpha: f32,
    ) -> Result<Vec<ScoredChunk>, BackendError>;

    async fn get_by_chunk_hashes(
        &self,
        chunk_hashes: &[String],
        with_vector: bool,
    ) -> Result<Vec<Chunk>, BackendError>;

    /// Insert with or without a vector depending on availability; id is
    /// `id5(chunk_hash)`.
    async fn bulk_insert_chunks(&self, chunks: &[Chunk]) -> Result<(), BackendError>;

    /// Bounded-concurrency (semaphore of 50) partial update, per-item error
    /// isolation (§4.5).
    async fn update_timestamps(
        &self,
        chunk_hashes: &[String],
        updated_at: i64,
        created_at: Option<i64>,
    ) -> Result<(), BackendError>;

    async fn update_embedding(&self, chunk_hash: &str, embedding: &[f32]) -> Result<(), BackendError>;

    /// Iterative delete-by-filter in 1000-item batches until empty (§4.5,
    /// §4.8).
    async fn cleanup_old(
        &self,
        last_used_lt: i64,
        exclusion_chunk_hashes: &[String],
    ) -> Result<usize, BackendError>;

    async fn cleanup_old_chunk_files(
        &self,
        last_used_lt: i64,
        exclusion_chunk_hashes: &[String],
    ) -> Result<usize, BackendError>;
}

pub const SCHEMA_VERSION: u32 = 12;

/// Cosine similarity, used by the embedded backend's dense-scoring path and
/// shared with the retrieval pipeline's focus-biasing math.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn mismatched_lengths_score_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
