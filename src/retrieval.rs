//! Retrieval Pipeline (C7, §4.7): focus materialization and biasing, hybrid
//! candidate selection, import augmentation, stable ordering, and optional
//! reranking with graceful fallback. Grounded on the teacher's
//! `vector_store.rs::search` (hybrid query shape, reranker post-pass); the
//! RRF fusion inside `filtered_vector_hybrid_search` itself lives in
//! `store::sqlite` (see that module's doc comment and DESIGN.md's C5 entry).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::store::VectorStore;
use crate::types::{Chunk, ChunkFile, ChunkJson, ChunkSourceDetails, SearchKind};

/// A line-addressed pointer into a file, as the caller supplies in
/// `focus_chunks[]` (`file_path:start-end`, §4.7).
#[derive(Debug, Clone)]
pub struct FocusChunkSpec {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FocusInput {
    pub files: Vec<String>,
    pub directories: Vec<String>,
    pub chunks: Vec<FocusChunkSpec>,
}

pub struct RetrievalRequest {
    pub query: String,
    pub query_vector: Option<Vec<f32>>,
    pub focus: FocusInput,
    pub max_chunks_to_return: usize,
    pub alpha: f32,
}

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_file: ChunkFile,
    pub chunk: Chunk,
    pub score: f32,
    pub is_focus: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalResponse {
    pub chunks: Vec<RetrievedChunk>,
    pub focus_chunks: Vec<RetrievedChunk>,
}

impl From<&RetrievedChunk> for ChunkJson {
    /// The wire shape a retrieval caller actually receives (§6 "ChunkJSON").
    fn from(hit: &RetrievedChunk) -> Self {
        ChunkJson {
            content: hit.chunk.text.clone(),
            source_details: ChunkSourceDetails {
                file_path: hit.chunk_file.file_path.clone(),
                file_hash: Some(hit.chunk_file.file_hash.clone()),
                start_line: hit.chunk_file.start_line,
                end_line: hit.chunk_file.end_line,
            },
            search_score: Some(hit.score),
            metadata: Some(hit.chunk_file.meta_info.clone()),
        }
    }
}

/// Reranker provider contract (§6 "POST /rerank"). On failure the caller
/// should fall through unchanged (§4.7 step 6) — this trait only describes
/// the success path; errors surface as `BackendError` and are caught by
/// [`RetrievalPipeline::retrieve`].
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Returns the indices of `candidates` in reranked order, with any index
    /// the reranker chose to drop simply absent.
    async fn rerank(&self, query: &str, candidates: &[String]) -> Result<(Vec<usize>, String), crate::errors::BackendError>;
}

pub struct RetrievalPipeline<'a> {
    repo_root: &'a Path,
    store: &'a dyn VectorStore,
    reranker: Option<&'a dyn Reranker>,
}

impl<'a> RetrievalPipeline<'a> {
    pub fn new(repo_root: &'a Path, store: &'a dyn VectorStore, reranker: Option<&'a dyn Reranker>) -> Self {
        Self {
            repo_root,
            store,
            reranker,
        }
    }

    /// Step 1 (§4.7 "Focus materialization"): read cited lines straight from
    /// disk into synthetic, unpersisted chunks.
    fn materialize_focus_chunks(&self, specs: &[FocusChunkSpec]) -> Vec<RetrievedChunk> {
        let mut out = Vec::new();
        for spec in specs {
            let abs = self.repo_root.join(&spec.file_path);
            let content = match std::fs::read_to_string(&abs) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %spec.file_path, error = %e, "focus chunk file unreadable");
                    continue;
                }
            };
            let lines: Vec<&str> = content.lines().collect();
            if spec.start_line == 0 || spec.start_line > lines.len() {
                continue;
            }
            let end = spec.end_line.min(lines.len());
            let text = lines[spec.start_line - 1..end].join("\n");
            let chunk = Chunk {
                chunk_hash: format!("focus:{}:{}-{}", spec.file_path, spec.start_line, end),
                text: text.clone(),
                embedding: None,
                created_at: 0,
                last_used: 0,
            };
            let chunk_file = ChunkFile {
                file_path: spec.file_path.clone(),
                file_hash: String::new(),
                start_line: spec.start_line,
                end_line: end,
                total_chunks: 1,
                chunk_hash: chunk.chunk_hash.clone(),
                classes: vec![],
                functions: vec![],
                entities: String::new(),
                searchable_file_path: spec.file_path.clone(),
                searchable_file_name: Path::new(&spec.file_path)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                meta_info: Default::default(),
            };
            out.push(RetrievedChunk {
                chunk_file,
                chunk,
                score: 1.0,
                is_focus: true,
            });
        }
        out
    }

    /// `focus_directories` expand to every chunkable file whose path starts
    /// with the prefix (§4.7 step 1).
    fn expand_focus_directories(&self, directories: &[String], candidate_files: &HashMap<String, String>) -> Vec<String> {
        directories
            .iter()
            .flat_map(|dir| {
                let prefix = format!("{}/", dir.trim_end_matches('/'));
                candidate_files
                    .keys()
                    .filter(move |p| p.starts_with(&prefix))
                    .cloned()
            })
            .collect()
    }

    pub async fn retrieve(
        &self,
        req: RetrievalRequest,
        candidate_files: &HashMap<String, String>,
    ) -> Result<RetrievalResponse, EngineError> {
        let focus_chunks = self.materialize_focus_chunks(&req.focus.chunks);

        // Step 2: augment the query text with focus content so both BM25 and
        // dense similarity lean toward the caller's working context.
        let mut augmented_query = req.query.clone();
        for fc in &focus_chunks {
            augmented_query.push(' ');
            augmented_query.push_str(&fc.chunk.text);
        }

        // Step 1 continued: restrict candidates to focus_files/directories
        // when given, otherwise use the full set.
        let mut restricted: HashMap<String, String> = candidate_files.clone();
        if !req.focus.files.is_empty() || !req.focus.directories.is_empty() {
            let mut allow: HashSet<String> = req.focus.files.iter().cloned().collect();
            allow.extend(self.expand_focus_directories(&req.focus.directories, candidate_files));
            restricted.retain(|path, _| allow.contains(path));
        }

        // Step 3: candidate selection via hybrid search over this file set's
        // chunk hashes.
        let chunk_files = self
            .store
            .get_by_file_hashes(&restricted)
            .await
            .map_err(EngineError::Backend)?;
        let chunk_hashes: Vec<String> = chunk_files.iter().map(|cf| cf.chunk_hash.clone()).collect();

        let scored_chunks = self
            .store
            .filtered_vector_hybrid_search(
                &chunk_hashes,
                &augmented_query,
                req.query_vector.as_deref(),
                req.max_chunks_to_return,
                req.alpha,
            )
            .await
            .map_err(EngineError::Backend)?;

        let chunk_file_by_hash: HashMap<String, ChunkFile> = chunk_files
            .into_iter()
            .map(|cf| (cf.chunk_hash.clone(), cf))
            .collect();

        let mut results: Vec<RetrievedChunk> = Vec::new();
        let mut seen_files: HashSet<String> = HashSet::new();
        for scored in scored_chunks {
            if let Some(cf) = chunk_file_by_hash.get(&scored.chunk.chunk_hash) {
                seen_files.insert(cf.file_path.clone());
                results.push(RetrievedChunk {
                    chunk_file: cf.clone(),
                    chunk: scored.chunk,
                    score: scored.score,
                    is_focus: false,
                });
            }
        }

        // Step 4: import augmentation for every file that appears.
        let mut import_files = HashMap::new();
        for path in &seen_files {
            if let Some(hash) = restricted.get(path) {
                import_files.insert(path.clone(), hash.clone());
            }
        }
        if !import_files.is_empty() {
            let import_chunk_files = self
                .store
                .get_only_import_chunk_files(&import_files)
                .await
                .map_err(EngineError::Backend)?;
            let import_hashes: Vec<String> = import_chunk_files.iter().map(|cf| cf.chunk_hash.clone()).collect();
            if !import_hashes.is_empty() {
                let import_chunks = self
                    .store
                    .get_by_chunk_hashes(&import_hashes, false)
                    .await
                    .map_err(EngineError::Backend)?;
                let import_chunk_by_hash: HashMap<String, Chunk> =
                    import_chunks.into_iter().map(|c| (c.chunk_hash.clone(), c)).collect();
                for cf in import_chunk_files {
                    if let Some(chunk) = import_chunk_by_hash.get(&cf.chunk_hash) {
                        results.push(RetrievedChunk {
                            chunk_file: cf,
                            chunk: chunk.clone(),
                            score: 0.0,
                            is_focus: false,
                        });
                    }
                }
            }
        }

        // Step 5: dedup by (file_path, start_line), stable sort ascending.
        let mut dedup_seen: HashSet<(String, usize)> = HashSet::new();
        results.retain(|r| dedup_seen.insert((r.chunk_file.file_path.clone(), r.chunk_file.start_line)));
        results.sort_by(|a, b| {
            (a.chunk_file.file_path.as_str(), a.chunk_file.start_line)
                .cmp(&(b.chunk_file.file_path.as_str(), b.chunk_file.start_line))
        });

        // Step 6: optional reranking; on failure, pass through unchanged.
        if let Some(reranker) = self.reranker {
            let texts: Vec<String> = results.iter().map(|r| r.chunk.text.clone()).collect();
            match reranker.rerank(&req.query, &texts).await {
                Ok((order, _session_id)) => {
                    let mut reordered = Vec::with_capacity(order.len());
                    for idx in order {
                        if let Some(r) = results.get(idx) {
                            reordered.push(r.clone());
                        }
                    }
                    results = reordered;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "reranker call failed, passing candidates through unchanged");
                }
            }
        }

        // Focus chunks are never dropped and are prepended.
        let mut final_chunks = focus_chunks.clone();
        final_chunks.extend(results);
        final_chunks.truncate(req.max_chunks_to_return.max(focus_chunks.len()));

        Ok(RetrievalResponse {
            chunks: final_chunks,
            focus_chunks,
        })
    }

    /// Alternative lexical path (§4.7): BM25/LIKE over ChunkFiles' helper
    /// fields, grouped per search term, then hydrated into full chunks.
    pub async fn lexical_search(
        &self,
        terms: &[String],
        kind: SearchKind,
        files: Option<&[String]>,
        limit: usize,
    ) -> Result<HashMap<String, Vec<RetrievedChunk>>, EngineError> {
        let mut out = HashMap::new();
        for term in terms {
            let hits = self
                .store
                .keyword_search(term, kind, files, limit)
                .await
                .map_err(EngineError::Backend)?;
            let hashes: Vec<String> = hits.iter().map(|h| h.chunk_file.chunk_hash.clone()).collect();
            let chunks = self
                .store
                .get_by_chunk_hashes(&hashes, false)
                .await
                .map_err(EngineError::Backend)?;
            let chunk_by_hash: HashMap<String, Chunk> = chunks.into_iter().map(|c| (c.chunk_hash.clone(), c)).collect();
            let mut grouped = Vec::new();
            for hit in hits {
                if let Some(chunk) = chunk_by_hash.get(&hit.chunk_file.chunk_hash) {
                    grouped.push(RetrievedChunk {
                        chunk_file: hit.chunk_file,
                        chunk: chunk.clone(),
                        score: hit.score,
                        is_focus: false,
                    });
                }
            }
            out.insert(term.clone(), grouped);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteStore;
    use crate::types::ChunkMetaInfo;

    fn sample_chunk_file(path: &str, hash: &str, chunk_hash: &str, start: usize, import_only: bool) -> ChunkFile {
        ChunkFile {
            file_path: path.to_string(),
            file_hash: hash.to_string(),
            start_line: start,
            end_line: start + 1,
            total_chunks: 1,
            chunk_hash: chunk_hash.to_string(),
            classes: vec![],
            functions: vec!["f".to_string()],
            entities: String::new(),
            searchable_file_path: path.to_string(),
            searchable_file_name: path.to_string(),
            meta_info: ChunkMetaInfo {
                import_only_chunk: import_only,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn retrieve_dedups_and_orders_by_file_and_line() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .bulk_insert_chunk_files(&[
                sample_chunk_file("b.py", "h", "c2", 10, false),
                sample_chunk_file("a.py", "h", "c1", 5, false),
            ])
            .await
            .unwrap();
        store
            .bulk_insert_chunks(&[
                Chunk { chunk_hash: "c1".into(), text: "foo".into(), embedding: None, created_at: 0, last_used: 0 },
                Chunk { chunk_hash: "c2".into(), text: "foo".into(), embedding: None, created_at: 0, last_used: 0 },
            ])
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let pipeline = RetrievalPipeline::new(dir.path(), &store, None);
        let mut files = HashMap::new();
        files.insert("a.py".to_string(), "h".to_string());
        files.insert("b.py".to_string(), "h".to_string());

        let req = RetrievalRequest {
            query: "foo".to_string(),
            query_vector: None,
            focus: FocusInput::default(),
            max_chunks_to_return: 10,
            alpha: 0.7,
        };
        let resp = pipeline.retrieve(req, &files).await.unwrap();
        assert_eq!(resp.chunks[0].chunk_file.file_path, "a.py");
        assert_eq!(resp.chunks[1].chunk_file.file_path, "b.py");
    }

    #[tokio::test]
    async fn focus_chunk_is_prepended_and_never_dropped() {
        let store = SqliteStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "line1\nline2\nline3\n").unwrap();
        let pipeline = RetrievalPipeline::new(dir.path(), &store, None);

        let req = RetrievalRequest {
            query: "anything".to_string(),
            query_vector: None,
            focus: FocusInput {
                chunks: vec![FocusChunkSpec {
                    file_path: "a.py".to_string(),
                    start_line: 1,
                    end_line: 2,
                }],
                ..Default::default()
            },
            max_chunks_to_return: 10,
            alpha: 0.7,
        };
        let resp = pipeline.retrieve(req, &HashMap::new()).await.unwrap();
        assert_eq!(resp.focus_chunks.len(), 1);
        assert!(resp.chunks[0].is_focus);
        assert_eq!(resp.chunks[0].chunk.text, "line1\nline2");
    }
}
