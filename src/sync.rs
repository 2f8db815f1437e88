//! Differential Synchronizer (C6, §4.6): reconciles the vector store with
//! the repo's current `file_path -> file_hash` map by partitioning files
//! into reuse/re-embed/new, then chunking, embedding, and upserting only
//! the work each partition actually needs. Grounded on the teacher's
//! `vector_store.rs::refresh` (partition-then-batch shape, background
//! embed task plus a monitor) and on `chunker::chunk_file` / `embedding`
//! for the per-batch work itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::chunker::chunk_file;
use crate::chunker::rules::classify_chunk;
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingClient;
use crate::errors::EngineError;
use crate::hashing::xxh3_hex;
use crate::language::language_of;
use crate::store::VectorStore;
use crate::types::{Chunk, ChunkFile, ChunkMetaInfo, HierarchyEntry};

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Canonical text for both `chunk_hash` derivation and the embedding input
/// (§4.6 "Content hashing for chunks") — a `<meta_data>` header followed by
/// the raw chunk text.
fn canonical_text(file_path: &str, hierarchy: &[HierarchyEntry], text: &str) -> String {
    let hierarchy_str = hierarchy
        .iter()
        .map(|h| h.value.as_str())
        .collect::<Vec<_>>()
        .join(" > ");
    format!("<meta_data>\nfile_path: {file_path}\nhierarchy: {hierarchy_str}\n</meta_data>\n{text}")
}

struct PreparedChunk {
    chunk_hash: String,
    canonical_text: String,
    chunk_file: ChunkFile,
}

pub struct DifferentialSynchronizer {
    repo_root: PathBuf,
    store: Arc<dyn VectorStore>,
    embedding: Arc<EmbeddingClient>,
    chunking: ChunkingConfig,
    max_batch_size_chunking: usize,
}

impl DifferentialSynchronizer {
    pub fn new(
        repo_root: PathBuf,
        store: Arc<dyn VectorStore>,
        embedding: Arc<EmbeddingClient>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            repo_root,
            store,
            embedding,
            chunking,
            max_batch_size_chunking: 200,
        }
    }

    /// `sync(files) -> [Chunk]` (§4.6).
    pub async fn sync(&self, files: &HashMap<String, String>) -> Result<Vec<Chunk>, EngineError> {
        self.update(files, files).await
    }

    /// `update(files, files_to_replace) -> [Chunk]` (§4.6): a targeted
    /// re-sync restricted to `files_to_replace`, but partitioned against the
    /// full `files` state so reuse/re-embed decisions stay correct.
    pub async fn update(
        &self,
        files: &HashMap<String, String>,
        files_to_replace: &HashMap<String, String>,
    ) -> Result<Vec<Chunk>, EngineError> {
        let (reuse, re_embed, new_files) = self.partition(files_to_replace).await?;

        let mut all_chunks = Vec::new();

        if !reuse.is_empty() {
            let reused = self.refresh_reused(&reuse, files).await?;
            all_chunks.extend(reused);
        }

        for batch in re_embed.chunks(self.max_batch_size_chunking) {
            let chunks = self.process_batch(batch, files, true).await?;
            all_chunks.extend(chunks);
        }

        for batch in new_files.chunks(self.max_batch_size_chunking) {
            let chunks = self.process_batch(batch, files, false).await?;
            all_chunks.extend(chunks);
        }

        Ok(all_chunks)
    }

    /// Step 2 of §4.6's algorithm: ask the store for valid placements, then
    /// bucket every requested path into reuse / re-embed / new.
    async fn partition(
        &self,
        files: &HashMap<String, String>,
    ) -> Result<(Vec<String>, Vec<String>, Vec<String>), EngineError> {
        let existing = self
            .store
            .get_by_file_hashes(files)
            .await
            .map_err(EngineError::Backend)?;

        let mut by_path: HashMap<String, Vec<ChunkFile>> = HashMap::new();
        for cf in existing {
            by_path.entry(cf.file_path.clone()).or_default().push(cf);
        }

        let mut reuse = Vec::new();
        let mut re_embed = Vec::new();
        let mut new_files = Vec::new();

        for path in files.keys() {
            match by_path.get(path) {
                None => new_files.push(path.clone()),
                Some(chunk_files) => {
                    let hashes: Vec<String> = chunk_files.iter().map(|c| c.chunk_hash.clone()).collect();
                    let chunks = self
                        .store
                        .get_by_chunk_hashes(&hashes, true)
                        .await
                        .map_err(EngineError::Backend)?;
                    let all_embedded = chunks.len() == hashes.len() && chunks.iter().all(|c| c.embedding.is_some());
                    if all_embedded {
                        reuse.push(path.clone());
                    } else {
                        re_embed.push(path.clone());
                    }
                }
            }
        }

        Ok((reuse, re_embed, new_files))
    }

    /// Reuse path: no re-chunking, just bump `last_used` (§4.6 "reuse").
    async fn refresh_reused(
        &self,
        paths: &[String],
        files: &HashMap<String, String>,
    ) -> Result<Vec<Chunk>, EngineError> {
        let mut file_map = HashMap::new();
        for p in paths {
            if let Some(h) = files.get(p) {
                file_map.insert(p.clone(), h.clone());
            }
        }
        let chunk_files = self
            .store
            .get_by_file_hashes(&file_map)
            .await
            .map_err(EngineError::Backend)?;
        let hashes: Vec<String> = chunk_files.iter().map(|c| c.chunk_hash.clone()).collect();
        let now = now_unix();
        if !hashes.is_empty() {
            self.store
                .update_timestamps(&hashes, now, None)
                .await
                .map_err(EngineError::Backend)?;
        }
        self.store
            .get_by_chunk_hashes(&hashes, false)
            .await
            .map_err(EngineError::Backend)
    }

    /// Chunk + embed + upsert one batch of files (§4.6 step 3). `reembed_only`
    /// restricts the embedding call to chunks whose vector is currently
    /// missing; `sync`/new-file batches always embed everything produced.
    async fn process_batch(
        &self,
        paths: &[String],
        files: &HashMap<String, String>,
        reembed_only: bool,
    ) -> Result<Vec<Chunk>, EngineError> {
        let mut prepared: Vec<PreparedChunk> = Vec::new();

        for path in paths {
            let file_hash = match files.get(path) {
                Some(h) => h.clone(),
                None => continue,
            };
            let abs_path = self.repo_root.join(path);
            let source = match std::fs::read_to_string(&abs_path) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(path, error = %e, "failed to read file for chunking");
                    continue;
                }
            };
            let language = language_of(Path::new(path));
            let raw_chunks = match chunk_file(&source, language, self.chunking.character_size) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path, reason = %e.reason, "per-file chunking failure, skipping");
                    continue;
                }
            };
            let total = raw_chunks.len();
            let all_classes: Vec<String> = raw_chunks
                .iter()
                .filter_map(|rc| classify_chunk(language, &rc.node_type).0.then(|| rc.node_name.clone()))
                .collect();
            let all_functions: Vec<String> = raw_chunks
                .iter()
                .filter_map(|rc| classify_chunk(language, &rc.node_type).1.then(|| rc.node_name.clone()))
                .collect();

            for rc in raw_chunks {
                let (is_class, is_function) = classify_chunk(language, &rc.node_type);
                let canonical = canonical_text(path, &rc.hierarchy, &rc.text);
                let chunk_hash = xxh3_hex(canonical.as_bytes());
                let meta_info = ChunkMetaInfo {
                    hierarchy: rc.hierarchy.clone(),
                    dechunk: false,
                    import_only_chunk: rc.is_import_block,
                    all_classes: all_classes.clone(),
                    all_functions: all_functions.clone(),
                    byte_size: rc.text.len(),
                };
                let cf = ChunkFile {
                    file_path: path.clone(),
                    file_hash: file_hash.clone(),
                    start_line: rc.start_line,
                    end_line: rc.end_line,
                    total_chunks: total,
                    chunk_hash: chunk_hash.clone(),
                    classes: if is_class { vec![rc.node_name.clone()] } else { vec![] },
                    functions: if is_function { vec![rc.node_name.clone()] } else { vec![] },
                    entities: rc.node_name.clone(),
                    searchable_file_path: path.clone(),
                    searchable_file_name: abs_path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default(),
                    meta_info,
                };
                prepared.push(PreparedChunk {
                    chunk_hash,
                    canonical_text: canonical,
                    chunk_file: cf,
                });
            }
        }

        if prepared.is_empty() {
            return Ok(Vec::new());
        }

        let to_embed: Vec<(usize, String)> = if reembed_only {
            let hashes: Vec<String> = prepared.iter().map(|p| p.chunk_hash.clone()).collect();
            let existing = self
                .store
                .get_by_chunk_hashes(&hashes, true)
                .await
                .map_err(EngineError::Backend)?;
            let embedded: std::collections::HashSet<String> = existing
                .into_iter()
                .filter(|c| c.embedding.is_some())
                .map(|c| c.chunk_hash)
                .collect();
            prepared
                .iter()
                .enumerate()
                .filter(|(_, p)| !embedded.contains(&p.chunk_hash))
                .map(|(i, p)| (i, p.canonical_text.clone()))
                .collect()
        } else {
            prepared
                .iter()
                .enumerate()
                .map(|(i, p)| (i, p.canonical_text.clone()))
                .collect()
        };

        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; prepared.len()];
        if !to_embed.is_empty() {
            let texts: Vec<String> = to_embed.iter().map(|(_, t)| t.clone()).collect();
            let (embedded, _tokens) = self.embedding.embed(texts, CancellationToken::new()).await?;
            for ((idx, _), vector) in to_embed.into_iter().zip(embedded.into_iter()) {
                vectors[idx] = Some(vector);
            }
        }

        let now = now_unix();
        let chunks: Vec<Chunk> = prepared
            .iter()
            .zip(vectors.into_iter())
            .map(|(p, vector)| Chunk {
                chunk_hash: p.chunk_hash.clone(),
                text: p.canonical_text.clone(),
                embedding: vector,
                created_at: now,
                last_used: now,
            })
            .collect();

        let chunk_files: Vec<ChunkFile> = prepared.into_iter().map(|p| p.chunk_file).collect();

        self.store
            .bulk_insert_chunk_files(&chunk_files)
            .await
            .map_err(EngineError::Backend)?;
        self.store
            .bulk_insert_chunks(&chunks)
            .await
            .map_err(EngineError::Backend)?;

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{CharsPerTokenCounter, EmbeddingProvider};
    use crate::errors::BackendError;
    use crate::store::sqlite::SqliteStore;
    use async_trait::async_trait;

    struct FakeProvider;

    #[async_trait]
    impl EmbeddingProvider for FakeProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, u64), BackendError> {
            Ok((texts.iter().map(|_| vec![1.0, 0.0]).collect(), texts.len() as u64))
        }
        fn dimensions(&self) -> usize {
            2
        }
    }

    fn make_synchronizer(repo_root: PathBuf) -> DifferentialSynchronizer {
        let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let embedding = Arc::new(EmbeddingClient::new(
            Arc::new(FakeProvider),
            Arc::new(CharsPerTokenCounter::default()),
            2048,
            4,
            10,
            100,
        ));
        DifferentialSynchronizer::new(repo_root, store, embedding, ChunkingConfig::default())
    }

    #[tokio::test]
    async fn sync_new_python_file_produces_embedded_chunks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def foo():\n    return 1\n").unwrap();
        let sync = make_synchronizer(dir.path().to_path_buf());

        let mut files = HashMap::new();
        files.insert("a.py".to_string(), "hash1".to_string());

        let chunks = sync.sync(&files).await.unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.embedding.is_some()));
    }

    #[tokio::test]
    async fn second_sync_with_unchanged_hash_reuses_chunks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def foo():\n    return 1\n").unwrap();
        let sync = make_synchronizer(dir.path().to_path_buf());

        let mut files = HashMap::new();
        files.insert("a.py".to_string(), "hash1".to_string());

        let first = sync.sync(&files).await.unwrap();
        let second = sync.sync(&files).await.unwrap();
        assert_eq!(first.len(), second.len());
    }
}
