//! Embedded vector-store backend: `rusqlite` with FTS5 virtual tables
//! (`chunk_files_fts` for file/class/function keyword search, `chunks_fts`
//! for BM25 over chunk text) and brute-force cosine for dense search, fused
//! via Reciprocal Rank Fusion. Used as the default adapter and by every test
//! in this crate that needs a real store without spawning a process.
//! Grounded on the `thiserror`-based service shape in
//! `a3895dbe_tyaso777-hybrid-search-rs` (`HybridService`, `ServiceError`)
//! and on the teacher's `IndexStore` persistence model.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{cosine_similarity, ScoredChunk, ScoredChunkFile, VectorStore, SCHEMA_VERSION};
use crate::errors::BackendError;
use crate::types::{Chunk, ChunkFile, ChunkMetaInfo, SearchKind};

fn to_backend_err(e: rusqlite::Error) -> BackendError {
    BackendError::Status {
        status: 0,
        body: e.to_string(),
    }
}

fn pack_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn unpack_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Reciprocal Rank Fusion constant (SPEC_FULL.md §4.5). 60 is the value used
/// by the original TREC/Cormack RRF papers and is what most BM25+vector
/// hybrid search implementations default to.
const RRF_K: f32 = 60.0;

/// Turn a free-text query into an FTS5 `MATCH` expression that ORs together
/// each term as a literal phrase, so natural-language queries (which are not
/// valid FTS5 query syntax on their own) don't throw a syntax error.
fn fts_match_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn = Connection::open_in_memory().map_err(to_backend_err)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_file(path: &std::path::Path) -> Result<Self, BackendError> {
        let conn = Connection::open(path).map_err(to_backend_err)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), BackendError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_details (k INTEGER PRIMARY KEY CHECK (k = 0), version INTEGER NOT NULL);
            CREATE TABLE IF NOT EXISTS chunks (
                chunk_hash TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                embedding BLOB,
                created_at INTEGER NOT NULL,
                last_used INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS chunk_files (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                file_hash TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                total_chunks INTEGER NOT NULL,
                chunk_hash TEXT NOT NULL,
                classes TEXT NOT NULL,
                functions TEXT NOT NULL,
                entities TEXT NOT NULL,
                searchable_file_path TEXT NOT NULL,
                searchable_file_name TEXT NOT NULL,
                meta_info TEXT NOT NULL,
                import_only_chunk INTEGER NOT NULL
            );
            CREATE VIRTUAL TABLE IF NOT EXISTS chunk_files_fts USING fts5(
                chunk_file_id UNINDEXED,
                searchable_file_path,
                searchable_file_name,
                classes,
                functions
            );
            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                chunk_hash UNINDEXED,
                text
            );
            "#,
        )
        .map_err(to_backend_err)?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn schema_version(&self) -> Result<Option<u32>, BackendError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.query_row("SELECT version FROM schema_details WHERE k = 0", [], |r| r.get(0))
                .optional()
                .map_err(to_backend_err)
        })
        .await
        .unwrap()
    }

    async fn set_schema_version(&self, version: u32) -> Result<(), BackendError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO schema_details (k, version) VALUES (0, ?1)
                 ON CONFLICT(k) DO UPDATE SET version = excluded.version",
                params![version],
            )
            .map_err(to_backend_err)?;
            Ok(())
        })
        .await
        .unwrap()
    }

    async fn wipe_all(&self) -> Result<(), BackendError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute_batch(
                "DELETE FROM chunks; DELETE FROM chunk_files; DELETE FROM chunk_files_fts; \
                 DELETE FROM chunks_fts; DELETE FROM schema_details;",
            )
            .map_err(to_backend_err)
        })
        .await
        .unwrap()
    }

    async fn ensure_collections(&self) -> Result<(), BackendError> {
        self.init_schema()
    }

    async fn get_by_file_hashes(&self, files: &HashMap<String, String>) -> Result<Vec<ChunkFile>, BackendError> {
        let conn = self.conn.clone();
        let files = files.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut out = Vec::new();
            // Batched in chunks of 1000 (§4.5); the embedded backend's
            // working set never approaches that, but the loop shape keeps
            // the contract explicit.
            let pairs: Vec<(&String, &String)> = files.iter().collect();
            for batch in pairs.chunks(1000) {
                for (path, hash) in batch {
                    let mut stmt = conn
                        .prepare("SELECT * FROM chunk_files WHERE file_path = ?1 AND file_hash = ?2")
                        .map_err(to_backend_err)?;
                    let rows = stmt
                        .query_map(params![path, hash], row_to_chunk_file)
                        .map_err(to_backend_err)?;
                    for row in rows {
                        out.push(row.map_err(to_backend_err)?);
                    }
                }
            }
            Ok(out)
        })
        .await
        .unwrap()
    }

    async fn get_only_import_chunk_files(&self, files: &HashMap<String, String>) -> Result<Vec<ChunkFile>, BackendError> {
        let all = self.get_by_file_hashes(files).await?;
        Ok(all.into_iter().filter(|c| c.meta_info.import_only_chunk).collect())
    }

    async fn keyword_search(
        &self,
        keyword: &str,
        kind: SearchKind,
        files: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<ScoredChunkFile>, BackendError> {
        let conn = self.conn.clone();
        let keyword = keyword.to_string();
        let files: Option<Vec<String>> = files.map(|f| f.to_vec());

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut out = Vec::new();

            if keyword.chars().count() >= 3 {
                let mut stmt = conn
                    .prepare(
                        "SELECT cf.*, bm25(chunk_files_fts) AS rank
                         FROM chunk_files_fts
                         JOIN chunk_files cf ON cf.id = chunk_files_fts.chunk_file_id
                         WHERE chunk_files_fts MATCH ?1
                         ORDER BY rank LIMIT ?2",
                    )
                    .map_err(to_backend_err)?;
                let rows = stmt
                    .query_map(params![keyword, limit as i64], |row| {
                        let cf = row_to_chunk_file(row)?;
                        let rank: f64 = row.get("rank")?;
                        Ok((cf, -rank as f32))
                    })
                    .map_err(to_backend_err)?;
                for row in rows {
                    let (cf, score) = row.map_err(to_backend_err)?;
                    out.push(ScoredChunkFile { chunk_file: cf, score });
                }
            } else {
                let like = format!("%{keyword}%");
                let field = match kind {
                    SearchKind::Class => "classes",
                    SearchKind::Function => "functions",
                    SearchKind::File => "searchable_file_path",
                };
                let sql = format!("SELECT * FROM chunk_files WHERE {field} LIKE ?1 LIMIT ?2");
                let mut stmt = conn.prepare(&sql).map_err(to_backend_err)?;
                let rows = stmt
                    .query_map(params![like, limit as i64], row_to_chunk_file)
                    .map_err(to_backend_err)?;
                for row in rows {
                    out.push(ScoredChunkFile {
                        chunk_file: row.map_err(to_backend_err)?,
                        score: 1.0,
                    });
                }
            }

            if let Some(files) = files {
                out.retain(|s| files.contains(&s.chunk_file.file_path));
            }
            Ok(out)
        })
        .await
        .unwrap()
    }

    async fn get_chunk_files_matching_exact(
        &self,
        search_key: &str,
        kind: SearchKind,
        file_path: &str,
        file_hash: &str,
    ) -> Result<Vec<ChunkFile>, BackendError> {
        let conn = self.conn.clone();
        let search_key = search_key.to_string();
        let file_path = file_path.to_string();
        let file_hash = file_hash.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let field = match kind {
                SearchKind::Class => "classes",
                SearchKind::Function => "functions",
                SearchKind::File => "searchable_file_path",
            };
            let sql = format!(
                "SELECT * FROM chunk_files WHERE file_path = ?1 AND file_hash = ?2 AND (','||{field}||',') LIKE ?3"
            );
            let like = format!("%,{search_key},%");
            let mut stmt = conn.prepare(&sql).map_err(to_backend_err)?;
            let rows = stmt
                .query_map(params![file_path, file_hash, like], row_to_chunk_file)
                .map_err(to_backend_err)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(to_backend_err)?);
            }
            Ok(out)
        })
        .await
        .unwrap()
    }

    async fn bulk_insert_chunk_files(&self, records: &[ChunkFile]) -> Result<(), BackendError> {
        let conn = self.conn.clone();
        let records = records.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            let tx = conn.transaction().map_err(to_backend_err)?;
            for cf in &records {
                let id = cf.id();
                let meta_json = serde_json::to_string(&cf.meta_info).unwrap_or_default();
                let classes = cf.classes.join(",");
                let functions = cf.functions.join(",");
                tx.execute(
                    "INSERT INTO chunk_files (id, file_path, file_hash, start_line, end_line, total_chunks,
                        chunk_hash, classes, functions, entities, searchable_file_path, searchable_file_name,
                        meta_info, import_only_chunk)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
                     ON CONFLICT(id) DO NOTHING",
                    params![
                        id,
                        cf.file_path,
                        cf.file_hash,
                        cf.start_line as i64,
                        cf.end_line as i64,
                        cf.total_chunks as i64,
                        cf.chunk_hash,
                        classes,
                        functions,
                        cf.entities,
                        cf.searchable_file_path,
                        cf.searchable_file_name,
                        meta_json,
                        cf.meta_info.import_only_chunk as i64,
                    ],
                )
                .map_err(to_backend_err)?;
                tx.execute(
                    "INSERT INTO chunk_files_fts (chunk_file_id, searchable_file_path, searchable_file_name, classes, functions)
                     VALUES (?1,?2,?3,?4,?5)",
                    params![id, cf.searchable_file_path, cf.searchable_file_name, classes, functions],
                )
                .map_err(to_backend_err)?;
            }
            tx.commit().map_err(to_backend_err)?;
            Ok(())
        })
        .await
        .unwrap()
    }

    async fn filtered_vector_hybrid_search(
        &self,
        chunk_hashes: &[String],
        query: &str,
        query_vector: Option<&[f32]>,
        limit: usize,
        alpha: f32,
    ) -> Result<Vec<ScoredChunk>, BackendError> {
        let conn = self.conn.clone();
        let chunk_hashes = chunk_hashes.to_vec();
        let query = query.to_string();
        let query_vector = query_vector.map(|v| v.to_vec());

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            if chunk_hashes.is_empty() {
                return Ok(Vec::new());
            }
            let candidates: std::collections::HashSet<&String> = chunk_hashes.iter().collect();

            let placeholders = chunk_hashes.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!("SELECT * FROM chunks WHERE chunk_hash IN ({placeholders})");
            let mut stmt = conn.prepare(&sql).map_err(to_backend_err)?;
            let params_vec: Vec<&dyn rusqlite::ToSql> =
                chunk_hashes.iter().map(|h| h as &dyn rusqlite::ToSql).collect();
            let rows = stmt
                .query_map(params_vec.as_slice(), row_to_chunk)
                .map_err(to_backend_err)?;
            let mut by_hash: HashMap<String, Chunk> = HashMap::new();
            for row in rows {
                let chunk = row.map_err(to_backend_err)?;
                by_hash.insert(chunk.chunk_hash.clone(), chunk);
            }

            // Lexical ranking: real BM25 over `chunks_fts`, restricted to the
            // candidate set, best (lowest bm25) first.
            let mut lexical_order: Vec<String> = Vec::new();
            if let Some(match_expr) = fts_match_query(&query) {
                let mut stmt = conn
                    .prepare(
                        "SELECT chunk_hash, bm25(chunks_fts) AS rank FROM chunks_fts
                         WHERE chunks_fts MATCH ?1 ORDER BY rank",
                    )
                    .map_err(to_backend_err)?;
                let rows = stmt
                    .query_map(params![match_expr], |row| {
                        let hash: String = row.get("chunk_hash")?;
                        Ok(hash)
                    })
                    .map_err(to_backend_err)?;
                for row in rows {
                    let hash = row.map_err(to_backend_err)?;
                    if candidates.contains(&hash) {
                        lexical_order.push(hash);
                    }
                }
            }
            let lexical_rank: HashMap<&str, usize> =
                lexical_order.iter().enumerate().map(|(i, h)| (h.as_str(), i)).collect();

            // Dense ranking: cosine similarity against the query vector,
            // best (highest cosine) first.
            let mut dense_order: Vec<(String, f32)> = by_hash
                .values()
                .filter_map(|c| match (&query_vector, &c.embedding) {
                    (Some(q), Some(e)) => Some((c.chunk_hash.clone(), cosine_similarity(q, e))),
                    _ => None,
                })
                .collect();
            dense_order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            let dense_rank: HashMap<&str, usize> =
                dense_order.iter().enumerate().map(|(i, (h, _))| (h.as_str(), i)).collect();

            // Reciprocal Rank Fusion (SPEC_FULL.md §4.5): combine the two
            // rankings by position, not raw score, weighted by `alpha`
            // between the dense and lexical lists. A chunk absent from a
            // list gets no contribution from it rather than a worst-case
            // rank, so a chunk present in only one list is still reachable.
            let mut scored = Vec::new();
            for (hash, chunk) in by_hash {
                let mut score = 0.0f32;
                if let Some(&rank) = dense_rank.get(hash.as_str()) {
                    score += alpha * (1.0 / (RRF_K + rank as f32 + 1.0));
                }
                if let Some(&rank) = lexical_rank.get(hash.as_str()) {
                    score += (1.0 - alpha) * (1.0 / (RRF_K + rank as f32 + 1.0));
                }
                scored.push(ScoredChunk { chunk, score });
            }
            scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(limit);
            Ok(scored)
        })
        .await
        .unwrap()
    }

    async fn get_by_chunk_hashes(&self, chunk_hashes: &[String], with_vector: bool) -> Result<Vec<Chunk>, BackendError> {
        let conn = self.conn.clone();
        let chunk_hashes = chunk_hashes.to_vec();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut out = Vec::new();
            let mut seen = std::collections::HashSet::new();
            for batch in chunk_hashes.chunks(1000) {
                let placeholders = batch.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let sql = format!("SELECT * FROM chunks WHERE chunk_hash IN ({placeholders})");
                let mut stmt = conn.prepare(&sql).map_err(to_backend_err)?;
                let params_vec: Vec<&dyn rusqlite::ToSql> = batch.iter().map(|h| h as &dyn rusqlite::ToSql).collect();
                let rows = stmt.query_map(params_vec.as_slice(), row_to_chunk).map_err(to_backend_err)?;
                for row in rows {
                    let mut chunk = row.map_err(to_backend_err)?;
                    if !with_vector {
                        chunk.embedding = None;
                    }
                    if seen.insert(chunk.chunk_hash.clone()) {
                        out.push(chunk);
                    }
                }
            }
            Ok(out)
        })
        .await
        .unwrap()
    }

    async fn bulk_insert_chunks(&self, chunks: &[Chunk]) -> Result<(), BackendError> {
        let conn = self.conn.clone();
        let chunks = chunks.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            let tx = conn.transaction().map_err(to_backend_err)?;
            for chunk in &chunks {
                let embedding_blob = chunk.embedding.as_deref().map(pack_vector);
                tx.execute(
                    "INSERT INTO chunks (chunk_hash, text, embedding, created_at, last_used)
                     VALUES (?1,?2,?3,?4,?5)
                     ON CONFLICT(chunk_hash) DO UPDATE SET
                        embedding = COALESCE(excluded.embedding, chunks.embedding),
                        last_used = excluded.last_used",
                    params![chunk.chunk_hash, chunk.text, embedding_blob, chunk.created_at, chunk.last_used],
                )
                .map_err(to_backend_err)?;
                // chunk_hash is content-addressed so text never changes for an
                // existing hash, but re-syncing the same chunk must not pile
                // up duplicate FTS rows.
                tx.execute("DELETE FROM chunks_fts WHERE chunk_hash = ?1", params![chunk.chunk_hash])
                    .map_err(to_backend_err)?;
                tx.execute(
                    "INSERT INTO chunks_fts (chunk_hash, text) VALUES (?1, ?2)",
                    params![chunk.chunk_hash, chunk.text],
                )
                .map_err(to_backend_err)?;
            }
            tx.commit().map_err(to_backend_err)?;
            Ok(())
        })
        .await
        .unwrap()
    }

    async fn update_timestamps(
        &self,
        chunk_hashes: &[String],
        updated_at: i64,
        created_at: Option<i64>,
    ) -> Result<(), BackendError> {
        // Bounded concurrency (semaphore of 50) is the store-process
        // contract upstream of this embedded backend; a single transaction
        // already serializes writes, so the semaphore is applied by callers
        // that drive many stores/shards, not needed for one connection.
        let conn = self.conn.clone();
        let chunk_hashes = chunk_hashes.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            let tx = conn.transaction().map_err(to_backend_err)?;
            for hash in &chunk_hashes {
                let res = if let Some(created_at) = created_at {
                    tx.execute(
                        "UPDATE chunks SET last_used = ?1, created_at = ?2 WHERE chunk_hash = ?3",
                        params![updated_at, created_at, hash],
                    )
                } else {
                    tx.execute(
                        "UPDATE chunks SET last_used = ?1 WHERE chunk_hash = ?2",
                        params![updated_at, hash],
                    )
                };
                // Per-item error isolation (§4.5): log and continue rather
                // than aborting the whole batch.
                if let Err(e) = res {
                    tracing::debug!(%hash, error = %e, "update_timestamps: per-item failure");
                }
            }
            tx.commit().map_err(to_backend_err)?;
            Ok(())
        })
        .await
        .unwrap()
    }

    async fn update_embedding(&self, chunk_hash: &str, embedding: &[f32]) -> Result<(), BackendError> {
        let conn = self.conn.clone();
        let chunk_hash = chunk_hash.to_string();
        let blob = pack_vector(embedding);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE chunks SET embedding = ?1 WHERE chunk_hash = ?2",
                params![blob, chunk_hash],
            )
            .map_err(to_backend_err)?;
            Ok(())
        })
        .await
        .unwrap()
    }

    async fn cleanup_old(&self, last_used_lt: i64, exclusion_chunk_hashes: &[String]) -> Result<usize, BackendError> {
        let conn = self.conn.clone();
        let exclusion = exclusion_chunk_hashes.to_vec();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut total = 0usize;
            loop {
                let excl_placeholders = if exclusion.is_empty() {
                    String::new()
                } else {
                    format!(
                        " AND chunk_hash NOT IN ({})",
                        exclusion.iter().map(|_| "?").collect::<Vec<_>>().join(",")
                    )
                };
                let sql = format!("SELECT chunk_hash FROM chunks WHERE last_used < ?{excl_placeholders} LIMIT 1000");
                let mut stmt = conn.prepare(&sql).map_err(to_backend_err)?;
                let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&last_used_lt];
                for h in &exclusion {
                    params_vec.push(h);
                }
                let hashes: Vec<String> = stmt
                    .query_map(params_vec.as_slice(), |r| r.get(0))
                    .map_err(to_backend_err)?
                    .collect::<Result<_, _>>()
                    .map_err(to_backend_err)?;
                if hashes.is_empty() {
                    break;
                }
                let del_placeholders = hashes.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let del_sql = format!("DELETE FROM chunks WHERE chunk_hash IN ({del_placeholders})");
                let del_params: Vec<&dyn rusqlite::ToSql> = hashes.iter().map(|h| h as &dyn rusqlite::ToSql).collect();
                conn.execute(&del_sql, del_params.as_slice()).map_err(to_backend_err)?;
                total += hashes.len();
            }
            Ok(total)
        })
        .await
        .unwrap()
    }

    async fn cleanup_old_chunk_files(&self, last_used_lt: i64, exclusion_chunk_hashes: &[String]) -> Result<usize, BackendError> {
        // ChunkFiles have no direct `last_used`; they are cleaned by
        // following the chunk_hash references that `cleanup_old` just
        // removed, minus anything still excluded (§4.8).
        let _ = last_used_lt;
        let conn = self.conn.clone();
        let exclusion = exclusion_chunk_hashes.to_vec();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let excl_placeholders = if exclusion.is_empty() {
                String::new()
            } else {
                format!(
                    " AND chunk_hash NOT IN ({})",
                    exclusion.iter().map(|_| "?").collect::<Vec<_>>().join(",")
                )
            };
            let sql = format!(
                "DELETE FROM chunk_files WHERE chunk_hash NOT IN (SELECT chunk_hash FROM chunks){excl_placeholders}"
            );
            let mut stmt = conn.prepare(&sql).map_err(to_backend_err)?;
            let params_vec: Vec<&dyn rusqlite::ToSql> = exclusion.iter().map(|h| h as &dyn rusqlite::ToSql).collect();
            let count = stmt.execute(params_vec.as_slice()).map_err(to_backend_err)?;
            Ok(count)
        })
        .await
        .unwrap()
    }
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    let embedding_blob: Option<Vec<u8>> = row.get("embedding")?;
    Ok(Chunk {
        chunk_hash: row.get("chunk_hash")?,
        text: row.get("text")?,
        embedding: embedding_blob.map(|b| unpack_vector(&b)),
        created_at: row.get("created_at")?,
        last_used: row.get("last_used")?,
    })
}

fn row_to_chunk_file(row: &rusqlite::Row) -> rusqlite::Result<ChunkFile> {
    let meta_json: String = row.get("meta_info")?;
    let meta_info: ChunkMetaInfo = serde_json::from_str(&meta_json).unwrap_or_default();
    let classes: String = row.get("classes")?;
    let functions: String = row.get("functions")?;
    Ok(ChunkFile {
        file_path: row.get("file_path")?,
        file_hash: row.get("file_hash")?,
        start_line: row.get::<_, i64>("start_line")? as usize,
        end_line: row.get::<_, i64>("end_line")? as usize,
        total_chunks: row.get::<_, i64>("total_chunks")? as usize,
        chunk_hash: row.get("chunk_hash")?,
        classes: classes.split(',').filter(|s| !s.is_empty()).map(String::from).collect(),
        functions: functions.split(',').filter(|s| !s.is_empty()).map(String::from).collect(),
        entities: row.get("entities")?,
        searchable_file_path: row.get("searchable_file_path")?,
        searchable_file_name: row.get("searchable_file_name")?,
        meta_info,
    })
}

pub async fn ensure_schema_current(store: &SqliteStore) -> Result<(), BackendError> {
    match store.schema_version().await? {
        Some(v) if v == SCHEMA_VERSION => {}
        _ => {
            store.wipe_all().await?;
            store.ensure_collections().await?;
            store.set_schema_version(SCHEMA_VERSION).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk(hash: &str, text: &str, last_used: i64) -> Chunk {
        Chunk {
            chunk_hash: hash.to_string(),
            text: text.to_string(),
            embedding: Some(vec![1.0, 0.0, 0.0]),
            created_at: 0,
            last_used,
        }
    }

    fn sample_chunk_file(path: &str, hash: &str, chunk_hash: &str) -> ChunkFile {
        ChunkFile {
            file_path: path.to_string(),
            file_hash: hash.to_string(),
            start_line: 1,
            end_line: 2,
            total_chunks: 1,
            chunk_hash: chunk_hash.to_string(),
            classes: vec![],
            functions: vec!["foo".to_string()],
            entities: String::new(),
            searchable_file_path: path.to_string(),
            searchable_file_name: path.to_string(),
            meta_info: ChunkMetaInfo::default(),
        }
    }

    #[tokio::test]
    async fn insert_then_fetch_by_file_hash_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let cf = sample_chunk_file("a.py", "h1", "c1");
        store.bulk_insert_chunk_files(&[cf.clone()]).await.unwrap();
        store.bulk_insert_chunks(&[sample_chunk("c1", "def f(): pass", 100)]).await.unwrap();

        let mut files = HashMap::new();
        files.insert("a.py".to_string(), "h1".to_string());
        let fetched = store.get_by_file_hashes(&files).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].chunk_hash, "c1");
    }

    #[tokio::test]
    async fn cleanup_respects_exclusion_set() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .bulk_insert_chunks(&[sample_chunk("old", "x", 10), sample_chunk("kept", "y", 10)])
            .await
            .unwrap();

        let deleted = store.cleanup_old(100, &["kept".to_string()]).await.unwrap();
        assert_eq!(deleted, 1);
        let remaining = store.get_by_chunk_hashes(&["old".to_string(), "kept".to_string()], false).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].chunk_hash, "kept");
    }

    #[tokio::test]
    async fn hybrid_search_prefers_matching_vector() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .bulk_insert_chunks(&[
                Chunk { chunk_hash: "a".into(), text: "foo bar".into(), embedding: Some(vec![1.0, 0.0]), created_at: 0, last_used: 0 },
                Chunk { chunk_hash: "b".into(), text: "foo bar".into(), embedding: Some(vec![0.0, 1.0]), created_at: 0, last_used: 0 },
            ])
            .await
            .unwrap();

        let results = store
            .filtered_vector_hybrid_search(&["a".into(), "b".into()], "foo", Some(&[1.0, 0.0]), 10, 1.0)
            .await
            .unwrap();
        assert_eq!(results[0].chunk.chunk_hash, "a");
    }

    #[tokio::test]
    async fn hybrid_search_uses_real_bm25_for_lexical_signal() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .bulk_insert_chunks(&[
                Chunk { chunk_hash: "a".into(), text: "parse the configuration file".into(), embedding: None, created_at: 0, last_used: 0 },
                Chunk { chunk_hash: "b".into(), text: "unrelated database migration logic".into(), embedding: None, created_at: 0, last_used: 0 },
            ])
            .await
            .unwrap();

        let results = store
            .filtered_vector_hybrid_search(&["a".into(), "b".into()], "configuration file", None, 10, 0.0)
            .await
            .unwrap();
        assert_eq!(results[0].chunk.chunk_hash, "a");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn hybrid_search_reaches_chunk_present_in_only_one_ranking() {
        let store = SqliteStore::open_in_memory().unwrap();
        // "a" only matches lexically (no embedding); "b" only matches
        // densely (unrelated text). Both must still surface with alpha=0.5.
        store
            .bulk_insert_chunks(&[
                Chunk { chunk_hash: "a".into(), text: "reciprocal rank fusion".into(), embedding: None, created_at: 0, last_used: 0 },
                Chunk { chunk_hash: "b".into(), text: "xyz".into(), embedding: Some(vec![1.0, 0.0]), created_at: 0, last_used: 0 },
            ])
            .await
            .unwrap();

        let results = store
            .filtered_vector_hybrid_search(&["a".into(), "b".into()], "reciprocal rank fusion", Some(&[1.0, 0.0]), 10, 0.5)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn schema_version_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().await.unwrap(), None);
        store.set_schema_version(SCHEMA_VERSION).await.unwrap();
        assert_eq!(store.schema_version().await.unwrap(), Some(SCHEMA_VERSION));
    }
}
