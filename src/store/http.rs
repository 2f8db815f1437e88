//! HTTP client for the externally-specified vector-store process (§6).
//! Out of scope per spec.md §1 is the database binary itself; this is only
//! the client surface, mirroring [`super::sqlite::SqliteStore`]'s contract
//! one-for-one so callers can swap backends via `dyn VectorStore` (§9
//! "Embedded database spin-up"). Grounded on the teacher's `reqwest`-based
//! `registry.rs` client (bearer auth, typed request/response structs,
//! status-to-`BackendError` mapping).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ScoredChunk, ScoredChunkFile, VectorStore};
use crate::errors::BackendError;
use crate::types::{Chunk, ChunkFile, SearchKind};

pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(host: &str, http_port: u16, client_timeout_secs: u64) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(client_timeout_secs))
            .build()
            .map_err(BackendError::Request)?;
        Ok(Self {
            client,
            base_url: format!("http://{host}:{http_port}"),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(BackendError::Status { status, body })
    }
}

fn search_kind_str(kind: SearchKind) -> &'static str {
    match kind {
        SearchKind::Class => "class",
        SearchKind::Function => "function",
        SearchKind::File => "file",
    }
}

#[derive(Serialize)]
struct FileHashesQuery<'a> {
    files: &'a HashMap<String, String>,
}

#[derive(Serialize)]
struct KeywordSearchQuery<'a> {
    keyword: &'a str,
    kind: &'static str,
    files: Option<&'a [String]>,
    limit: usize,
}

#[derive(Serialize)]
struct ExactMatchQuery<'a> {
    search_key: &'a str,
    kind: &'static str,
    file_path: &'a str,
    file_hash: &'a str,
}

#[derive(Serialize)]
struct HybridSearchQuery<'a> {
    chunk_hashes: &'a [String],
    query: &'a str,
    query_vector: Option<&'a [f32]>,
    limit: usize,
    alpha: f32,
}

#[derive(Serialize)]
struct ChunkHashesQuery<'a> {
    chunk_hashes: &'a [String],
    with_vector: bool,
}

#[derive(Serialize)]
struct UpdateTimestampsBody<'a> {
    chunk_hashes: &'a [String],
    updated_at: i64,
    created_at: Option<i64>,
}

#[derive(Serialize)]
struct UpdateEmbeddingBody<'a> {
    chunk_hash: &'a str,
    embedding: &'a [f32],
}

#[derive(Serialize)]
struct CleanupQuery<'a> {
    last_used_lt: i64,
    exclusion_chunk_hashes: &'a [String],
}

#[derive(Deserialize)]
struct CleanupResponse {
    deleted: usize,
}

#[derive(Deserialize)]
struct SchemaVersionResponse {
    version: Option<u32>,
}

#[async_trait]
impl VectorStore for HttpStore {
    async fn schema_version(&self) -> Result<Option<u32>, BackendError> {
        let resp = self.client.get(self.url("/schema/version")).send().await?;
        let resp = Self::check_status(resp).await?;
        let parsed: SchemaVersionResponse = resp.json().await?;
        Ok(parsed.version)
    }

    async fn set_schema_version(&self, version: u32) -> Result<(), BackendError> {
        let resp = self
            .client
            .put(self.url("/schema/version"))
            .json(&serde_json::json!({ "version": version }))
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn wipe_all(&self) -> Result<(), BackendError> {
        let resp = self.client.post(self.url("/admin/wipe")).send().await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn ensure_collections(&self) -> Result<(), BackendError> {
        let resp = self.client.post(self.url("/admin/ensure-collections")).send().await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn get_by_file_hashes(&self, files: &HashMap<String, String>) -> Result<Vec<ChunkFile>, BackendError> {
        let resp = self
            .client
            .post(self.url("/chunk-files/by-file-hashes"))
            .json(&FileHashesQuery { files })
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn get_only_import_chunk_files(&self, files: &HashMap<String, String>) -> Result<Vec<ChunkFile>, BackendError> {
        let resp = self
            .client
            .post(self.url("/chunk-files/import-only"))
            .json(&FileHashesQuery { files })
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn keyword_search(
        &self,
        keyword: &str,
        kind: SearchKind,
        files: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<ScoredChunkFile>, BackendError> {
        let resp = self
            .client
            .post(self.url("/chunk-files/keyword-search"))
            .json(&KeywordSearchQuery {
                keyword,
                kind: search_kind_str(kind),
                files,
                limit,
            })
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn get_chunk_files_matching_exact(
        &self,
        search_key: &str,
        kind: SearchKind,
        file_path: &str,
        file_hash: &str,
    ) -> Result<Vec<ChunkFile>, BackendError> {
        let resp = self
            .client
            .post(self.url("/chunk-files/exact-match"))
            .json(&ExactMatchQuery {
                search_key,
                kind: search_kind_str(kind),
                file_path,
                file_hash,
            })
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn bulk_insert_chunk_files(&self, records: &[ChunkFile]) -> Result<(), BackendError> {
        let resp = self
            .client
            .post(self.url("/chunk-files/bulk-insert"))
            .json(records)
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn filtered_vector_hybrid_search(
        &self,
        chunk_hashes: &[String],
        query: &str,
        query_vector: Option<&[f32]>,
        limit: usize,
        alpha: f32,
    ) -> Result<Vec<ScoredChunk>, BackendError> {
        let resp = self
            .client
            .post(self.url("/chunks/hybrid-search"))
            .json(&HybridSearchQuery {
                chunk_hashes,
                query,
                query_vector,
                limit,
                alpha,
            })
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn get_by_chunk_hashes(&self, chunk_hashes: &[String], with_vector: bool) -> Result<Vec<Chunk>, BackendError> {
        let resp = self
            .client
            .post(self.url("/chunks/by-hashes"))
            .json(&ChunkHashesQuery {
                chunk_hashes,
                with_vector,
            })
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn bulk_insert_chunks(&self, chunks: &[Chunk]) -> Result<(), BackendError> {
        let resp = self
            .client
            .post(self.url("/chunks/bulk-insert"))
            .json(chunks)
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn update_timestamps(
        &self,
        chunk_hashes: &[String],
        updated_at: i64,
        created_at: Option<i64>,
    ) -> Result<(), BackendError> {
        let resp = self
            .client
            .patch(self.url("/chunks/timestamps"))
            .json(&UpdateTimestampsBody {
                chunk_hashes,
                updated_at,
                created_at,
            })
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn update_embedding(&self, chunk_hash: &str, embedding: &[f32]) -> Result<(), BackendError> {
        let resp = self
            .client
            .patch(self.url("/chunks/embedding"))
            .json(&UpdateEmbeddingBody { chunk_hash, embedding })
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn cleanup_old(&self, last_used_lt: i64, exclusion_chunk_hashes: &[String]) -> Result<usize, BackendError> {
        let resp = self
            .client
            .post(self.url("/chunks/cleanup"))
            .json(&CleanupQuery {
                last_used_lt,
                exclusion_chunk_hashes,
            })
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let parsed: CleanupResponse = resp.json().await?;
        Ok(parsed.deleted)
    }

    async fn cleanup_old_chunk_files(&self, last_used_lt: i64, exclusion_chunk_hashes: &[String]) -> Result<usize, BackendError> {
        let resp = self
            .client
            .post(self.url("/chunk-files/cleanup"))
            .json(&CleanupQuery {
                last_used_lt,
                exclusion_chunk_hashes,
            })
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let parsed: CleanupResponse = resp.json().await?;
        Ok(parsed.deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path() {
        let store = HttpStore::new("127.0.0.1", 6363, 5).unwrap();
        assert_eq!(store.url("/schema/version"), "http://127.0.0.1:6363/schema/version");
    }

    #[test]
    fn search_kind_maps_to_lowercase_tag() {
        assert_eq!(search_kind_str(SearchKind::Class), "class");
        assert_eq!(search_kind_str(SearchKind::Function), "function");
        assert_eq!(search_kind_str(SearchKind::File), "file");
    }
}
