//! Single immutable configuration struct, built once at startup (§9 "Global
//! mutable configuration" design note) and passed by reference everywhere
//! else. Read from `./config.json` when present, falling back to defaults
//! silently — mirroring the teacher's `load_config`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_character_size() -> usize {
    4000
}
fn default_number_of_chunks() -> usize {
    200
}
fn default_embedding_model() -> String {
    "text-embedding-local".to_string()
}
fn default_token_limit() -> usize {
    2048
}
fn default_max_parallel_tasks() -> usize {
    8
}
fn default_max_backoff_ms() -> u64 {
    8_000
}
fn default_backoff_start_ms() -> u64 {
    200
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    6363
}
fn default_grpc_port() -> u16 {
    6364
}
fn default_startup_timeout_secs() -> u64 {
    30
}
fn default_client_timeout_secs() -> u64 {
    30
}
fn default_pre_filter_limit() -> usize {
    1000
}
fn default_cleanup_threshold_secs() -> u64 {
    180
}
fn default_alpha() -> f32 {
    0.7
}
fn default_max_file_bytes_index() -> u64 {
    1_000_000
}
fn default_max_file_bytes_search() -> u64 {
    200 * 1024
}

/// `CHUNKING.*` keys (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub character_size: usize,
    pub number_of_chunks: usize,
    /// Legacy span-coalescer's merge-below-this-size budget; the legacy path
    /// is a test oracle only (§9 Open Questions).
    pub coalesce: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            character_size: default_character_size(),
            number_of_chunks: default_number_of_chunks(),
            coalesce: 200,
        }
    }
}

/// `EMBEDDING.*` keys (§6, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub token_limit: usize,
    pub max_parallel_tasks: usize,
    pub max_backoff_ms: u64,
    pub backoff_start_ms: u64,
    pub endpoint: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            token_limit: default_token_limit(),
            max_parallel_tasks: default_max_parallel_tasks(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_start_ms: default_backoff_start_ms(),
            endpoint: None,
        }
    }
}

/// `WEAVIATE_*` keys (§6, §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub host: String,
    pub http_port: u16,
    pub grpc_port: u16,
    pub startup_timeout_secs: u64,
    pub client_timeout_secs: u64,
    /// Path to a backend binary to spawn if nothing is listening yet. When
    /// unset, the orchestrator only connects to an already-running backend.
    pub spawn_binary: Option<PathBuf>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            grpc_port: default_grpc_port(),
            startup_timeout_secs: default_startup_timeout_secs(),
            client_timeout_secs: default_client_timeout_secs(),
            spawn_binary: None,
        }
    }
}

/// `AUTOCOMPLETE_SEARCH.*` and retrieval-tuning keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub pre_filter_limit: usize,
    /// Hybrid mix: 0.0 pure BM25, 1.0 pure vector (§4.7).
    pub alpha: f32,
    pub max_chunks_to_return: usize,
    pub reranker_endpoint: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            pre_filter_limit: default_pre_filter_limit(),
            alpha: default_alpha(),
            max_chunks_to_return: 30,
            reranker_endpoint: None,
        }
    }
}

/// Cleanup threshold as a first-class config value, not a hardcoded literal
/// (§9 Open Questions resolution).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub last_used_threshold_secs: u64,
    pub batch_size: usize,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            last_used_threshold_secs: default_cleanup_threshold_secs(),
            batch_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub exclude_dir_names: Vec<String>,
    pub max_file_bytes_index: u64,
    pub max_file_bytes_search: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude_dir_names: vec![
                ".git".into(),
                "node_modules".into(),
                "dist".into(),
                "build".into(),
                "target".into(),
                "__pycache__".into(),
                "venv".into(),
                ".venv".into(),
                "coverage".into(),
                ".next".into(),
                ".nuxt".into(),
            ],
            max_file_bytes_index: default_max_file_bytes_index(),
            max_file_bytes_search: default_max_file_bytes_search(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub retrieval: RetrievalConfig,
    pub cleanup: CleanupConfig,
    pub scan: ScanConfig,
    pub number_of_workers: usize,
}

impl Config {
    /// Reads `<repo_root>/config.json`, falling back to `Config::default()`
    /// on any missing-file or parse error (mirrors the teacher's
    /// `load_config`'s `unwrap_or_else`).
    pub fn load(repo_root: &Path) -> Self {
        let path = repo_root.join("config.json");
        match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Config::default(),
        }
    }

    /// Strict variant used by callers that want config errors to be fatal
    /// (§7 "Configuration errors ... fatal at startup").
    pub fn load_strict(repo_root: &Path) -> Result<Self, crate::errors::ConfigError> {
        let path = repo_root.join("config.json");
        match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| {
                crate::errors::ConfigError::Invalid {
                    path: path.display().to_string(),
                    source,
                }
            }),
            Err(_) => Ok(Config::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.retrieval.alpha, 0.7);
        assert_eq!(cfg.cleanup.last_used_threshold_secs, 180);
        assert_eq!(cfg.cleanup.batch_size, 1000);
        assert_eq!(cfg.chunking.number_of_chunks, 200);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(dir.path());
        assert_eq!(cfg.embedding.max_parallel_tasks, 8);
    }

    #[test]
    fn invalid_config_file_is_fatal_in_strict_mode() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), b"{not json").unwrap();
        assert!(Config::load_strict(dir.path()).is_err());
    }
}
