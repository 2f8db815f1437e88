//! Cleanup Manager (C8, §4.8): retention policy enforcement. Runs as a
//! background task; every failure is swallowed so cleanup can never fail a
//! live query. Grounded on `examples/original_source/Chunking/chunkers/
//! vector_store/cleanup.py` (`ChunkVectorStoreCleaneupManager`, 3-minute
//! threshold, bare `except: pass`) and the teacher's background-task
//! pattern in `vector_store.rs`.

use std::sync::Arc;
use std::time::Duration;

use crate::config::CleanupConfig;
use crate::store::VectorStore;

pub struct CleanupManager {
    store: Arc<dyn VectorStore>,
    config: CleanupConfig,
}

impl CleanupManager {
    pub fn new(store: Arc<dyn VectorStore>, config: CleanupConfig) -> Self {
        Self { store, config }
    }

    /// One cleanup pass: delete chunks (then chunk-files) older than the
    /// threshold, excluding anything in `exclusion_chunk_hashes` (hashes
    /// currently visible to a live query). Iterates in
    /// `config.batch_size`-sized deletes via the store until nothing more is
    /// eligible (§4.8's "iteratively fetch ... delete ... repeat until
    /// empty" is the store's own responsibility per-call; this just loops
    /// the store call until it reports zero deleted).
    pub async fn run_once(&self, exclusion_chunk_hashes: &[String]) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let last_used_lt = now - self.config.last_used_threshold_secs as i64;

        loop {
            let deleted = match self.store.cleanup_old(last_used_lt, exclusion_chunk_hashes).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(error = %e, "cleanup_old failed, swallowing per §4.8");
                    break;
                }
            };
            if deleted == 0 {
                break;
            }
        }

        loop {
            let deleted = match self
                .store
                .cleanup_old_chunk_files(last_used_lt, exclusion_chunk_hashes)
                .await
            {
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(error = %e, "cleanup_old_chunk_files failed, swallowing per §4.8");
                    break;
                }
            };
            if deleted == 0 {
                break;
            }
        }
    }

    /// Spawns a background task that runs `run_once` on an interval, never
    /// propagating failures to the caller (§4.8 "Runs as a background task").
    pub fn spawn_periodic(
        self: Arc<Self>,
        interval: Duration,
        exclusion_chunk_hashes: impl Fn() -> Vec<String> + Send + Sync + 'static,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let exclusions = exclusion_chunk_hashes();
                self.run_once(&exclusions).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteStore;
    use crate::types::Chunk;

    #[tokio::test]
    async fn run_once_deletes_stale_chunks_but_not_excluded() {
        let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .bulk_insert_chunks(&[
                Chunk { chunk_hash: "stale".into(), text: "x".into(), embedding: None, created_at: 0, last_used: 0 },
                Chunk { chunk_hash: "kept".into(), text: "y".into(), embedding: None, created_at: 0, last_used: 0 },
            ])
            .await
            .unwrap();

        let manager = CleanupManager::new(store.clone(), CleanupConfig {
            last_used_threshold_secs: 0,
            batch_size: 1000,
        });
        manager.run_once(&["kept".to_string()]).await;

        let remaining = store.get_by_chunk_hashes(&["stale".to_string(), "kept".to_string()], false).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].chunk_hash, "kept");
    }

    #[tokio::test]
    async fn run_once_on_empty_store_does_not_panic() {
        let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let manager = CleanupManager::new(store, CleanupConfig::default());
        manager.run_once(&[]).await;
    }
}
