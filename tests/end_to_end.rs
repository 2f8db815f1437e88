//! End-to-end scenarios from the literal I/O examples: new file, edit,
//! focus chunk, import augmentation, cleanup exclusion, and reranker
//! fallback. Each wires the real `DifferentialSynchronizer` and
//! `RetrievalPipeline` against an in-memory `SqliteStore`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use cortexsift::config::ChunkingConfig;
use cortexsift::embedding::{CharsPerTokenCounter, EmbeddingClient, EmbeddingProvider};
use cortexsift::errors::BackendError;
use cortexsift::retrieval::{FocusChunkSpec, FocusInput, Reranker, RetrievalPipeline, RetrievalRequest};
use cortexsift::store::sqlite::SqliteStore;
use cortexsift::store::VectorStore;
use cortexsift::sync::DifferentialSynchronizer;

struct StubEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for StubEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, u64), BackendError> {
        Ok((texts.iter().map(|_| vec![1.0, 0.0]).collect(), texts.len() as u64))
    }
    fn dimensions(&self) -> usize {
        2
    }
}

fn make_synchronizer(repo_root: &std::path::Path, store: Arc<dyn VectorStore>) -> DifferentialSynchronizer {
    let embedding = Arc::new(EmbeddingClient::new(
        Arc::new(StubEmbeddingProvider),
        Arc::new(CharsPerTokenCounter::default()),
        2048,
        4,
        10,
        100,
    ));
    DifferentialSynchronizer::new(repo_root.to_path_buf(), store, embedding, ChunkingConfig::default())
}

#[tokio::test]
async fn scenario_1_new_python_file_small() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.py"), "def f():\n    return 1\n").unwrap();

    let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let sync = make_synchronizer(dir.path(), store.clone());

    let mut files = HashMap::new();
    files.insert("a.py".to_string(), "H".to_string());
    let chunks = sync.sync(&files).await.unwrap();

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].embedding.is_some());

    let mut file_map = HashMap::new();
    file_map.insert("a.py".to_string(), "H".to_string());
    let chunk_files = store.get_by_file_hashes(&file_map).await.unwrap();
    assert_eq!(chunk_files.len(), 1);
    assert_eq!(chunk_files[0].start_line, 1);
    assert_eq!(chunk_files[0].end_line, 2);

    let pipeline = RetrievalPipeline::new(dir.path(), store.as_ref(), None);
    let request = RetrievalRequest {
        query: "returns one".to_string(),
        query_vector: None,
        focus: FocusInput::default(),
        max_chunks_to_return: 10,
        alpha: 0.7,
    };
    let response = pipeline.retrieve(request, &file_map).await.unwrap();
    assert_eq!(response.chunks[0].chunk_file.file_path, "a.py");
}

#[tokio::test]
async fn scenario_2_file_edit_changes_hash() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.py"), "def f():\n    return 1\n").unwrap();

    let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let sync = make_synchronizer(dir.path(), store.clone());

    let mut files_v1 = HashMap::new();
    files_v1.insert("a.py".to_string(), "H1".to_string());
    sync.sync(&files_v1).await.unwrap();

    std::fs::write(dir.path().join("a.py"), "def f():\n    return 2\n").unwrap();
    let mut files_v2 = HashMap::new();
    files_v2.insert("a.py".to_string(), "H2".to_string());
    let chunks_v2 = sync.sync(&files_v2).await.unwrap();

    assert_eq!(chunks_v2.len(), 1);
    let chunk_files = store.get_by_file_hashes(&files_v2).await.unwrap();
    assert_eq!(chunk_files.len(), 1);
    assert_eq!(chunk_files[0].file_hash, "H2");
}

#[tokio::test]
async fn scenario_3_focus_chunk_is_synthesized_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let lines: String = (1..=10).map(|i| format!("a-line-{i}\n")).collect();
    std::fs::write(dir.path().join("a.py"), &lines).unwrap();
    std::fs::write(dir.path().join("b.py"), &lines).unwrap();

    let store = SqliteStore::open_in_memory().unwrap();
    let pipeline = RetrievalPipeline::new(dir.path(), &store, None);

    let request = RetrievalRequest {
        query: "x".to_string(),
        query_vector: None,
        focus: FocusInput {
            chunks: vec![FocusChunkSpec {
                file_path: "a.py".to_string(),
                start_line: 3,
                end_line: 7,
            }],
            ..Default::default()
        },
        max_chunks_to_return: 10,
        alpha: 0.7,
    };
    let response = pipeline.retrieve(request, &HashMap::new()).await.unwrap();

    let focus = &response.chunks[0];
    assert_eq!(focus.chunk_file.file_path, "a.py");
    assert_eq!(focus.chunk_file.start_line, 3);
    assert_eq!(focus.chunk_file.end_line, 7);
    let expected: String = (3..=7).map(|i| format!("a-line-{i}")).collect::<Vec<_>>().join("\n");
    assert_eq!(focus.chunk.text, expected);
}

#[tokio::test]
async fn scenario_4_import_chunk_is_augmented_alongside_function_hit() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open_in_memory().unwrap());

    let mut files = HashMap::new();
    files.insert("c.py".to_string(), "H".to_string());

    store
        .bulk_insert_chunk_files(&[
            cortexsift::types::ChunkFile {
                file_path: "c.py".to_string(),
                file_hash: "H".to_string(),
                start_line: 1,
                end_line: 3,
                total_chunks: 2,
                chunk_hash: "imports".to_string(),
                classes: vec![],
                functions: vec![],
                entities: String::new(),
                searchable_file_path: "c.py".to_string(),
                searchable_file_name: "c.py".to_string(),
                meta_info: cortexsift::types::ChunkMetaInfo {
                    import_only_chunk: true,
                    ..Default::default()
                },
            },
            cortexsift::types::ChunkFile {
                file_path: "c.py".to_string(),
                file_hash: "H".to_string(),
                start_line: 5,
                end_line: 20,
                total_chunks: 2,
                chunk_hash: "func".to_string(),
                classes: vec![],
                functions: vec!["do_thing".to_string()],
                entities: "do_thing".to_string(),
                searchable_file_path: "c.py".to_string(),
                searchable_file_name: "c.py".to_string(),
                meta_info: Default::default(),
            },
        ])
        .await
        .unwrap();
    store
        .bulk_insert_chunks(&[
            cortexsift::types::Chunk {
                chunk_hash: "imports".to_string(),
                text: "import os".to_string(),
                embedding: None,
                created_at: 0,
                last_used: 0,
            },
            cortexsift::types::Chunk {
                chunk_hash: "func".to_string(),
                text: "def do_thing(): pass".to_string(),
                embedding: None,
                created_at: 0,
                last_used: 0,
            },
        ])
        .await
        .unwrap();

    let pipeline = RetrievalPipeline::new(dir.path(), store.as_ref(), None);
    let request = RetrievalRequest {
        query: "do_thing".to_string(),
        query_vector: None,
        focus: FocusInput::default(),
        max_chunks_to_return: 10,
        alpha: 0.7,
    };
    let response = pipeline.retrieve(request, &files).await.unwrap();

    let paths: Vec<&str> = response.chunks.iter().map(|c| c.chunk_file.file_path.as_str()).collect();
    assert!(paths.iter().all(|p| *p == "c.py"));
    assert_eq!(response.chunks.len(), 2);
    assert!(response.chunks[0].chunk_file.start_line < response.chunks[1].chunk_file.start_line);
}

#[tokio::test]
async fn scenario_5_cleanup_preserves_excluded_chunk() {
    let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
        .bulk_insert_chunks(&[
            cortexsift::types::Chunk {
                chunk_hash: "a".to_string(),
                text: "x".to_string(),
                embedding: None,
                created_at: 0,
                last_used: 0,
            },
            cortexsift::types::Chunk {
                chunk_hash: "b".to_string(),
                text: "y".to_string(),
                embedding: None,
                created_at: 0,
                last_used: 0,
            },
        ])
        .await
        .unwrap();

    let manager = cortexsift::cleanup::CleanupManager::new(
        store.clone(),
        cortexsift::config::CleanupConfig {
            last_used_threshold_secs: 0,
            batch_size: 1000,
        },
    );
    manager.run_once(&["a".to_string()]).await;

    let remaining = store.get_by_chunk_hashes(&["a".to_string(), "b".to_string()], false).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].chunk_hash, "a");
}

struct FailingReranker;

#[async_trait]
impl Reranker for FailingReranker {
    async fn rerank(&self, _query: &str, _candidates: &[String]) -> Result<(Vec<usize>, String), BackendError> {
        Err(BackendError::Status {
            status: 500,
            body: "reranker down".to_string(),
        })
    }
}

#[tokio::test]
async fn scenario_6_reranker_failure_falls_back_to_stable_order() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
        .bulk_insert_chunk_files(&[
            cortexsift::types::ChunkFile {
                file_path: "a.py".to_string(),
                file_hash: "H".to_string(),
                start_line: 1,
                end_line: 2,
                total_chunks: 1,
                chunk_hash: "c1".to_string(),
                classes: vec![],
                functions: vec![],
                entities: String::new(),
                searchable_file_path: "a.py".to_string(),
                searchable_file_name: "a.py".to_string(),
                meta_info: Default::default(),
            },
        ])
        .await
        .unwrap();
    store
        .bulk_insert_chunks(&[cortexsift::types::Chunk {
            chunk_hash: "c1".to_string(),
            text: "hello".to_string(),
            embedding: None,
            created_at: 0,
            last_used: 0,
        }])
        .await
        .unwrap();

    let reranker = FailingReranker;
    let pipeline = RetrievalPipeline::new(dir.path(), store.as_ref(), Some(&reranker));
    let mut files = HashMap::new();
    files.insert("a.py".to_string(), "H".to_string());

    let request = RetrievalRequest {
        query: "hello".to_string(),
        query_vector: None,
        focus: FocusInput::default(),
        max_chunks_to_return: 10,
        alpha: 0.7,
    };
    let response = pipeline.retrieve(request, &files).await.unwrap();
    assert_eq!(response.chunks.len(), 1);
    assert_eq!(response.chunks[0].chunk_file.file_path, "a.py");
}
