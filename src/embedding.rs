//! Embedding Client (C4, §4.4). Grounded on the teacher's batching instinct
//! in `vector_store.rs::refresh` (sequential per-batch embed step "since
//! model not Send") and on the pack's `cocode-retrieval::embeddings::queue`
//! for the batching/backoff shape (`DEFAULT_WORKERS`, `RetryConfig`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::errors::{BackendError, EngineError, ThrottledError};

/// Pluggable token counter so tests don't need a real tokenizer (§4.4
/// "a token counter that matches the embedding model").
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Cheap offline approximation: ~4 characters per token, matching the
/// teacher's `TokenEstimatorConfig` default.
pub struct CharsPerTokenCounter {
    pub chars_per_token: usize,
}

impl Default for CharsPerTokenCounter {
    fn default() -> Self {
        Self { chars_per_token: 4 }
    }
}

impl TokenCounter for CharsPerTokenCounter {
    fn count(&self, text: &str) -> usize {
        (text.len() / self.chars_per_token.max(1)).max(1)
    }
}

/// The embedding provider contract (§6 "POST /embedding"). Implemented over
/// HTTP in production; an in-memory fake backs tests.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, u64), BackendError>;
    fn dimensions(&self) -> usize;
}

pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    auth_token: String,
    dims: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(endpoint: impl Into<String>, auth_token: impl Into<String>, dims: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            auth_token: auth_token.into(),
            dims,
        }
    }
}

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    store_embeddings: bool,
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
    tokens_used: u64,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, u64), BackendError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.auth_token)
            .json(&EmbedRequest {
                texts,
                store_embeddings: false,
            })
            .send()
            .await?;

        if resp.status().as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(BackendError::Status {
                status: 429,
                body: format!("throttled, retry_after={retry_after:?}"),
            });
        }
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }
        let parsed: EmbedResponse = resp.json().await?;
        Ok((parsed.embeddings, parsed.tokens_used))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// A greedy batch packer: fills batches until the next text would exceed
/// `target_tokens_per_batch`; a single text longer than the budget forms its
/// own batch (§4.4 "Batching").
pub fn pack_batches(texts: &[String], counter: &dyn TokenCounter, target_tokens_per_batch: usize) -> Vec<Vec<usize>> {
    let mut batches: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_tokens = 0usize;

    for (idx, text) in texts.iter().enumerate() {
        let tokens = counter.count(text);
        if tokens > target_tokens_per_batch {
            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            batches.push(vec![idx]);
            tracing::warn!(idx, tokens, target_tokens_per_batch, "single text exceeds batch token budget");
            continue;
        }
        if current_tokens + tokens > target_tokens_per_batch && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current.push(idx);
        current_tokens += tokens;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    counter: Arc<dyn TokenCounter>,
    target_tokens_per_batch: usize,
    max_parallel_tasks: usize,
    backoff_start_ms: u64,
    max_backoff_ms: u64,
}

impl EmbeddingClient {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        counter: Arc<dyn TokenCounter>,
        target_tokens_per_batch: usize,
        max_parallel_tasks: usize,
        backoff_start_ms: u64,
        max_backoff_ms: u64,
    ) -> Self {
        Self {
            provider,
            counter,
            target_tokens_per_batch,
            max_parallel_tasks,
            backoff_start_ms,
            max_backoff_ms,
        }
    }

    /// `embed(texts) -> (vectors, tokens_used)` (§4.4 contract). Output has
    /// the same length and order as the input; bounded parallelism across
    /// batches, exponential backoff per batch on failure, cooperative
    /// cancellation at every suspension point.
    pub async fn embed(
        &self,
        texts: Vec<String>,
        cancel: CancellationToken,
    ) -> Result<(Vec<Vec<f32>>, u64), EngineError> {
        if texts.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let batches = pack_batches(&texts, self.counter.as_ref(), self.target_tokens_per_batch);
        let semaphore = Arc::new(Semaphore::new(self.max_parallel_tasks.max(1)));
        let total_tokens = Arc::new(AtomicU64::new(0));
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];

        let mut handles = Vec::new();
        for batch in batches {
            let sem = semaphore.clone();
            let provider = self.provider.clone();
            let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();
            let cancel = cancel.clone();
            let backoff_start = self.backoff_start_ms;
            let backoff_cap = self.max_backoff_ms;
            let total_tokens = total_tokens.clone();

            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore closed");
                let mut backoff = backoff_start;
                loop {
                    if cancel.is_cancelled() {
                        return Err(EngineError::Cancelled(crate::errors::CancelledError));
                    }
                    match provider.embed_batch(&batch_texts).await {
                        Ok((vectors, tokens)) => {
                            total_tokens.fetch_add(tokens, Ordering::Relaxed);
                            return Ok((batch, vectors));
                        }
                        Err(BackendError::Status { status: 429, .. }) => {
                            return Err(EngineError::Throttled(ThrottledError {
                                provider: "embedding".to_string(),
                                model: "unknown".to_string(),
                                retry_after: None,
                            }));
                        }
                        Err(_e) if backoff <= backoff_cap => {
                            tokio::select! {
                                _ = tokio::time::sleep(Duration::from_millis(backoff)) => {}
                                _ = cancel.cancelled() => {
                                    return Err(EngineError::Cancelled(crate::errors::CancelledError));
                                }
                            }
                            backoff = (backoff * 2).min(backoff_cap);
                        }
                        Err(e) => {
                            return Err(EngineError::Backend(e));
                        }
                    }
                }
            }));
        }

        for handle in handles {
            let (batch_indices, vectors) = handle
                .await
                .map_err(|e| EngineError::Backend(BackendError::Status {
                    status: 0,
                    body: e.to_string(),
                }))??;
            for (pos, idx) in batch_indices.into_iter().enumerate() {
                results[idx] = Some(vectors[pos].clone());
            }
        }

        let vectors: Vec<Vec<f32>> = results
            .into_iter()
            .map(|v| v.unwrap_or_default())
            .collect();
        Ok((vectors, total_tokens.load(Ordering::Relaxed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeProvider {
        dims: usize,
        fail_first_n: Mutex<usize>,
    }

    #[async_trait]
    impl EmbeddingProvider for FakeProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, u64), BackendError> {
            let mut remaining = self.fail_first_n.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BackendError::Status {
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok((
                texts.iter().map(|t| vec![t.len() as f32; self.dims]).collect(),
                texts.len() as u64,
            ))
        }

        fn dimensions(&self) -> usize {
            self.dims
        }
    }

    #[test]
    fn batch_packer_splits_on_token_budget() {
        let counter = CharsPerTokenCounter { chars_per_token: 1 };
        let texts = vec!["aaaaa".to_string(), "bbbbb".to_string(), "c".to_string()];
        let batches = pack_batches(&texts, &counter, 6);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], vec![0]);
        assert_eq!(batches[1], vec![1, 2]);
    }

    #[test]
    fn oversized_single_text_gets_its_own_batch() {
        let counter = CharsPerTokenCounter { chars_per_token: 1 };
        let texts = vec!["x".repeat(100)];
        let batches = pack_batches(&texts, &counter, 10);
        assert_eq!(batches, vec![vec![0]]);
    }

    #[tokio::test]
    async fn embed_preserves_order_and_length() {
        let provider = Arc::new(FakeProvider {
            dims: 4,
            fail_first_n: Mutex::new(0),
        });
        let client = EmbeddingClient::new(
            provider,
            Arc::new(CharsPerTokenCounter::default()),
            2048,
            4,
            10,
            100,
        );
        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let (vectors, tokens) = client.embed(texts.clone(), CancellationToken::new()).await.unwrap();
        assert_eq!(vectors.len(), texts.len());
        assert_eq!(tokens, 3);
        assert_eq!(vectors[0][0], 3.0);
        assert_eq!(vectors[2][0], 5.0);
    }

    #[tokio::test]
    async fn embed_retries_with_backoff_then_succeeds() {
        let provider = Arc::new(FakeProvider {
            dims: 2,
            fail_first_n: Mutex::new(2),
        });
        let client = EmbeddingClient::new(provider, Arc::new(CharsPerTokenCounter::default()), 2048, 1, 1, 10);
        let (vectors, _) = client
            .embed(vec!["hello".to_string()], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(vectors.len(), 1);
    }

    #[tokio::test]
    async fn embed_of_empty_input_is_empty() {
        let provider = Arc::new(FakeProvider {
            dims: 2,
            fail_first_n: Mutex::new(0),
        });
        let client = EmbeddingClient::new(provider, Arc::new(CharsPerTokenCounter::default()), 2048, 1, 10, 100);
        let (vectors, tokens) = client.embed(Vec::new(), CancellationToken::new()).await.unwrap();
        assert!(vectors.is_empty());
        assert_eq!(tokens, 0);
    }
}
