//! Typed error taxonomy (spec §7). Kinds, not a single catch-all: callers that
//! need to branch on failure mode (retry vs. surface vs. ignore) can match on
//! these instead of string-sniffing an `anyhow::Error`.

use std::time::Duration;
use thiserror::Error;

/// Fatal at startup; surfaced to the caller verbatim.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path} is not valid JSON: {source}")]
    Invalid {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("required binary not found: {0}")]
    MissingBinary(String),
}

/// Vector-store or embedding/reranker backend unreachable or erroring.
/// Retried with backoff where the component allows it (§5, §7).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend unreachable after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// HTTP 429 from an embedding/reranker provider. Bubbled to the caller, not
/// retried beyond the embedding client's generic backoff (§7).
#[derive(Debug, Error)]
#[error("rate limited by {provider} ({model}); retry after {retry_after:?}")]
pub struct ThrottledError {
    pub provider: String,
    pub model: String,
    pub retry_after: Option<Duration>,
}

/// Caller supplied something structurally wrong (bad line range, missing
/// file). Never retried.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("invalid line range {start}-{end} for {path} ({len} lines)")]
    BadLineRange {
        path: String,
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("invalid focus chunk spec: {0}")]
    BadFocusSpec(String),
}

/// Per-file chunking failure. Counted and logged; never fails the sync cycle
/// (§4.2 failure semantics, §7).
#[derive(Debug, Error)]
#[error("failed to chunk {path}: {reason}")]
pub struct ChunkError {
    pub path: String,
    pub reason: String,
}

/// Cooperative cancellation observed at a suspension point (§4.4, §5).
#[derive(Debug, Error)]
#[error("operation cancelled")]
pub struct CancelledError;

/// Top-level error returned by the embedding client and retrieval pipeline;
/// carries enough information to render a user-facing message (§7).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Throttled(#[from] ThrottledError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Cancelled(#[from] CancelledError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
