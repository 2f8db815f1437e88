//! Initialization Orchestrator (C10, §4.10): detect-or-spawn the vector
//! store backend, poll until ready, reconcile schema version, and hand out a
//! client. Grounded on the teacher's process-spawning shape in
//! `workspace.rs` (status polling loop, timeout handling) adapted to a
//! single explicit spawn strategy rather than the original's
//! per-OS branch (§9 Open Questions: "one explicit strategy, documented,
//! rather than three untested branches").

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};

use crate::config::VectorStoreConfig;
use crate::errors::{ConfigError, EngineError};
use crate::store::http::HttpStore;
use crate::store::sqlite::ensure_schema_current;
use crate::store::{VectorStore, SCHEMA_VERSION};

/// Holds the spawned child (if any) so it is killed when the orchestrator is
/// dropped, and the connected client.
pub struct InitializedStore {
    pub store: Arc<dyn VectorStore>,
    _child: Option<Child>,
}

/// Polls `GET {host}:{http_port}/v1/.well-known/ready` until it returns 2xx
/// or `timeout` elapses (§4.10 "Wait for readiness").
async fn wait_ready(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<(), EngineError> {
    let deadline = Instant::now() + timeout;
    let mut backoff = Duration::from_millis(100);
    loop {
        if let Ok(resp) = client.get(url).send().await {
            if resp.status().is_success() {
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            return Err(EngineError::Config(ConfigError::MissingBinary(format!(
                "vector store did not become ready at {url} within {timeout:?}"
            ))));
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(Duration::from_secs(2));
    }
}

async fn already_listening(client: &reqwest::Client, ready_url: &str) -> bool {
    client.get(ready_url).send().await.is_ok()
}

/// §4.10 startup: always `Command::new` a configured binary path if nothing
/// is already listening; never auto-detect the OS, never auto-download.
/// This is the Open Question's resolution — an explicit, testable strategy
/// over platform-branched spawning.
async fn spawn_if_needed(config: &VectorStoreConfig, ready_url: &str) -> Result<Option<Child>, EngineError> {
    let client = reqwest::Client::new();
    if already_listening(&client, ready_url).await {
        tracing::info!(ready_url, "vector store backend already running, skipping spawn");
        return Ok(None);
    }

    let binary = match &config.spawn_binary {
        Some(path) => path.clone(),
        None => {
            return Err(EngineError::Config(ConfigError::MissingBinary(
                "no backend listening and no spawn_binary configured".to_string(),
            )));
        }
    };
    if !binary.exists() {
        return Err(EngineError::Config(ConfigError::MissingBinary(binary.display().to_string())));
    }

    let child = Command::new(&binary)
        .arg("--http-port")
        .arg(config.http_port.to_string())
        .arg("--grpc-port")
        .arg(config.grpc_port.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(EngineError::Io)?;
    Ok(Some(child))
}

/// Runs the full startup sequence and hands back a ready, schema-current
/// store. `embedded` bypasses process spawning entirely and opens a local
/// SQLite file instead — this is the path tests and `--embedded` CLI runs
/// take; the spawned-process path is for the production HTTP backend.
pub async fn initialize(config: &VectorStoreConfig, embedded_path: Option<PathBuf>) -> Result<InitializedStore, EngineError> {
    if let Some(path) = embedded_path {
        let store = crate::store::sqlite::SqliteStore::open_file(&path).map_err(EngineError::Backend)?;
        ensure_schema_current(&store).await.map_err(EngineError::Backend)?;
        return Ok(InitializedStore {
            store: Arc::new(store),
            _child: None,
        });
    }

    let ready_url = format!("http://{}:{}/v1/.well-known/ready", config.host, config.http_port);
    let child = spawn_if_needed(config, &ready_url).await?;
    let client = reqwest::Client::new();
    wait_ready(&client, &ready_url, Duration::from_secs(config.startup_timeout_secs)).await?;

    let store = HttpStore::new(&config.host, config.http_port, config.client_timeout_secs).map_err(EngineError::Backend)?;
    reconcile_schema(&store).await?;

    Ok(InitializedStore {
        store: Arc::new(store),
        _child: child,
    })
}

/// §4.10 "Schema reconciliation": wipe and recreate on version mismatch or
/// absence, otherwise leave existing collections alone and stamp the
/// current version.
async fn reconcile_schema(store: &dyn VectorStore) -> Result<(), EngineError> {
    match store.schema_version().await.map_err(EngineError::Backend)? {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        _ => {
            store.wipe_all().await.map_err(EngineError::Backend)?;
            store.ensure_collections().await.map_err(EngineError::Backend)?;
            store.set_schema_version(SCHEMA_VERSION).await.map_err(EngineError::Backend)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedded_path_skips_process_spawn_entirely() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("store.sqlite");
        let config = VectorStoreConfig::default();
        let initialized = initialize(&config, Some(db_path)).await.unwrap();
        assert_eq!(initialized.store.schema_version().await.unwrap(), Some(SCHEMA_VERSION));
    }

    #[tokio::test]
    async fn missing_spawn_binary_is_a_config_error() {
        let config = VectorStoreConfig {
            host: "127.0.0.1".to_string(),
            http_port: 6399,
            grpc_port: 6400,
            startup_timeout_secs: 1,
            client_timeout_secs: 1,
            spawn_binary: None,
        };
        let result = initialize(&config, None).await;
        assert!(result.is_err());
    }
}
