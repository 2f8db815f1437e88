use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use cortexsift::config::Config;
use cortexsift::embedding::{CharsPerTokenCounter, EmbeddingClient, HttpEmbeddingProvider};
use cortexsift::retrieval::{FocusInput, RetrievalPipeline, RetrievalRequest};
use cortexsift::types::ChunkJson;
use cortexsift::scanner::{records_from_entries, scan_workspace};
use cortexsift::sync::DifferentialSynchronizer;

#[derive(Debug, Parser)]
#[command(name = "cortexsift")]
#[command(version)]
#[command(about = "Code-aware retrieval engine: language-aware chunking and hybrid search over a repository")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan a repo, chunk changed files, and sync embeddings into the store.
    Index {
        repo: PathBuf,
        /// Use an embedded SQLite store at this path instead of the HTTP backend.
        #[arg(long)]
        embedded_db: Option<PathBuf>,
    },
    /// Retrieve the most relevant chunks for a query.
    Query {
        repo: PathBuf,
        text: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        embedded_db: Option<PathBuf>,
    },
    /// Run one cleanup pass against the store.
    Cleanup {
        repo: PathBuf,
        #[arg(long)]
        embedded_db: Option<PathBuf>,
    },
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    bar.enable_steady_tick(std::time::Duration::from_millis(80));
    bar.set_message(message.to_string());
    bar
}

async fn build_embedding_client(config: &Config) -> EmbeddingClient {
    let endpoint = config
        .embedding
        .endpoint
        .clone()
        .unwrap_or_else(|| "http://127.0.0.1:8089/embedding".to_string());
    let provider = Arc::new(HttpEmbeddingProvider::new(endpoint, "", 768));
    EmbeddingClient::new(
        provider,
        Arc::new(CharsPerTokenCounter::default()),
        config.embedding.token_limit,
        config.embedding.max_parallel_tasks,
        config.embedding.backoff_start_ms,
        config.embedding.max_backoff_ms,
    )
}

async fn run_index(repo: PathBuf, embedded_db: Option<PathBuf>) -> Result<()> {
    let config = Config::load(&repo);
    let scan_spinner = spinner("scanning repository...");
    let entries = scan_workspace(&repo, &config.scan, config.scan.max_file_bytes_index)?;
    let records = records_from_entries(&repo, &entries);
    let repo_state: HashMap<String, String> = records
        .iter()
        .map(|r| (r.file_path.clone(), r.file_hash.clone()))
        .collect();
    scan_spinner.finish_with_message(format!("scanned {} files", repo_state.len()));

    let db_path = embedded_db.unwrap_or_else(|| repo.join(".cortexsift").join("store.sqlite"));
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let initialized = cortexsift::init::initialize(&config.vector_store, Some(db_path)).await?;

    let embedding_client = Arc::new(build_embedding_client(&config).await);
    let synchronizer = DifferentialSynchronizer::new(
        repo.clone(),
        initialized.store.clone(),
        embedding_client,
        config.chunking.clone(),
    );

    let sync_spinner = spinner("chunking and embedding...");
    let chunks = synchronizer.sync(&repo_state).await.context("sync failed")?;
    sync_spinner.finish_with_message(format!("indexed {} chunks", chunks.len()));
    Ok(())
}

async fn run_query(repo: PathBuf, text: String, limit: usize, embedded_db: Option<PathBuf>) -> Result<()> {
    let config = Config::load(&repo);
    let db_path = embedded_db.unwrap_or_else(|| repo.join(".cortexsift").join("store.sqlite"));
    let initialized = cortexsift::init::initialize(&config.vector_store, Some(db_path)).await?;

    let entries = scan_workspace(&repo, &config.scan, config.scan.max_file_bytes_index)?;
    let records = records_from_entries(&repo, &entries);
    let candidate_files: HashMap<String, String> = records
        .into_iter()
        .map(|r| (r.file_path, r.file_hash))
        .collect();

    let pipeline = RetrievalPipeline::new(&repo, initialized.store.as_ref(), None);
    let request = RetrievalRequest {
        query: text,
        query_vector: None,
        focus: FocusInput::default(),
        max_chunks_to_return: limit,
        alpha: config.retrieval.alpha,
    };
    let response = pipeline.retrieve(request, &candidate_files).await?;

    let hits: Vec<ChunkJson> = response.chunks.iter().map(ChunkJson::from).collect();
    println!("{}", serde_json::to_string_pretty(&hits)?);
    Ok(())
}

async fn run_cleanup(repo: PathBuf, embedded_db: Option<PathBuf>) -> Result<()> {
    let config = Config::load(&repo);
    let db_path = embedded_db.unwrap_or_else(|| repo.join(".cortexsift").join("store.sqlite"));
    let initialized = cortexsift::init::initialize(&config.vector_store, Some(db_path)).await?;
    let manager = cortexsift::cleanup::CleanupManager::new(initialized.store.clone(), config.cleanup.clone());
    manager.run_once(&[]).await;
    eprintln!("cleanup pass complete");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        match cli.cmd {
            Command::Index { repo, embedded_db } => run_index(repo, embedded_db).await,
            Command::Query { repo, text, limit, embedded_db } => run_query(repo, text, limit, embedded_db).await,
            Command::Cleanup { repo, embedded_db } => run_cleanup(repo, embedded_db).await,
        }
    })
}
