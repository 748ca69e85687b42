//! # archivist CLI (`arx`)
//!
//! The `arx` binary is the operational surface over the archivist library:
//! database initialization, indexing runs, local semantic search, web
//! search, and unified search.
//!
//! ## Usage
//!
//! ```bash
//! arx --config ./config/archivist.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `arx init` | Create the SQLite database and run schema migrations |
//! | `arx index [ROOTS...]` | Run the indexing pipeline over the given roots |
//! | `arx search "<query>"` | Semantic search over the local index |
//! | `arx web "<query>"` | Web search with engine fallback |
//! | `arx unified "<query>"` | Local + web search fused into one ranking |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! arx init
//!
//! # Incremental index over the configured roots
//! arx index
//!
//! # Full rebuild of one directory
//! arx index ~/Documents/notes --full
//!
//! # Search locally
//! arx search "quarterly revenue summary" --top-k 5
//!
//! # Unified search preferring local results
//! arx unified "rust async cancellation" --strategy local_first
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use uuid::Uuid;

use archivist::config::load_config;
use archivist::db;
use archivist::diff::IndexMode;
use archivist::embedding::create_embedder;
use archivist::fusion::MergeStrategy;
use archivist::index::IndexPipeline;
use archivist::query::QueryPipeline;
use archivist::unified::{run_unified, UnifiedSearchRequest};
use archivist::vectorstore::ChromaStore;
use archivist::websearch::WebSearchClient;

/// archivist, a local-first document indexing and unified search service.
#[derive(Parser)]
#[command(
    name = "arx",
    about = "archivist: index local documents and search them alongside the web",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Missing file falls back to
    /// defaults.
    #[arg(long, global = true, default_value = "./config/archivist.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Idempotent.
    Init,

    /// Run the indexing pipeline.
    ///
    /// Discovers files under the given roots (or the configured roots when
    /// none are passed), detects changes against the committed fingerprint
    /// table, then chunks, embeds, and upserts the changed files.
    Index {
        /// Root directories or files to index.
        roots: Vec<PathBuf>,

        /// Full rebuild: treat every discovered file as changed.
        #[arg(long)]
        full: bool,

        /// Re-embed everything regardless of mode and fingerprints.
        #[arg(long)]
        force: bool,

        /// Override the configured embedding model for this run.
        #[arg(long)]
        model: Option<String>,
    },

    /// Semantic search over the local index.
    Search {
        /// The search query string.
        query: String,

        /// User id recorded in the audit log.
        #[arg(long, default_value = "anonymous")]
        user: String,

        /// Number of results to return.
        #[arg(long, default_value_t = 10)]
        top_k: usize,

        /// Exact-match metadata filter as a JSON object,
        /// e.g. '{"ext": ".md"}'.
        #[arg(long)]
        filter: Option<String>,

        /// Override the configured embedding model.
        #[arg(long)]
        model: Option<String>,
    },

    /// Web search with engine fallback.
    Web {
        /// The search query string.
        query: String,

        /// Ordered engine list, e.g. "exa|serper". Defaults to config.
        #[arg(long)]
        engine: Option<String>,

        /// Number of results per engine.
        #[arg(long)]
        top_n: Option<usize>,

        /// Ask the engine for full page text where supported.
        #[arg(long)]
        text: bool,

        /// User id recorded in the audit log.
        #[arg(long, default_value = "anonymous")]
        user: String,
    },

    /// Unified search: local + web, fused into one ranking.
    Unified {
        /// The search query string.
        query: String,

        /// User id recorded in the audit log.
        #[arg(long, default_value = "anonymous")]
        user: String,

        /// Merge strategy: balanced, local_first, web_first, or interleaved.
        #[arg(long, default_value = "balanced")]
        strategy: String,

        /// Number of local hits to retrieve before fusion.
        #[arg(long, default_value_t = 10)]
        top_k: usize,

        /// Ordered engine list. Defaults to config.
        #[arg(long)]
        engine: Option<String>,

        /// Number of web results to request.
        #[arg(long)]
        web_top_n: Option<usize>,

        /// Skip the web side entirely.
        #[arg(long)]
        no_web: bool,

        /// Maximum fused results.
        #[arg(long, default_value_t = 10)]
        max_results: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let pool = db::connect(&config.db.path).await?;
    db::run_migrations(&pool).await?;

    match cli.command {
        Commands::Init => {
            println!("initialized {}", config.db.path.display());
        }

        Commands::Index {
            roots,
            full,
            force,
            model,
        } => {
            let mode = if full {
                IndexMode::Full
            } else {
                IndexMode::Incremental
            };

            let embedder = Arc::from(create_embedder(&config.embedding, model.as_deref())?);
            let store = Arc::new(ChromaStore::connect(&config.vector_store).await?);
            let pipeline = IndexPipeline::new(
                embedder,
                store,
                pool.clone(),
                config.index.clone(),
                config.chunking.clone(),
                &config.embedding,
            );

            let run_id = Uuid::new_v4().to_string();
            let started = std::time::Instant::now();
            let outcome = pipeline.run(&roots, mode, force).await?;
            let latency_ms = started.elapsed().as_millis() as i64;

            let status = if outcome.errors.is_empty() {
                "ok"
            } else {
                "warning"
            };
            db::try_record_event(
                &pool,
                "system",
                "index",
                &json!({
                    "run_id": run_id,
                    "roots": roots,
                    "mode": mode.as_str(),
                    "force_reembed": force,
                    "model": model,
                }),
                &json!({
                    "stats": &outcome.stats,
                    "changed": outcome.changed_paths().len(),
                }),
                status,
                latency_ms,
                Some(mode.as_str()),
            )
            .await;

            println!("index {}", mode.as_str());
            for (key, value) in &outcome.stats {
                println!("  {}: {}", key, value);
            }
            println!("  unchanged: {}", outcome.unchanged_paths().len());
            for error in &outcome.errors {
                println!("  error: {}", error);
            }
            println!("{}", status);
        }

        Commands::Search {
            query,
            user,
            top_k,
            filter,
            model,
        } => {
            let filters = match filter {
                Some(raw) => Some(serde_json::from_str::<
                    serde_json::Map<String, serde_json::Value>,
                >(&raw)?),
                None => None,
            };

            let embedder = Arc::from(create_embedder(&config.embedding, model.as_deref())?);
            let store = Arc::new(ChromaStore::connect(&config.vector_store).await?);
            let pipeline = QueryPipeline::new(embedder, store, pool.clone());

            let hits = pipeline.run(&user, &query, top_k, filters.as_ref()).await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                let path = hit.path.as_deref().unwrap_or("<unknown>");
                let chunk = hit.chunk_idx.unwrap_or(0);
                println!("{}. [{:.4}] {}#{}", i + 1, hit.score, path, chunk);
                let snippet: String = hit.text.chars().take(200).collect();
                println!("   {}", snippet.replace('\n', " "));
            }
        }

        Commands::Web {
            query,
            engine,
            top_n,
            text,
            user,
        } => {
            let client = WebSearchClient::new(&config.web_search)?;
            let engines = engine.unwrap_or_else(|| config.web_search.engines.clone());
            let top_n = top_n.unwrap_or(config.web_search.top_n);

            let started = std::time::Instant::now();
            let outcome = client.search(&engines, &query, top_n, text).await?;
            let latency_ms = started.elapsed().as_millis() as i64;

            let event_id = db::try_record_event(
                &pool,
                &user,
                "web_search",
                &json!({"query": query, "engines": engines, "top_n": top_n}),
                &json!({
                    "engine_used": &outcome.engine_used,
                    "results": outcome.results.len(),
                    "attempts": &outcome.attempts,
                }),
                "ok",
                latency_ms,
                if outcome.attempts.is_empty() {
                    None
                } else {
                    Some("fallback")
                },
            )
            .await;
            if let Some(event_id) = event_id {
                db::try_record_web_results(&pool, event_id, &outcome.results).await;
            }

            println!("web search via {}", outcome.engine_used);
            for attempt in &outcome.attempts {
                println!("  failed {}: {}", attempt.engine, attempt.error);
            }
            for (i, r) in outcome.results.iter().enumerate() {
                println!(
                    "{}. {} ({})",
                    i + 1,
                    r.title.as_deref().unwrap_or("<untitled>"),
                    r.url.as_deref().unwrap_or("")
                );
            }
        }

        Commands::Unified {
            query,
            user,
            strategy,
            top_k,
            engine,
            web_top_n,
            no_web,
            max_results,
        } => {
            let strategy: MergeStrategy = strategy.parse()?;
            let engines = engine.unwrap_or_else(|| config.web_search.engines.clone());
            let web_top_n = web_top_n.unwrap_or(config.web_search.top_n);

            let embedder = Arc::from(create_embedder(&config.embedding, None)?);
            let store = Arc::new(ChromaStore::connect(&config.vector_store).await?);
            let query_pipeline = QueryPipeline::new(embedder, store, pool.clone());
            let web_client = WebSearchClient::new(&config.web_search)?;

            let results = run_unified(
                &query_pipeline,
                &web_client,
                &pool,
                UnifiedSearchRequest {
                    user_id: &user,
                    query: &query,
                    top_k,
                    filters: None,
                    strategy,
                    web_engines: &engines,
                    web_top_n,
                    include_web: !no_web,
                    max_results,
                },
            )
            .await?;

            if results.is_empty() {
                println!("No results.");
            }
            for (i, r) in results.iter().enumerate() {
                println!("{}. [{}] ({:.2}) {}", i + 1, r.source, r.score, r.title);
                if let Some(url) = &r.url {
                    println!("   {}", url);
                }
                let snippet: String = r.content.chars().take(200).collect();
                println!("   {}", snippet.replace('\n', " "));
            }
        }
    }

    pool.close().await;
    Ok(())
}
