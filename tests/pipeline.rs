//! End-to-end pipeline tests over a temporary directory, an in-memory
//! vector store, and a deterministic stub embedder. No network.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use archivist::config::{ChunkingConfig, EmbeddingConfig, IndexConfig};
use archivist::db;
use archivist::diff::IndexMode;
use archivist::embedding::Embedder;
use archivist::fusion::MergeStrategy;
use archivist::index::IndexPipeline;
use archivist::models::WebResult;
use archivist::query::QueryPipeline;
use archivist::vectorstore::MemoryStore;

const DIMS: usize = 16;

/// Deterministic embedder: character-bucket frequency vectors, normalized.
/// Similar texts land near each other; no model, no network.
struct StubEmbedder {
    calls: AtomicUsize,
    fail: bool,
}

impl StubEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for c in text.to_lowercase().chars().filter(|c| c.is_alphanumeric()) {
            v[(c as usize) % DIMS] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub-charfreq"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("stub embedder configured to fail");
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

struct TestEnv {
    _tmp: TempDir,
    docs: PathBuf,
    pool: sqlx::SqlitePool,
    store: Arc<MemoryStore>,
    embedder: Arc<StubEmbedder>,
}

impl TestEnv {
    fn pipeline(&self) -> IndexPipeline {
        IndexPipeline::new(
            self.embedder.clone(),
            self.store.clone(),
            self.pool.clone(),
            IndexConfig::default(),
            ChunkingConfig::default(),
            &EmbeddingConfig::default(),
        )
    }

    fn query_pipeline(&self) -> QueryPipeline {
        QueryPipeline::new(self.embedder.clone(), self.store.clone(), self.pool.clone())
    }
}

async fn setup(embedder: StubEmbedder) -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();

    let pool = db::connect(&tmp.path().join("data/app.sqlite"))
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();

    TestEnv {
        _tmp: tmp,
        docs,
        pool,
        store: Arc::new(MemoryStore::new()),
        embedder: Arc::new(embedder),
    }
}

fn write_corpus(docs: &PathBuf) {
    fs::write(docs.join("notes.txt"), "The aardvark rests at noon.").unwrap();
    fs::write(docs.join("guide.md"), "# Guide\n\nThe basilisk guards the gate.").unwrap();
    fs::write(docs.join("data.json"), r#"{"animal": "cassowary", "legs": 2}"#).unwrap();
    fs::write(docs.join("table.csv"), "name,kind\ndugong,mammal\n").unwrap();
}

#[tokio::test]
async fn full_index_then_incremental_is_a_noop() {
    let env = setup(StubEmbedder::new()).await;
    write_corpus(&env.docs);
    let pipeline = env.pipeline();

    let outcome = pipeline
        .run(&[env.docs.clone()], IndexMode::Full, true)
        .await
        .unwrap();

    assert!(outcome.scanned_paths().len() >= 4);
    assert_eq!(outcome.stats["discovered"], 4);
    assert_eq!(outcome.stats["changed"], 4);
    assert!(outcome.stats["upserted"] >= 1);
    assert!(outcome.errors.is_empty());

    let second = pipeline
        .run(&[env.docs.clone()], IndexMode::Incremental, false)
        .await
        .unwrap();

    assert_eq!(second.stats["changed"], 0);
    assert_eq!(second.stats["upserted"], 0);
    assert!(second.unchanged_paths().len() >= 4);
}

#[tokio::test]
async fn reindexing_unchanged_content_does_not_grow_the_store() {
    let env = setup(StubEmbedder::new()).await;
    write_corpus(&env.docs);
    let pipeline = env.pipeline();

    pipeline
        .run(&[env.docs.clone()], IndexMode::Full, true)
        .await
        .unwrap();
    let after_first = env.store.count();

    // Force a re-embed of identical content: identical ids, upsert in place.
    pipeline
        .run(&[env.docs.clone()], IndexMode::Full, true)
        .await
        .unwrap();

    assert_eq!(env.store.count(), after_first);
}

#[tokio::test]
async fn modified_file_is_the_only_change() {
    let env = setup(StubEmbedder::new()).await;
    write_corpus(&env.docs);
    let pipeline = env.pipeline();

    pipeline
        .run(&[env.docs.clone()], IndexMode::Full, true)
        .await
        .unwrap();

    fs::write(env.docs.join("notes.txt"), "The aardvark rests at midnight.").unwrap();

    let outcome = pipeline
        .run(&[env.docs.clone()], IndexMode::Incremental, false)
        .await
        .unwrap();

    assert_eq!(outcome.stats["changed"], 1);
    let changed = outcome.changed_paths();
    assert!(changed[0].ends_with("notes.txt"));
}

#[tokio::test]
async fn unparsable_file_is_soft_error_but_still_committed() {
    let env = setup(StubEmbedder::new()).await;
    fs::write(env.docs.join("empty.txt"), "").unwrap();
    fs::write(env.docs.join("good.md"), "The echidna naps.").unwrap();
    let pipeline = env.pipeline();

    let outcome = pipeline
        .run(&[env.docs.clone()], IndexMode::Incremental, false)
        .await
        .unwrap();

    assert_eq!(outcome.stats["changed"], 2);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].starts_with("parse-empty:"));
    assert!(outcome.errors[0].ends_with("empty.txt"));

    // Committed despite the parse failure: not retried until bytes change.
    let second = pipeline
        .run(&[env.docs.clone()], IndexMode::Incremental, false)
        .await
        .unwrap();
    assert_eq!(second.stats["changed"], 0);
}

#[tokio::test]
async fn embed_failure_aborts_without_committing() {
    let env = setup(StubEmbedder::failing()).await;
    write_corpus(&env.docs);
    let pipeline = env.pipeline();

    let err = pipeline
        .run(&[env.docs.clone()], IndexMode::Full, true)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("embed stage failed"));

    // Nothing reached the store or the fingerprint table.
    assert_eq!(env.store.count(), 0);
    let known = db::load_fingerprints(&env.pool).await.unwrap();
    assert!(known.is_empty());
}

#[tokio::test]
async fn no_roots_is_rejected_before_any_stage() {
    let env = setup(StubEmbedder::new()).await;
    let pipeline = env.pipeline();

    let err = pipeline.run(&[], IndexMode::Full, false).await.unwrap_err();
    assert!(err.to_string().contains("No index roots"));
    assert_eq!(env.embedder.call_count(), 0);
}

#[tokio::test]
async fn query_returns_hits_with_audit_trail() {
    let env = setup(StubEmbedder::new()).await;
    fs::write(env.docs.join("people.txt"), "Saket is a person.").unwrap();
    env.pipeline()
        .run(&[env.docs.clone()], IndexMode::Full, true)
        .await
        .unwrap();

    let hits = env
        .query_pipeline()
        .run("demo", "Who is Saket", 5, None)
        .await
        .unwrap();

    assert!(!hits.is_empty());
    let top = &hits[0];
    assert!(top.path.as_deref().unwrap().ends_with("people.txt"));
    assert_eq!(top.chunk_idx, Some(0));
    assert!(top.id.ends_with(":0"));

    let queries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queries")
        .fetch_one(&env.pool)
        .await
        .unwrap();
    assert_eq!(queries, 1);
    let hit_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM query_hits")
        .fetch_one(&env.pool)
        .await
        .unwrap();
    assert_eq!(hit_rows, hits.len() as i64);
}

#[tokio::test]
async fn blank_query_never_reaches_the_embedder() {
    let env = setup(StubEmbedder::new()).await;

    let hits = env
        .query_pipeline()
        .run("demo", "   ", 5, None)
        .await
        .unwrap();

    assert!(hits.is_empty());
    assert_eq!(env.embedder.call_count(), 0);
}

#[tokio::test]
async fn empty_filter_object_matches_everything() {
    let env = setup(StubEmbedder::new()).await;
    fs::write(env.docs.join("one.txt"), "The flamingo stands.").unwrap();
    env.pipeline()
        .run(&[env.docs.clone()], IndexMode::Full, true)
        .await
        .unwrap();

    let empty = serde_json::Map::new();
    let with_empty = env
        .query_pipeline()
        .run("demo", "flamingo", 5, Some(&empty))
        .await
        .unwrap();
    let without = env
        .query_pipeline()
        .run("demo", "flamingo", 5, None)
        .await
        .unwrap();

    assert_eq!(with_empty.len(), without.len());
    assert!(!with_empty.is_empty());
}

#[tokio::test]
async fn fused_results_blend_local_hits_and_web_results() {
    use archivist::fusion::{merge_results, normalize_local_hits, normalize_web_results};

    let env = setup(StubEmbedder::new()).await;
    fs::write(env.docs.join("notes.txt"), "Ferris the crab is the Rust mascot.").unwrap();
    env.pipeline()
        .run(&[env.docs.clone()], IndexMode::Full, true)
        .await
        .unwrap();

    let hits = env
        .query_pipeline()
        .run("demo", "Rust mascot", 5, None)
        .await
        .unwrap();

    let web = vec![
        WebResult {
            title: Some("Rust mascot".to_string()),
            url: Some("https://rustacean.net".to_string()),
            snippet: Some("Ferris is an unofficial mascot.".to_string()),
            published_date: None,
            engine: "serper".to_string(),
            text: None,
        },
        WebResult {
            title: Some("Duplicate".to_string()),
            url: Some("https://rustacean.net".to_string()),
            snippet: Some("Same link again.".to_string()),
            published_date: None,
            engine: "serper".to_string(),
            text: None,
        },
    ];

    let fused = merge_results(
        normalize_local_hits(&hits, "Rust mascot"),
        normalize_web_results(&web, "Rust mascot"),
        MergeStrategy::Balanced,
        10,
    );

    assert!(!fused.is_empty());
    assert!(fused.len() <= 10);
    // The duplicate URL collapsed to one web entry.
    let web_count = fused
        .iter()
        .filter(|r| r.url.as_deref() == Some("https://rustacean.net"))
        .count();
    assert_eq!(web_count, 1);
    // Scores are sorted descending and within bounds.
    for pair in fused.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for r in &fused {
        assert!((0.0..=1.0).contains(&r.score));
    }
}
