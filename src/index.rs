//! The indexing pipeline.
//!
//! One run is a strictly linear sequence of six stages over a single
//! [`IndexRun`] state record: discover → diff → parse+chunk → embed →
//! upsert → commit. Each stage writes only its own fields of the run
//! state and its own stats key.
//!
//! Per-file read and parse failures are soft: they land in the run's
//! error list and the run continues. Embedding-provider and vector-store
//! failures abort the run with the failing stage in the error context;
//! because commit is the last stage, an aborted run commits nothing.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::chunker::chunk_text;
use crate::config::{ChunkingConfig, EmbeddingConfig, IndexConfig};
use crate::db;
use crate::diff::{detect_changes, IndexMode};
use crate::embedding::Embedder;
use crate::extract;
use crate::models::{Chunk, FileRecord, IndexOutcome};
use crate::scan;
use crate::vectorstore::{VectorBatch, VectorStore};

/// Mutable state threaded through the six stages of one run.
#[derive(Default)]
struct IndexRun {
    files: Vec<FileRecord>,
    changed: Vec<FileRecord>,
    chunks: Vec<Chunk>,
    embeddings: Vec<Vec<f32>>,
    stats: BTreeMap<String, u64>,
    errors: Vec<String>,
}

/// Owns the collaborators an indexing run needs. Constructed once at
/// startup and reused across runs.
pub struct IndexPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    pool: SqlitePool,
    index_config: IndexConfig,
    chunking: ChunkingConfig,
    embed_batch_size: usize,
}

impl IndexPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        pool: SqlitePool,
        index_config: IndexConfig,
        chunking: ChunkingConfig,
        embedding: &EmbeddingConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            pool,
            index_config,
            chunking,
            embed_batch_size: embedding.batch_size,
        }
    }

    /// Run the full pipeline over `roots` (falling back to the configured
    /// roots when empty).
    pub async fn run(
        &self,
        roots: &[PathBuf],
        mode: IndexMode,
        force_reembed: bool,
    ) -> Result<IndexOutcome> {
        let roots = if roots.is_empty() {
            self.index_config.roots.clone()
        } else {
            roots.to_vec()
        };
        if roots.is_empty() {
            bail!("No index roots provided");
        }

        info!(mode = mode.as_str(), force_reembed, roots = roots.len(), "starting index run");

        let mut run = IndexRun::default();
        self.discover(&roots, &mut run)
            .context("discover stage failed")?;
        self.diff(mode, force_reembed, &mut run)
            .await
            .context("diff stage failed")?;
        self.parse_and_chunk(&mut run);
        self.embed(&mut run).await.context("embed stage failed")?;
        self.upsert(&mut run).await.context("upsert stage failed")?;
        self.commit(&run).await.context("commit stage failed")?;

        info!(
            discovered = run.stats.get("discovered").copied().unwrap_or(0),
            changed = run.stats.get("changed").copied().unwrap_or(0),
            upserted = run.stats.get("upserted").copied().unwrap_or(0),
            errors = run.errors.len(),
            "index run complete"
        );

        Ok(IndexOutcome {
            stats: run.stats,
            errors: run.errors,
            files: run.files,
            changed: run.changed,
        })
    }

    /// Stage 1: enumerate and fingerprint every supported file under the
    /// roots.
    fn discover(&self, roots: &[PathBuf], run: &mut IndexRun) -> Result<()> {
        run.files = scan::discover_files(roots, &self.index_config.exclude_globs)?;
        run.stats.insert("discovered".into(), run.files.len() as u64);
        Ok(())
    }

    /// Stage 2: select the subset needing re-embedding.
    async fn diff(&self, mode: IndexMode, force: bool, run: &mut IndexRun) -> Result<()> {
        let known = db::load_fingerprints(&self.pool).await?;
        run.changed = detect_changes(&run.files, &known, mode, force);
        run.stats.insert("changed".into(), run.changed.len() as u64);
        Ok(())
    }

    /// Stage 3: extract text and chunk each changed file. A file yielding
    /// empty text is a soft error and is skipped, not fatal.
    fn parse_and_chunk(&self, run: &mut IndexRun) {
        for file in &run.changed {
            let text = extract::extract_text(std::path::Path::new(&file.path));
            if text.is_empty() {
                run.errors.push(format!("parse-empty:{}", file.path));
                continue;
            }

            let windows = chunk_text(
                &text,
                self.chunking.target_tokens,
                self.chunking.overlap_tokens,
            );
            for (chunk_index, window) in windows.into_iter().enumerate() {
                run.chunks.push(Chunk {
                    file: file.clone(),
                    chunk_index,
                    char_start: window.start,
                    char_end: window.end,
                    text: window.text,
                });
            }
        }
        run.stats.insert("chunks".into(), run.chunks.len() as u64);
    }

    /// Stage 4: embed chunk texts in batches, preserving chunk order. No
    /// chunks means no provider call at all.
    async fn embed(&self, run: &mut IndexRun) -> Result<()> {
        if run.chunks.is_empty() {
            run.embeddings = Vec::new();
            return Ok(());
        }

        let texts: Vec<String> = run.chunks.iter().map(|c| c.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.embed_batch_size) {
            vectors.extend(self.embedder.embed(batch).await?);
        }

        if vectors.len() != run.chunks.len() {
            bail!(
                "embedding count mismatch: {} chunks, {} vectors",
                run.chunks.len(),
                vectors.len()
            );
        }

        debug!(count = vectors.len(), "embedded chunk batch");
        run.embeddings = vectors;
        Ok(())
    }

    /// Stage 5: build positionally aligned arrays and upsert them as one
    /// batch. Identity is `<fingerprint>:<chunk index>`, so unchanged
    /// content re-upserts in place.
    async fn upsert(&self, run: &mut IndexRun) -> Result<()> {
        if run.chunks.is_empty() {
            run.stats.insert("upserted".into(), 0);
            return Ok(());
        }

        let mut batch = VectorBatch::default();
        for (chunk, embedding) in run.chunks.iter().zip(run.embeddings.iter()) {
            batch.ids.push(chunk.vector_id());
            batch.documents.push(chunk.text.clone());
            batch.metadatas.push(serde_json::json!({
                "path": chunk.file.path,
                "sha256": chunk.file.sha256,
                "chunk_idx": chunk.chunk_index,
                "mime": chunk.file.mime,
                "ext": chunk.file.ext,
                "mtime_ns": chunk.file.mtime_ns,
                "embedding_model": self.embedder.model_name(),
            }));
            batch.embeddings.push(embedding.clone());
        }

        let upserted = batch.len() as u64;
        self.store.upsert(batch).await?;
        run.stats.insert("upserted".into(), upserted);
        Ok(())
    }

    /// Stage 6: stamp every changed file into the fingerprint table,
    /// whether or not it produced chunks. A file that failed to parse is
    /// still marked as seen, so it is not retried until its bytes change.
    async fn commit(&self, run: &IndexRun) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        for file in &run.changed {
            db::upsert_file(&self.pool, file, &now).await?;
        }
        Ok(())
    }
}
