//! Core data models used throughout archivist.
//!
//! These types represent the files, chunks, and search results that flow
//! through the indexing, query, and fusion pipelines.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One discoverable file, produced fresh on every discovery pass.
///
/// The persisted copy lives in the `files` table and is updated only by the
/// commit stage of an indexing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path; unique key within a discovery pass.
    pub path: String,
    /// Size in bytes at discovery time.
    pub bytes: u64,
    /// Modification time, nanosecond resolution.
    pub mtime_ns: i64,
    /// Strong content hash, or a weak `sig:<size>:<mtime_ns>` signature when
    /// the file could not be read. Weak signatures are indistinguishable from
    /// touch-only changes; that collision is accepted.
    pub sha256: String,
    /// MIME hint guessed from the path.
    pub mime: String,
    /// Lowercase extension including the leading dot (e.g. `".md"`).
    pub ext: String,
}

/// A contiguous character span of one file's extracted text.
///
/// Transient: only its embedding and metadata survive, in the vector store.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub file: FileRecord,
    /// Zero-based sequence index within the owning file.
    pub chunk_index: usize,
    pub char_start: usize,
    pub char_end: usize,
    pub text: String,
}

impl Chunk {
    /// Vector record identity: a pure function of content fingerprint and
    /// chunk position, so re-embedding unchanged content upserts in place.
    pub fn vector_id(&self) -> String {
        format!("{}:{}", self.file.sha256, self.chunk_index)
    }
}

/// One result of a similarity query against the vector store.
#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    /// Raw distance score from the store, surfaced as-is.
    pub score: f32,
    pub meta: Value,
    pub path: Option<String>,
    pub chunk_idx: Option<i64>,
    pub file_type: Option<String>,
}

/// One raw result from a web search engine, before fusion.
#[derive(Debug, Clone, Serialize)]
pub struct WebResult {
    pub title: Option<String>,
    pub url: Option<String>,
    pub snippet: Option<String>,
    pub published_date: Option<String>,
    /// Which engine produced this result (`"exa"` or `"serper"`).
    pub engine: String,
    /// Full page text, when the engine was asked for it.
    pub text: Option<String>,
}

/// Origin of a unified search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Local,
    Web,
}

impl std::fmt::Display for SearchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchSource::Local => write!(f, "local"),
            SearchSource::Web => write!(f, "web"),
        }
    }
}

/// Fusion-stage output: local and web hits normalized under one schema.
#[derive(Debug, Clone, Serialize)]
pub struct UnifiedResult {
    pub source: SearchSource,
    pub title: String,
    /// Bounded preview (first 500 characters of the underlying text).
    pub content: String,
    pub url: Option<String>,
    /// Final relevance score in `[0, 1]`.
    pub score: f32,
    /// Preserves original scores and full text for downstream consumers.
    pub metadata: Value,
}

/// Result of one indexing run: per-stage counters, soft errors, and the
/// discovered/changed file sets.
#[derive(Debug, Default, Serialize)]
pub struct IndexOutcome {
    pub stats: BTreeMap<String, u64>,
    pub errors: Vec<String>,
    pub files: Vec<FileRecord>,
    pub changed: Vec<FileRecord>,
}

impl IndexOutcome {
    /// Sorted unique paths of every discovered file.
    pub fn scanned_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.iter().map(|f| f.path.clone()).collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Sorted unique paths of files selected for re-embedding.
    pub fn changed_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.changed.iter().map(|f| f.path.clone()).collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Scanned paths minus changed paths.
    pub fn unchanged_paths(&self) -> Vec<String> {
        let changed = self.changed_paths();
        self.scanned_paths()
            .into_iter()
            .filter(|p| changed.binary_search(p).is_err())
            .collect()
    }
}

/// One failed engine attempt during a web search with fallback.
#[derive(Debug, Clone, Serialize)]
pub struct EngineAttempt {
    pub engine: String,
    pub error: String,
}

/// Outcome of a web search across an ordered engine list.
#[derive(Debug, Serialize)]
pub struct WebSearchOutcome {
    /// The engine that actually produced `results`.
    pub engine_used: String,
    pub attempted_engines: Vec<String>,
    /// Engines that were tried and failed before `engine_used` succeeded.
    pub attempts: Vec<EngineAttempt>,
    pub results: Vec<WebResult>,
}
