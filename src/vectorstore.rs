//! Vector store abstraction.
//!
//! The pipelines call through the [`VectorStore`] trait: a positional
//! batch upsert and a nearest-neighbor query. Two implementations:
//!
//! - **[`ChromaStore`]** — a Chroma server over HTTP. The collection is
//!   resolved eagerly at construction, so a misconfigured store fails at
//!   startup rather than mid-run.
//! - **[`MemoryStore`]** — brute-force cosine distance over an in-process
//!   map; used by tests and small ephemeral setups.
//!
//! An absent or empty metadata filter always means "no constraint"; it is
//! never forwarded as an empty match-nothing object.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::VectorStoreConfig;

/// Positionally aligned arrays for one upsert call: entry `i` of every
/// array describes the same chunk.
#[derive(Debug, Default)]
pub struct VectorBatch {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Value>,
    pub embeddings: Vec<Vec<f32>>,
}

impl VectorBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Columnar response of a similarity query; row `i` of every column
/// describes the same record, nearest first.
#[derive(Debug, Default)]
pub struct QueryResponse {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Value>,
    pub distances: Vec<f32>,
}

/// Capability interface over the external vector-similarity store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert-or-update by id. Idempotent: re-upserting the same batch is
    /// safe under retry.
    async fn upsert(&self, batch: VectorBatch) -> Result<()>;

    /// Return the `top_k` nearest records. `filter` holds exact-match
    /// metadata constraints; `None` means unconstrained.
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&Map<String, Value>>,
    ) -> Result<QueryResponse>;
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

// ============ Chroma (HTTP) ============

/// Vector store backed by a Chroma server's REST API.
pub struct ChromaStore {
    client: reqwest::Client,
    base_url: String,
    collection_id: String,
}

impl ChromaStore {
    /// Connect and resolve (or create) the configured collection.
    pub async fn connect(config: &VectorStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = config.url.trim_end_matches('/').to_string();

        let resp = client
            .post(format!("{}/api/v1/collections", base_url))
            .json(&serde_json::json!({
                "name": config.collection,
                "get_or_create": true,
                "metadata": {"hnsw:space": "cosine"},
            }))
            .send()
            .await
            .with_context(|| format!("Failed to reach vector store at {}", base_url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Vector store collection setup failed ({}): {}", status, body);
        }

        let json: Value = resp.json().await?;
        let collection_id = json
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Vector store response missing collection id"))?
            .to_string();

        Ok(Self {
            client,
            base_url,
            collection_id,
        })
    }

    fn collection_url(&self, op: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{}",
            self.base_url, self.collection_id, op
        )
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn upsert(&self, batch: VectorBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let resp = self
            .client
            .post(self.collection_url("upsert"))
            .json(&serde_json::json!({
                "ids": batch.ids,
                "documents": batch.documents,
                "metadatas": batch.metadatas,
                "embeddings": batch.embeddings,
            }))
            .send()
            .await
            .context("Vector store upsert request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Vector store upsert failed ({}): {}", status, body);
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&Map<String, Value>>,
    ) -> Result<QueryResponse> {
        let mut body = serde_json::json!({
            "query_embeddings": [embedding],
            "n_results": top_k,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(constraints) = filter.filter(|f| !f.is_empty()) {
            body["where"] = Value::Object(constraints.clone());
        }

        let resp = self
            .client
            .post(self.collection_url("query"))
            .json(&body)
            .send()
            .await
            .context("Vector store query request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Vector store query failed ({}): {}", status, text);
        }

        let json: Value = resp.json().await?;
        Ok(parse_query_response(&json))
    }
}

/// Chroma returns one row per query embedding; we always send exactly one.
fn parse_query_response(json: &Value) -> QueryResponse {
    fn first_row(json: &Value, key: &str) -> Vec<Value> {
        json.get(key)
            .and_then(|v| v.as_array())
            .and_then(|rows| rows.first())
            .and_then(|row| row.as_array())
            .cloned()
            .unwrap_or_default()
    }

    QueryResponse {
        ids: first_row(json, "ids")
            .iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect(),
        documents: first_row(json, "documents")
            .iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect(),
        metadatas: first_row(json, "metadatas"),
        distances: first_row(json, "distances")
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect(),
    }
}

// ============ In-memory ============

struct StoredRecord {
    document: String,
    metadata: Value,
    embedding: Vec<f32>,
}

/// In-memory store: cosine distance (`1 − similarity`), exact-match
/// metadata filtering.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn count(&self) -> usize {
        self.records.read().unwrap().len()
    }
}

fn matches_filter(metadata: &Value, filter: Option<&Map<String, Value>>) -> bool {
    match filter {
        None => true,
        Some(constraints) => constraints
            .iter()
            .all(|(k, v)| metadata.get(k) == Some(v)),
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, batch: VectorBatch) -> Result<()> {
        let mut records = self.records.write().unwrap();
        for (((id, document), metadata), embedding) in batch
            .ids
            .into_iter()
            .zip(batch.documents)
            .zip(batch.metadatas)
            .zip(batch.embeddings)
        {
            records.insert(
                id,
                StoredRecord {
                    document,
                    metadata,
                    embedding,
                },
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&Map<String, Value>>,
    ) -> Result<QueryResponse> {
        let filter = filter.filter(|f| !f.is_empty());
        let records = self.records.read().unwrap();

        let mut scored: Vec<(&String, &StoredRecord, f32)> = records
            .iter()
            .filter(|(_, r)| matches_filter(&r.metadata, filter))
            .map(|(id, r)| (id, r, 1.0 - cosine_similarity(embedding, &r.embedding)))
            .collect();
        scored.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        let mut resp = QueryResponse::default();
        for (id, record, distance) in scored {
            resp.ids.push(id.clone());
            resp.documents.push(record.document.clone());
            resp.metadatas.push(record.metadata.clone());
            resp.distances.push(distance);
        }
        Ok(resp)
    }
}
