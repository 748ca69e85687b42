//! The query pipeline.
//!
//! A single retrieve stage: embed the query string once, ask the vector
//! store for the nearest records, and zip the columnar response into
//! [`QueryHit`]s by position. Distances are surfaced raw; normalization
//! happens only in result fusion.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tracing::debug;

use crate::db;
use crate::embedding::Embedder;
use crate::models::QueryHit;
use crate::vectorstore::VectorStore;

pub struct QueryPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    pool: SqlitePool,
}

impl QueryPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, pool: SqlitePool) -> Self {
        Self {
            embedder,
            store,
            pool,
        }
    }

    /// Retrieve the `top_k` nearest chunks for `query`.
    ///
    /// A blank query yields an empty hit list without touching the
    /// embedding provider. An empty filter map is normalized to "no
    /// constraint", never forwarded as a match-nothing filter.
    pub async fn run(
        &self,
        user_id: &str,
        query: &str,
        top_k: usize,
        filters: Option<&Map<String, Value>>,
    ) -> Result<Vec<QueryHit>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        db::try_ensure_user(&self.pool, user_id).await;

        let filter = filters.filter(|f| !f.is_empty());

        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response for query"))?;

        let resp = self.store.query(&query_vec, top_k, filter).await?;

        let hits: Vec<QueryHit> = resp
            .ids
            .into_iter()
            .zip(resp.documents)
            .zip(resp.metadatas)
            .zip(resp.distances)
            .map(|(((id, text), meta), distance)| QueryHit {
                path: meta.get("path").and_then(|v| v.as_str()).map(String::from),
                chunk_idx: meta.get("chunk_idx").and_then(|v| v.as_i64()),
                file_type: meta.get("ext").and_then(|v| v.as_str()).map(String::from),
                id,
                text,
                score: distance,
                meta,
            })
            .collect();

        debug!(user_id, top_k, hits = hits.len(), "query complete");

        let latency_ms = started.elapsed().as_millis() as i64;
        let filters_json = filter.map(|f| Value::Object(f.clone()).to_string());
        db::try_record_query(
            &self.pool,
            user_id,
            query,
            top_k,
            filters_json,
            Some(self.embedder.model_name()),
            latency_ms,
            &hits,
        )
        .await;

        Ok(hits)
    }
}
