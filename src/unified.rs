//! Unified search orchestration.
//!
//! Runs the local query pipeline, optionally runs a web search, then hands
//! both raw result sets to the fusion engine. A web-search failure degrades
//! the request to local-only results rather than failing it; the failure is
//! still visible in the audit log.

use std::time::Instant;

use anyhow::{bail, Result};
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;
use tracing::warn;

use crate::db;
use crate::fusion::{merge_results, normalize_local_hits, normalize_web_results, MergeStrategy};
use crate::models::UnifiedResult;
use crate::query::QueryPipeline;
use crate::websearch::WebSearchClient;

pub struct UnifiedSearchRequest<'a> {
    pub user_id: &'a str,
    pub query: &'a str,
    pub top_k: usize,
    pub filters: Option<&'a Map<String, Value>>,
    pub strategy: MergeStrategy,
    pub web_engines: &'a str,
    pub web_top_n: usize,
    pub include_web: bool,
    pub max_results: usize,
}

/// Combine local and web search into one ranked, deduplicated answer set.
pub async fn run_unified(
    query_pipeline: &QueryPipeline,
    web_client: &WebSearchClient,
    pool: &SqlitePool,
    req: UnifiedSearchRequest<'_>,
) -> Result<Vec<UnifiedResult>> {
    if req.query.trim().is_empty() {
        bail!("Missing query");
    }

    let started = Instant::now();

    let local_hits = query_pipeline
        .run(req.user_id, req.query, req.top_k, req.filters)
        .await?;

    let mut web_engine_used: Option<String> = None;
    let web_results = if req.include_web {
        match web_client
            .search(req.web_engines, req.query, req.web_top_n, false)
            .await
        {
            Ok(outcome) => {
                web_engine_used = Some(outcome.engine_used.clone());
                outcome.results
            }
            Err(e) => {
                warn!(error = %e, "web search failed, returning local results only");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let locals = normalize_local_hits(&local_hits, req.query);
    let webs = normalize_web_results(&web_results, req.query);
    let fused = merge_results(locals, webs, req.strategy, req.max_results);

    let latency_ms = started.elapsed().as_millis() as i64;
    let event_id = db::try_record_event(
        pool,
        req.user_id,
        "unified_search",
        &json!({
            "query": req.query,
            "top_k": req.top_k,
            "include_web": req.include_web,
            "web_top_n": req.web_top_n,
        }),
        &json!({
            "local_hits": local_hits.len(),
            "web_results": web_results.len(),
            "fused": fused.len(),
            "web_engine_used": web_engine_used,
        }),
        "ok",
        latency_ms,
        None,
    )
    .await;

    if let Some(event_id) = event_id {
        db::try_record_web_results(pool, event_id, &web_results).await;
    }

    Ok(fused)
}
