//! Result fusion engine.
//!
//! Merges raw local query hits and raw web-search results into one ranked,
//! deduplicated list. Everything here is pure and synchronous: relevance
//! scoring, per-source normalization, and the merge strategies.

use anyhow::{bail, Result};
use serde_json::json;

use crate::models::{QueryHit, SearchSource, UnifiedResult, WebResult};

/// Bounded preview length carried in a [`UnifiedResult`].
const PREVIEW_CHARS: usize = 500;

/// Content-fingerprint prefix length used for deduplication.
const FINGERPRINT_CHARS: usize = 200;

/// How results from both sources are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Mix purely by score (default).
    Balanced,
    /// Boost local scores by 1.3× before the generic merge.
    LocalFirst,
    /// Boost web scores by 1.3× before the generic merge.
    WebFirst,
    /// Alternate local/web in original order; no scoring, no dedup.
    Interleaved,
}

impl std::str::FromStr for MergeStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "balanced" => Ok(MergeStrategy::Balanced),
            "local_first" => Ok(MergeStrategy::LocalFirst),
            "web_first" => Ok(MergeStrategy::WebFirst),
            "interleaved" => Ok(MergeStrategy::Interleaved),
            other => bail!(
                "Unknown merge strategy: {}. Use balanced, local_first, web_first, or interleaved.",
                other
            ),
        }
    }
}

/// Heuristic relevance of `text`/`title` to `query`, in `[0, 1]`.
///
/// An exact phrase match in the title scores 1.0 and in the body 0.95,
/// both terminating early. Otherwise the score is a weighted sum of term
/// coverage (0.5), capped term frequency (0.3), and fuzzy similarity
/// against the first 1000 characters (0.2).
pub fn relevance_score(query: &str, text: &str, title: &str) -> f32 {
    let query_lower = query.to_lowercase().trim().to_string();
    let text_lower = text.to_lowercase().trim().to_string();
    let title_lower = title.to_lowercase().trim().to_string();

    let combined = format!("{} {}", title_lower, text_lower);

    if title_lower.contains(&query_lower) {
        return 1.0;
    }
    if text_lower.contains(&query_lower) {
        return 0.95;
    }

    let query_terms: std::collections::HashSet<&str> = query_lower.split_whitespace().collect();
    if query_terms.is_empty() {
        return 0.0;
    }

    let combined_terms: std::collections::HashSet<&str> = combined.split_whitespace().collect();
    let matching = query_terms.intersection(&combined_terms).count();
    let term_coverage = matching as f32 / query_terms.len() as f32;

    let occurrences: usize = query_terms
        .iter()
        .map(|term| combined.matches(term).count())
        .sum();
    let term_freq = (occurrences as f32 / (query_terms.len() as f32 * 3.0)).min(1.0);

    let prefix: String = combined.chars().take(1000).collect();
    let fuzzy = strsim::normalized_levenshtein(&query_lower, &prefix) as f32;

    (term_coverage * 0.5 + term_freq * 0.3 + fuzzy * 0.2).min(1.0)
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// Normalize local query hits into the unified schema.
///
/// The relevance score is recomputed from content and filename; a good
/// vector match (cosine distance below 0.5) earns a 1.2× confidence boost.
pub fn normalize_local_hits(hits: &[QueryHit], query: &str) -> Vec<UnifiedResult> {
    hits.iter()
        .map(|hit| {
            let file_name = hit
                .path
                .as_deref()
                .and_then(|p| p.rsplit('/').next())
                .filter(|n| !n.is_empty())
                .unwrap_or("Local Document")
                .to_string();

            let mut relevance = relevance_score(query, &hit.text, &file_name);
            if hit.score < 0.5 {
                relevance *= 1.2;
            }

            UnifiedResult {
                source: SearchSource::Local,
                title: file_name,
                content: preview(&hit.text),
                url: hit.path.as_ref().map(|p| format!("file://{}", p)),
                score: relevance.min(1.0),
                metadata: json!({
                    "path": hit.path,
                    "original_score": hit.score,
                    "chunk_idx": hit.chunk_idx,
                    "file_type": hit.file_type,
                    "full_text": hit.text,
                }),
            }
        })
        .collect()
}

/// Normalize web-search results into the unified schema.
///
/// The score blends the engine's ranking (position decay, never below 0.5)
/// at weight 0.4 with content relevance at weight 0.6.
pub fn normalize_web_results(results: &[WebResult], query: &str) -> Vec<UnifiedResult> {
    results
        .iter()
        .enumerate()
        .map(|(idx, result)| {
            let snippet = result
                .snippet
                .as_deref()
                .or(result.text.as_deref())
                .unwrap_or_default();
            let title = result.title.as_deref().unwrap_or_default();

            let position_score = (1.0 - idx as f32 * 0.08).max(0.5);
            let content_score = relevance_score(query, snippet, title);
            let final_score = position_score * 0.4 + content_score * 0.6;

            UnifiedResult {
                source: SearchSource::Web,
                title: title.to_string(),
                content: preview(snippet),
                url: result.url.clone(),
                score: final_score,
                metadata: json!({
                    "published_date": result.published_date,
                    "search_engine": result.engine,
                    "position": idx + 1,
                    "full_text": result.text,
                }),
            }
        })
        .collect()
}

fn sort_by_score_desc(results: &mut [UnifiedResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn content_fingerprint(result: &UnifiedResult) -> String {
    result
        .content
        .chars()
        .take(FINGERPRINT_CHARS)
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Merge normalized local and web results under the selected strategy,
/// deduplicate, and cap at `max_results`.
pub fn merge_results(
    mut local: Vec<UnifiedResult>,
    mut web: Vec<UnifiedResult>,
    strategy: MergeStrategy,
    max_results: usize,
) -> Vec<UnifiedResult> {
    match strategy {
        MergeStrategy::LocalFirst => {
            for r in &mut local {
                r.score = (r.score * 1.3).min(1.0);
            }
        }
        MergeStrategy::WebFirst => {
            for r in &mut web {
                r.score = (r.score * 1.3).min(1.0);
            }
        }
        MergeStrategy::Interleaved => {
            let mut merged = Vec::with_capacity(local.len() + web.len());
            let mut local_iter = local.into_iter();
            let mut web_iter = web.into_iter();
            loop {
                let l = local_iter.next();
                let w = web_iter.next();
                if l.is_none() && w.is_none() {
                    break;
                }
                merged.extend(l);
                merged.extend(w);
            }
            merged.truncate(max_results);
            return merged;
        }
        MergeStrategy::Balanced => {}
    }

    let mut all: Vec<UnifiedResult> = local;
    all.append(&mut web);
    sort_by_score_desc(&mut all);

    // Greedy dedup in score order: skip items whose URL or content prefix
    // was already emitted, stop once the cap is reached.
    let mut unique: Vec<UnifiedResult> = Vec::new();
    let mut seen_urls: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut seen_fingerprints: std::collections::HashSet<String> = std::collections::HashSet::new();

    for result in all {
        if let Some(url) = &result.url {
            if seen_urls.contains(url) {
                continue;
            }
        }

        let fingerprint = content_fingerprint(&result);
        if seen_fingerprints.contains(&fingerprint) {
            continue;
        }

        if let Some(url) = &result.url {
            seen_urls.insert(url.clone());
        }
        if !fingerprint.is_empty() {
            seen_fingerprints.insert(fingerprint);
        }
        unique.push(result);

        if unique.len() >= max_results {
            break;
        }
    }

    // The append order already follows scores, but re-sorting guards the
    // cap against any post-boost ties landing out of order.
    sort_by_score_desc(&mut unique);
    unique.truncate(max_results);
    unique
}
