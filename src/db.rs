//! SQLite persistence: the durable file-fingerprint table and the audit log.
//!
//! The fingerprint table is written only by the commit stage of an indexing
//! run. Audit tables (queries, query hits, API events, web results) are
//! written fire-and-forget through the `try_*` wrappers: a failed audit
//! write logs a warning and never aborts the operation that produced it.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::warn;

use crate::models::{FileRecord, QueryHit, WebResult};

pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            path TEXT PRIMARY KEY,
            bytes INTEGER NOT NULL,
            mtime_ns INTEGER NOT NULL,
            sha256 TEXT NOT NULL,
            mime TEXT,
            last_indexed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            qtext TEXT NOT NULL,
            top_k INTEGER NOT NULL,
            filters_json TEXT,
            model TEXT,
            latency_ms INTEGER,
            response_json TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_hits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query_id INTEGER NOT NULL REFERENCES queries(id) ON DELETE CASCADE,
            rank INTEGER NOT NULL,
            score REAL,
            path TEXT,
            chunk_idx INTEGER,
            snippet TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT,
            api TEXT NOT NULL,
            request_json TEXT,
            response_json TEXT,
            status TEXT NOT NULL,
            notes TEXT,
            latency_ms INTEGER,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS web_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id INTEGER NOT NULL REFERENCES api_events(id) ON DELETE CASCADE,
            rank INTEGER NOT NULL,
            title TEXT,
            url TEXT,
            snippet TEXT,
            engine TEXT,
            published_date TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_query_hits_query_id ON query_hits(query_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_web_results_event_id ON web_results(event_id)")
        .execute(pool)
        .await?;

    Ok(())
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ============ Fingerprint table ============

/// Load the committed path → fingerprint map for change detection.
pub async fn load_fingerprints(pool: &SqlitePool) -> Result<HashMap<String, String>> {
    let rows = sqlx::query("SELECT path, sha256 FROM files")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("path"), row.get("sha256")))
        .collect())
}

/// Insert-or-update one file record, keyed by path. Idempotent under retry.
pub async fn upsert_file(pool: &SqlitePool, record: &FileRecord, indexed_at: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO files (path, bytes, mtime_ns, sha256, mime, last_indexed_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            bytes = excluded.bytes,
            mtime_ns = excluded.mtime_ns,
            sha256 = excluded.sha256,
            mime = excluded.mime,
            last_indexed_at = excluded.last_indexed_at
        "#,
    )
    .bind(&record.path)
    .bind(record.bytes as i64)
    .bind(record.mtime_ns)
    .bind(&record.sha256)
    .bind(&record.mime)
    .bind(indexed_at)
    .execute(pool)
    .await?;

    Ok(())
}

// ============ Audit log ============

async fn ensure_user(pool: &SqlitePool, user_id: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO users (id, created_at) VALUES (?, ?)")
        .bind(user_id)
        .bind(now_iso())
        .execute(pool)
        .await?;
    Ok(())
}

async fn record_query(
    pool: &SqlitePool,
    user_id: &str,
    qtext: &str,
    top_k: usize,
    filters_json: Option<String>,
    model: Option<&str>,
    latency_ms: i64,
    response_json: &str,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO queries (user_id, qtext, top_k, filters_json, model, latency_ms, response_json, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(qtext)
    .bind(top_k as i64)
    .bind(filters_json)
    .bind(model)
    .bind(latency_ms)
    .bind(response_json)
    .bind(now_iso())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn record_query_hits(pool: &SqlitePool, query_id: i64, hits: &[QueryHit]) -> Result<()> {
    for (rank, hit) in hits.iter().enumerate() {
        let snippet: String = hit.text.chars().take(2000).collect();
        sqlx::query(
            r#"
            INSERT INTO query_hits (query_id, rank, score, path, chunk_idx, snippet)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(query_id)
        .bind((rank + 1) as i64)
        .bind(hit.score as f64)
        .bind(&hit.path)
        .bind(hit.chunk_idx)
        .bind(snippet)
        .execute(pool)
        .await?;
    }
    Ok(())
}

async fn record_event(
    pool: &SqlitePool,
    user_id: &str,
    api: &str,
    request: &serde_json::Value,
    response: &serde_json::Value,
    status: &str,
    latency_ms: i64,
    notes: Option<&str>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO api_events (user_id, api, request_json, response_json, status, notes, latency_ms, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(api)
    .bind(request.to_string())
    .bind(response.to_string())
    .bind(status)
    .bind(notes)
    .bind(latency_ms)
    .bind(now_iso())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn record_web_results(
    pool: &SqlitePool,
    event_id: i64,
    results: &[WebResult],
) -> Result<()> {
    for (rank, r) in results.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO web_results (event_id, rank, title, url, snippet, engine, published_date)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event_id)
        .bind((rank + 1) as i64)
        .bind(&r.title)
        .bind(&r.url)
        .bind(&r.snippet)
        .bind(&r.engine)
        .bind(&r.published_date)
        .execute(pool)
        .await?;
    }
    Ok(())
}

// ============ Fire-and-forget wrappers ============

pub async fn try_ensure_user(pool: &SqlitePool, user_id: &str) {
    if let Err(e) = ensure_user(pool, user_id).await {
        warn!(user_id, error = %e, "failed to record user");
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn try_record_query(
    pool: &SqlitePool,
    user_id: &str,
    qtext: &str,
    top_k: usize,
    filters_json: Option<String>,
    model: Option<&str>,
    latency_ms: i64,
    hits: &[QueryHit],
) -> Option<i64> {
    let response_json =
        serde_json::to_string(&serde_json::json!({ "hits": hits })).unwrap_or_default();

    let query_id = match record_query(
        pool,
        user_id,
        qtext,
        top_k,
        filters_json,
        model,
        latency_ms,
        &response_json,
    )
    .await
    {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "failed to record query");
            return None;
        }
    };

    if let Err(e) = record_query_hits(pool, query_id, hits).await {
        warn!(query_id, error = %e, "failed to record query hits");
    }
    Some(query_id)
}

pub async fn try_record_event(
    pool: &SqlitePool,
    user_id: &str,
    api: &str,
    request: &serde_json::Value,
    response: &serde_json::Value,
    status: &str,
    latency_ms: i64,
    notes: Option<&str>,
) -> Option<i64> {
    match record_event(pool, user_id, api, request, response, status, latency_ms, notes).await {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(api, error = %e, "failed to record api event");
            None
        }
    }
}

pub async fn try_record_web_results(pool: &SqlitePool, event_id: i64, results: &[WebResult]) {
    if let Err(e) = record_web_results(pool, event_id, results).await {
        warn!(event_id, error = %e, "failed to record web results");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = connect(&tmp.path().join("app.sqlite")).await.unwrap();
        run_migrations(&pool).await.unwrap();
        (tmp, pool)
    }

    fn record(path: &str, sha: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            bytes: 10,
            mtime_ns: 42,
            sha256: sha.to_string(),
            mime: "text/plain".to_string(),
            ext: ".txt".to_string(),
        }
    }

    #[tokio::test]
    async fn fingerprint_upsert_is_keyed_by_path() {
        let (_tmp, pool) = test_pool().await;

        upsert_file(&pool, &record("/a.txt", "h1"), "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        upsert_file(&pool, &record("/a.txt", "h2"), "2026-01-02T00:00:00Z")
            .await
            .unwrap();

        let known = load_fingerprints(&pool).await.unwrap();
        assert_eq!(known.len(), 1);
        assert_eq!(known["/a.txt"], "h2");
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let (_tmp, pool) = test_pool().await;
        run_migrations(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn query_audit_round_trip() {
        let (_tmp, pool) = test_pool().await;
        try_ensure_user(&pool, "tester").await;

        let hits = vec![QueryHit {
            id: "h:0".to_string(),
            text: "snippet".to_string(),
            score: 0.2,
            meta: serde_json::json!({}),
            path: Some("/a.txt".to_string()),
            chunk_idx: Some(0),
            file_type: Some(".txt".to_string()),
        }];

        let query_id = try_record_query(&pool, "tester", "q", 10, None, None, 5, &hits)
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM query_hits WHERE query_id = ?")
            .bind(query_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
