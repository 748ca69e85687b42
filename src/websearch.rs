//! Web search engines with ordered fallback.
//!
//! Two engines are supported: `exa` and `serper`. The caller passes an
//! ordered preference list (`"exa|serper"`); engines are tried in order
//! and the first success wins. Failed attempts are collected into the
//! outcome's attempt log; only when every engine fails does the search
//! itself fail.
//!
//! API keys come from the environment: `EXA_API_KEY` and `SERPER_API_KEY`.

use std::time::Duration;

use anyhow::{bail, Result};
use tracing::warn;

use crate::config::WebSearchConfig;
use crate::models::{EngineAttempt, WebResult, WebSearchOutcome};

const VALID_ENGINES: &[&str] = &["exa", "serper"];

/// Maximum engines tried per search.
const MAX_ENGINES: usize = 3;

/// Parse an engine preference list such as `"exa|serper"` or `"serper,exa"`.
///
/// Returns a deduplicated, validated list in the given order, capped at
/// [`MAX_ENGINES`].
pub fn parse_engines(spec: &str) -> Result<Vec<String>> {
    if spec.trim().is_empty() {
        bail!("engine is required (exa, serper, or a list like 'exa|serper')");
    }

    let mut engines: Vec<String> = Vec::new();
    for part in spec.split(['|', ',']) {
        let engine = part.trim().to_lowercase();
        if engine.is_empty() {
            continue;
        }
        if !VALID_ENGINES.contains(&engine.as_str()) {
            bail!("unknown engine '{}'. Allowed: exa, serper", engine);
        }
        if !engines.contains(&engine) {
            engines.push(engine);
        }
    }

    if engines.is_empty() {
        bail!("engine list is empty");
    }
    engines.truncate(MAX_ENGINES);
    Ok(engines)
}

/// HTTP client over the configured web search engines.
pub struct WebSearchClient {
    client: reqwest::Client,
}

impl WebSearchClient {
    pub fn new(config: &WebSearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    /// Try each engine in `engine_spec` order until one succeeds.
    ///
    /// `include_text` asks engines that support it (exa) to return full
    /// page text alongside snippets.
    pub async fn search(
        &self,
        engine_spec: &str,
        query: &str,
        top_n: usize,
        include_text: bool,
    ) -> Result<WebSearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            bail!("Missing query");
        }

        let engines = parse_engines(engine_spec)?;
        let mut attempts: Vec<EngineAttempt> = Vec::new();

        for engine in &engines {
            let outcome = match engine.as_str() {
                "exa" => self.search_exa(query, top_n, include_text).await,
                "serper" => self.search_serper(query, top_n).await,
                _ => unreachable!("parse_engines validated the name"),
            };

            match outcome {
                Ok(results) => {
                    return Ok(WebSearchOutcome {
                        engine_used: engine.clone(),
                        attempted_engines: engines.clone(),
                        attempts,
                        results,
                    });
                }
                Err(e) => {
                    warn!(engine = engine.as_str(), error = %e, "web search engine failed");
                    attempts.push(EngineAttempt {
                        engine: engine.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let summary: Vec<String> = attempts
            .iter()
            .map(|a| format!("{}: {}", a.engine, a.error))
            .collect();
        bail!("All web search engines failed: {}", summary.join("; "))
    }

    async fn search_exa(
        &self,
        query: &str,
        top_n: usize,
        include_text: bool,
    ) -> Result<Vec<WebResult>> {
        let api_key = std::env::var("EXA_API_KEY")
            .map_err(|_| anyhow::anyhow!("EXA_API_KEY environment variable not set"))?;

        let mut body = serde_json::json!({
            "query": query,
            "numResults": top_n.clamp(1, 10),
        });
        if include_text {
            body["text"] = serde_json::Value::Bool(true);
        }

        let resp = self
            .client
            .post("https://api.exa.ai/search")
            .header("x-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("exa API error {}: {}", status, text);
        }

        let json: serde_json::Value = resp.json().await?;
        let results = json
            .get("results")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(results
            .iter()
            .map(|it| WebResult {
                title: it.get("title").and_then(|v| v.as_str()).map(String::from),
                url: it.get("url").and_then(|v| v.as_str()).map(String::from),
                snippet: it
                    .get("text")
                    .and_then(|v| v.as_str())
                    .or_else(|| it.get("description").and_then(|v| v.as_str()))
                    .map(String::from),
                published_date: it
                    .get("publishedDate")
                    .and_then(|v| v.as_str())
                    .map(String::from),
                engine: "exa".to_string(),
                text: if include_text {
                    it.get("text").and_then(|v| v.as_str()).map(String::from)
                } else {
                    None
                },
            })
            .collect())
    }

    async fn search_serper(&self, query: &str, top_n: usize) -> Result<Vec<WebResult>> {
        let api_key = std::env::var("SERPER_API_KEY")
            .map_err(|_| anyhow::anyhow!("SERPER_API_KEY environment variable not set"))?;

        let resp = self
            .client
            .post("https://google.serper.dev/search")
            .header("X-API-KEY", api_key)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "q": query,
                "num": top_n.clamp(1, 10),
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("serper API error {}: {}", status, text);
        }

        let json: serde_json::Value = resp.json().await?;
        let organic = json
            .get("organic")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(organic
            .iter()
            .map(|it| WebResult {
                title: it.get("title").and_then(|v| v.as_str()).map(String::from),
                url: it.get("link").and_then(|v| v.as_str()).map(String::from),
                snippet: it
                    .get("snippet")
                    .and_then(|v| v.as_str())
                    .map(String::from),
                published_date: None,
                engine: "serper".to_string(),
                text: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pipe_separated_list_in_order() {
        assert_eq!(parse_engines("exa|serper").unwrap(), vec!["exa", "serper"]);
    }

    #[test]
    fn parses_comma_separated_list() {
        assert_eq!(parse_engines("serper,exa").unwrap(), vec!["serper", "exa"]);
    }

    #[test]
    fn dedups_repeated_engines() {
        assert_eq!(parse_engines("exa|exa|serper").unwrap(), vec!["exa", "serper"]);
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(parse_engines(" Exa | SERPER ").unwrap(), vec!["exa", "serper"]);
    }

    #[test]
    fn rejects_unknown_engine() {
        assert!(parse_engines("bing").is_err());
    }

    #[test]
    fn rejects_empty_spec() {
        assert!(parse_engines("").is_err());
        assert!(parse_engines(" | ").is_err());
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let client = WebSearchClient::new(&WebSearchConfig::default()).unwrap();
        let err = client.search("serper", "   ", 3, false).await.unwrap_err();
        assert!(err.to_string().contains("Missing query"));
    }

    #[tokio::test]
    async fn all_engines_failing_reports_each_attempt() {
        std::env::remove_var("EXA_API_KEY");
        std::env::remove_var("SERPER_API_KEY");

        let client = WebSearchClient::new(&WebSearchConfig::default()).unwrap();
        let err = client
            .search("exa|serper", "rust async", 3, false)
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("All web search engines failed"));
        assert!(msg.contains("exa"));
        assert!(msg.contains("serper"));
    }
}
