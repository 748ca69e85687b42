//! Embedding provider abstraction.
//!
//! The pipelines depend on the [`Embedder`] trait only; concrete providers
//! are constructed at startup and injected. The OpenAI provider calls the
//! embeddings API with a per-request timeout and exponential backoff for
//! rate limits, server errors, and network failures. Other 4xx responses
//! fail immediately.
//!
//! Providers must preserve input order: `result[i]` is always the vector
//! for `texts[i]`.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;

/// Capability interface for batch text embedding.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded in vector metadata.
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, preserving input order in the output.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embedding provider backed by the OpenAI embeddings API.
///
/// Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAiEmbedder {
    model: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, model_override: Option<&str>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: model_override.unwrap_or(&config.model).to_string(),
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        let embeddings = parse_embeddings_response(&json)?;
                        if embeddings.len() != texts.len() {
                            bail!(
                                "embedding count mismatch: sent {} texts, got {} vectors",
                                texts.len(),
                                embeddings.len()
                            );
                        }
                        return Ok(embeddings);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

/// Extract the `data[].embedding` arrays from an embeddings API response,
/// in response order.
fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing embedding"))?;

        embeddings.push(
            embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }

    Ok(embeddings)
}

/// Construct the configured embedding provider.
pub fn create_embedder(
    config: &EmbeddingConfig,
    model_override: Option<&str>,
) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config, model_override)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
