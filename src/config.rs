use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::websearch;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/app.sqlite")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IndexConfig {
    /// Root directories (or single files) scanned when none are passed
    /// explicitly to an indexing run.
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    /// Exclude globs applied on top of the built-in defaults
    /// (`.git`, `target`, `node_modules`).
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_target_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

fn default_target_tokens() -> usize {
    800
}
fn default_overlap_tokens() -> usize {
    80
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            collection: default_collection(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_store_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_collection() -> String {
    "archivist".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSearchConfig {
    /// Ordered engine preference, `|` or `,` separated (e.g. `"serper|exa"`).
    #[serde(default = "default_engines")]
    pub engines: String,
    #[serde(default = "default_web_top_n")]
    pub top_n: usize,
    #[serde(default = "default_web_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            engines: default_engines(),
            top_n: default_web_top_n(),
            timeout_secs: default_web_timeout_secs(),
        }
    }
}

fn default_engines() -> String {
    "serper|exa".to_string()
}
fn default_web_top_n() -> usize {
    3
}
fn default_web_timeout_secs() -> u64 {
    15
}

/// Load and validate a configuration file. A missing file yields the
/// defaults, so `arx` works out of the box against a local stack.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.target_tokens == 0 {
        anyhow::bail!("chunking.target_tokens must be > 0");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "openai" => {}
        other => anyhow::bail!("Unknown embedding provider: '{}'. Must be openai.", other),
    }

    // Engine list must parse; validation errors name the offending engine.
    websearch::parse_engines(&config.web_search.engines)?;

    if config.web_search.top_n == 0 || config.web_search.top_n > 10 {
        anyhow::bail!("web_search.top_n must be in 1..=10");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.chunking.target_tokens, 800);
        assert_eq!(config.chunking.overlap_tokens, 80);
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.web_search.engines, "serper|exa");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/archivist.toml")).unwrap();
        assert_eq!(config.embedding.provider, "openai");
    }

    #[test]
    fn rejects_zero_target_tokens() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[chunking]\ntarget_tokens = 0\n").unwrap();
        assert!(load_config(tmp.path()).is_err());
    }

    #[test]
    fn rejects_unknown_engine() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[web_search]\nengines = \"bing\"\n").unwrap();
        assert!(load_config(tmp.path()).is_err());
    }
}
