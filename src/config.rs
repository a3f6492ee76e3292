//! TOML configuration parsing and validation.
//!
//! Every tunable of the indexing and retrieval pipeline lives here, including
//! the diversity-filter fractions, which are deliberately exposed as
//! configuration rather than hard-coded.
//!
//! ```toml
//! [db]
//! path = "./data/docsift.sqlite"
//!
//! [watch]
//! root = "./documents"
//!
//! [chunking]
//! chunk_size = 1200
//! overlap = 150
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub watch: Option<WatchConfig>,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    pub root: PathBuf,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_max_depth() -> usize {
    10
}
fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive windows.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            insert_batch_size: default_insert_batch_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    1200
}
fn default_overlap() -> usize {
    150
}
fn default_insert_batch_size() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled`, `openai`, `ollama`, or `hashed`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL of the embedding (or, for `hashed`, the summarization) endpoint.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the API key for hosted backends.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Retries for the query embedding at search time. The keyword channel
    /// waits on it, so it stays low.
    #[serde(default = "default_query_max_retries")]
    pub query_max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// `hashed` only: ask a generative model for a short summary before hashing.
    #[serde(default)]
    pub summarize: bool,
    #[serde(default)]
    pub summary_model: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            query_max_retries: default_query_max_retries(),
            timeout_secs: default_timeout_secs(),
            summarize: false,
            summary_model: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_query_max_retries() -> u32 {
    1
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// The same backend settings with the search-time retry budget.
    pub fn for_queries(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            max_retries: self.query_max_retries,
            ..self.clone()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Multiplier applied to keyword-channel hits during combination.
    #[serde(default = "default_keyword_boost")]
    pub keyword_boost: f64,
    /// Fraction of a duplicate vector hit's score added to the keyword entry.
    #[serde(default = "default_hybrid_bonus")]
    pub hybrid_bonus: f64,
    #[serde(default = "default_trigram_floor")]
    pub trigram_floor: f64,
    #[serde(default)]
    pub diversity: DiversityConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            similarity_threshold: default_similarity_threshold(),
            keyword_boost: default_keyword_boost(),
            hybrid_bonus: default_hybrid_bonus(),
            trigram_floor: default_trigram_floor(),
            diversity: DiversityConfig::default(),
        }
    }
}

fn default_limit() -> usize {
    10
}
fn default_similarity_threshold() -> f64 {
    0.3
}
fn default_keyword_boost() -> f64 {
    1.5
}
fn default_hybrid_bonus() -> f64 {
    0.2
}
fn default_trigram_floor() -> f64 {
    0.3
}

/// Caps on how many results may share a category or document type.
///
/// Caps are `ceil(limit × fraction)`. Candidates whose document importance
/// exceeds `high_importance_threshold` are measured against the relaxed
/// `high_*` fractions instead.
#[derive(Debug, Deserialize, Clone)]
pub struct DiversityConfig {
    #[serde(default = "default_category_fraction")]
    pub category_fraction: f64,
    #[serde(default = "default_type_fraction")]
    pub type_fraction: f64,
    #[serde(default = "default_high_category_fraction")]
    pub high_category_fraction: f64,
    #[serde(default = "default_high_type_fraction")]
    pub high_type_fraction: f64,
    #[serde(default = "default_high_importance_threshold")]
    pub high_importance_threshold: f64,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            category_fraction: default_category_fraction(),
            type_fraction: default_type_fraction(),
            high_category_fraction: default_high_category_fraction(),
            high_type_fraction: default_high_type_fraction(),
            high_importance_threshold: default_high_importance_threshold(),
        }
    }
}

fn default_category_fraction() -> f64 {
    0.4
}
fn default_type_fraction() -> f64 {
    0.3
}
fn default_high_category_fraction() -> f64 {
    0.6
}
fn default_high_type_fraction() -> f64 {
    0.5
}
fn default_high_importance_threshold() -> f64 {
    1.5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }
    if config.chunking.insert_batch_size == 0 {
        anyhow::bail!("chunking.insert_batch_size must be > 0");
    }

    if let Some(watch) = &config.watch {
        if watch.concurrency == 0 {
            anyhow::bail!("watch.concurrency must be >= 1");
        }
    }

    if config.retrieval.default_limit < 1 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }
    let d = &config.retrieval.diversity;
    for (name, value) in [
        ("category_fraction", d.category_fraction),
        ("type_fraction", d.type_fraction),
        ("high_category_fraction", d.high_category_fraction),
        ("high_type_fraction", d.high_type_fraction),
    ] {
        if !(value > 0.0 && value <= 1.0) {
            anyhow::bail!("retrieval.diversity.{} must be in (0.0, 1.0]", name);
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "hashed" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or hashed.",
            other
        ),
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.provider != "hashed" && config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    Ok(config)
}
