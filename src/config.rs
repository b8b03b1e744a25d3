//! TOML configuration.
//!
//! Every section has defaults, so a minimal file only needs the provider
//! settings. Credentials are never stored in the file: providers name the
//! environment variable that holds their key (`api_key_env`), and the binary
//! loads a `.env` file before resolving them.
//!
//! ```toml
//! [index]
//! path = "./faiss_index"
//! dimension = 3072
//!
//! [embedding]
//! provider = "azure"
//! model = "text-embedding-3-large"
//! dims = 3072
//! endpoint = "https://example.openai.azure.com"
//! deployment = "embeddings"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk::{DEFAULT_MAX_TOKENS, DEFAULT_OVERLAP_TOKENS};
use crate::index::{DEFAULT_DIMENSION, DEFAULT_NUM_CHUNKS, DEFAULT_SNAPSHOT_DIR};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            dimension: DEFAULT_DIMENSION,
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from(DEFAULT_SNAPSHOT_DIR)
}
fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            overlap_tokens: DEFAULT_OVERLAP_TOKENS,
        }
    }
}

fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP_TOKENS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_num_chunks")]
    pub num_chunks: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            num_chunks: DEFAULT_NUM_CHUNKS,
        }
    }
}

fn default_num_chunks() -> usize {
    DEFAULT_NUM_CHUNKS
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// OpenAI-compatible base URL or Ollama URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Azure resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            endpoint: None,
            deployment: None,
            api_version: default_api_version(),
            api_key_env: None,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub frequency_penalty: f32,
    #[serde(default = "default_presence_penalty")]
    pub presence_penalty: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            endpoint: None,
            deployment: None,
            api_version: default_api_version(),
            api_key_env: None,
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            max_tokens: default_llm_max_tokens(),
            top_p: default_top_p(),
            frequency_penalty: 0.0,
            presence_penalty: default_presence_penalty(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_version() -> String {
    "2024-06-01".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_max_tokens() -> u32 {
    800
}
fn default_top_p() -> f32 {
    1.0
}
fn default_presence_penalty() -> f32 {
    0.6
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            recursive: false,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

const EMBEDDING_PROVIDERS: &[&str] = &["disabled", "openai", "azure", "ollama", "local"];
const LLM_PROVIDERS: &[&str] = &["disabled", "openai", "azure", "ollama"];

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;

    // Providers produce vectors the size of the index unless told otherwise.
    if config.embedding.is_enabled() {
        config.embedding.dims.get_or_insert(config.index.dimension);
    }
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.index.dimension == 0 {
        bail!("index.dimension must be > 0");
    }

    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        bail!("chunking.overlap_tokens must be smaller than chunking.max_tokens");
    }

    if config.retrieval.num_chunks < 1 {
        bail!("retrieval.num_chunks must be >= 1");
    }

    let embedding = &config.embedding;
    if !EMBEDDING_PROVIDERS.contains(&embedding.provider.as_str()) {
        bail!(
            "Unknown embedding provider: '{}'. Must be one of: {}.",
            embedding.provider,
            EMBEDDING_PROVIDERS.join(", ")
        );
    }
    if embedding.is_enabled() {
        if let Some(dims) = embedding.dims {
            if dims != config.index.dimension {
                bail!(
                    "embedding.dims ({}) must equal index.dimension ({})",
                    dims,
                    config.index.dimension
                );
            }
        }
        if embedding.provider == "azure"
            && (embedding.endpoint.is_none() || embedding.deployment.is_none())
        {
            bail!("embedding.endpoint and embedding.deployment are required for azure");
        }
    }

    let llm = &config.llm;
    if !LLM_PROVIDERS.contains(&llm.provider.as_str()) {
        bail!(
            "Unknown llm provider: '{}'. Must be one of: {}.",
            llm.provider,
            LLM_PROVIDERS.join(", ")
        );
    }
    if llm.provider == "azure" && (llm.endpoint.is_none() || llm.deployment.is_none()) {
        bail!("llm.endpoint and llm.deployment are required for azure");
    }
    if !(0.0..=2.0).contains(&llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}
