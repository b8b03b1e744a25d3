//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait consumed by the vector index and
//! concrete implementations:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API.
//! - **[`AzureOpenAIProvider`]**: calls an Azure OpenAI embeddings deployment.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalProvider`**: runs a model in-process via fastembed
//!   (feature `local-embeddings-fastembed`).
//!
//! # Provider Selection
//!
//! Use [`create_provider`] to instantiate the appropriate provider based
//! on the configuration:
//!
//! ```rust,no_run
//! # use ragchat::config::EmbeddingConfig;
//! # use ragchat::embedding::create_provider;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! assert!(!provider.is_enabled());
//! ```
//!
//! HTTP providers retry transient failures with exponential backoff (see
//! [`crate::http`]). Credentials are read once, in the constructor, from the
//! environment variable named by `api_key_env`.

#[cfg(feature = "local-embeddings-fastembed")]
mod local_fastembed;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local_fastembed::LocalProvider;

use anyhow::{anyhow, bail, Result};
use reqwest::blocking::Client;
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::http;

/// Maps text to a fixed-dimension vector.
///
/// Implementations must return an error when the upstream fails; they must
/// never substitute a placeholder vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-large"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `3072`).
    fn dims(&self) -> usize;
    /// `false` only for the placeholder used when no provider is configured.
    fn is_enabled(&self) -> bool {
        true
    }
    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    fn is_enabled(&self) -> bool {
        false
    }
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Provider ============

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Embedding provider using the OpenAI API (`POST /v1/embeddings`).
///
/// The base URL can be pointed at any OpenAI-compatible server through
/// `embedding.url`.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    base_url: String,
    max_retries: u32,
    client: Client,
}

impl OpenAIProvider {
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config, or if the
    /// API key variable (default `OPENAI_API_KEY`) is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key =
            http::api_key_from_env(config.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY"))?;
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        Ok(Self {
            model,
            dims,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let url = format!("{}/embeddings", self.base_url);
        let json = http::post_json_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })?;
        first_embedding(parse_openai_response(&json)?)
    }
}

// ============ Azure OpenAI Provider ============

/// Embedding provider using an Azure OpenAI deployment.
///
/// Calls `POST {endpoint}/openai/deployments/{deployment}/embeddings?api-version={v}`
/// with the `api-key` header. The key comes from `embedding.api_key_env`
/// (default `AZURE_EMBEDDINGS_API_KEY`).
pub struct AzureOpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    url: String,
    max_retries: u32,
    client: Client,
}

impl AzureOpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| anyhow!("embedding.endpoint required for Azure provider"))?;
        let deployment = config
            .deployment
            .as_deref()
            .ok_or_else(|| anyhow!("embedding.deployment required for Azure provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Azure provider"))?;
        let api_key = http::api_key_from_env(
            config
                .api_key_env
                .as_deref()
                .unwrap_or("AZURE_EMBEDDINGS_API_KEY"),
        )?;

        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| deployment.to_string()),
            dims,
            api_key,
            url: http::azure_url(endpoint, deployment, "embeddings", &config.api_version),
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

impl EmbeddingProvider for AzureOpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({ "input": [text] });
        let json = http::post_json_with_retry("Azure OpenAI", self.max_retries, || {
            self.client
                .post(&self.url)
                .header("api-key", &self.api_key)
                .json(&body)
        })?;
        first_embedding(parse_openai_response(&json)?)
    }
}

/// Parse an OpenAI-style embeddings response (`data[].embedding`).
///
/// Items are ordered by their `index` field when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, json_floats(embedding)?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default:
/// `http://localhost:11434`). Requires Ollama to be running with an embedding
/// model pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let endpoint = format!("{}/api/embed", self.url);
        let json = http::post_json_with_retry("Ollama", self.max_retries, || {
            self.client.post(&endpoint).json(&body)
        })?;
        first_embedding(parse_ollama_response(&json)?)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            let values = embedding
                .as_array()
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))?;
            json_floats(values)
        })
        .collect()
}

fn json_floats(values: &[serde_json::Value]) -> Result<Vec<f32>> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("Invalid embedding value: {}", v))
        })
        .collect()
}

fn first_embedding(mut embeddings: Vec<Vec<f32>>) -> Result<Vec<f32>> {
    if embeddings.is_empty() {
        bail!("Empty embedding response");
    }
    Ok(embeddings.swap_remove(0))
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"azure"` | [`AzureOpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (feature `local-embeddings-fastembed`) |
///
/// # Errors
///
/// Returns an error for unknown provider names or if the provider
/// cannot be initialized (missing config, API key, or feature flag).
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "azure" => Ok(Arc::new(AzureOpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires building with --features local-embeddings-fastembed"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_provider_errors() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert!(!provider.is_enabled());
        let err = provider.embed("hello").unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn test_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "faiss".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_openai_requires_model() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            dims: Some(4),
            ..EmbeddingConfig::default()
        };
        let err = OpenAIProvider::new(&config).err().unwrap();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_ollama_provider_needs_no_key() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            model: Some("nomic-embed-text".to_string()),
            dims: Some(768),
            url: Some("http://localhost:11434/".to_string()),
            ..EmbeddingConfig::default()
        };
        let provider = OllamaProvider::new(&config).unwrap();
        assert_eq!(provider.model_name(), "nomic-embed-text");
        assert_eq!(provider.dims(), 768);
        assert_eq!(provider.url, "http://localhost:11434");
    }

    #[test]
    fn test_parse_openai_response_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [3.0, 4.0] },
                { "index": 0, "embedding": [1.0, 2.0] }
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_parse_openai_response_rejects_bad_shapes() {
        assert!(parse_openai_response(&serde_json::json!({})).is_err());
        let json = serde_json::json!({ "data": [{ "embedding": ["x"] }] });
        assert!(parse_openai_response(&json).is_err());
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({ "embeddings": [[0.5, -0.25]] });
        let vec = first_embedding(parse_ollama_response(&json).unwrap()).unwrap();
        assert_eq!(vec, vec![0.5, -0.25]);
        let empty = serde_json::json!({ "embeddings": [] });
        assert!(first_embedding(parse_ollama_response(&empty).unwrap()).is_err());
    }
}
