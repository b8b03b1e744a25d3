//! In-process embeddings via fastembed.
//!
//! The model is downloaded from Hugging Face on first use and cached; after
//! that, embedding runs offline.

use anyhow::{anyhow, bail, Result};
use std::sync::Mutex;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;

const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";

/// Embedding provider running a local ONNX model.
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    model: Mutex<fastembed::TextEmbedding>,
}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
        let (fastembed_model, native_dims) = resolve_model(&model_name)?;
        let dims = config.dims.unwrap_or(native_dims);
        if dims != native_dims {
            bail!(
                "Local model '{}' produces {}-dimensional vectors, but embedding.dims is {}",
                model_name,
                native_dims,
                dims
            );
        }

        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name,
            dims,
            model: Mutex::new(model),
        })
    }
}

impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self.model.lock().unwrap_or_else(|e| e.into_inner());
        let mut embeddings = model
            .embed(vec![text], None)
            .map_err(|e| anyhow!("Local embedding failed: {}", e))?;
        if embeddings.is_empty() {
            bail!("Local model returned no embedding");
        }
        Ok(embeddings.swap_remove(0))
    }
}

fn resolve_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel::*;
    match name {
        "all-minilm-l6-v2" => Ok((AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Ok((BGELargeENV15, 1024)),
        "nomic-embed-text-v1.5" => Ok((NomicEmbedTextV15, 768)),
        "multilingual-e5-small" => Ok((MultilingualE5Small, 384)),
        "multilingual-e5-large" => Ok((MultilingualE5Large, 1024)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small, multilingual-e5-large",
            other
        ),
    }
}
