//! Local ONNX-based embedding backend (feature `embeddings`).
//!
//! Adapted from the teacher's `EmbeddingService`: a lazily-initialized
//! `fastembed::TextEmbedding` behind a `OnceLock`, so model weights are
//! downloaded/loaded once per process regardless of how many
//! `FastEmbedder` instances exist. The model's native output dimension is
//! truncated (Matryoshka-style) to the engine's configured `D` when `D` is
//! smaller than the native size.

use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use directories::ProjectDirs;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{EmbedError, EmbedResult, Embedder, Embedding, MAX_TEXT_LENGTH};

static MODEL: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

fn cache_dir() -> std::path::PathBuf {
    ProjectDirs::from("dev", "mnemosyne", "mnemosyne-core")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir)
}

fn model_handle() -> Result<&'static Mutex<TextEmbedding>, String> {
    MODEL
        .get_or_init(|| {
            let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
                .with_cache_dir(cache_dir())
                .with_show_download_progress(false);
            TextEmbedding::try_new(options)
                .map(Mutex::new)
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| e.clone())
}

fn matryoshka_truncate(vector: Vec<f32>, dimension: usize) -> Vec<f32> {
    if vector.len() <= dimension {
        return vector;
    }
    let mut truncated: Vec<f32> = vector.into_iter().take(dimension).collect();
    crate::vector_math::normalize(&mut truncated);
    truncated
}

/// Wraps the process-wide `fastembed::TextEmbedding` model.
pub struct FastEmbedder {
    dimension: usize,
}

impl FastEmbedder {
    /// Builds an embedder truncating the model's native output to
    /// `dimension`. Does not load the model eagerly; the first `embed`
    /// call pays the load cost.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, text: &str, _model_id: &str) -> EmbedResult<Embedding> {
        if text.trim().is_empty() {
            return Err(EmbedError::InvalidInput("text is empty".to_string()));
        }
        if text.len() > MAX_TEXT_LENGTH {
            return Err(EmbedError::InvalidInput(format!(
                "text exceeds max length of {MAX_TEXT_LENGTH} bytes"
            )));
        }

        let dimension = self.dimension;
        let text = Arc::new(text.to_string());
        let vector = tokio::task::spawn_blocking(move || -> Result<Vec<f32>, String> {
            let handle = model_handle()?;
            let mut model = handle.lock().map_err(|e| e.to_string())?;
            let mut embeddings = model
                .embed(vec![text.as_str()], None)
                .map_err(|e| e.to_string())?;
            embeddings
                .pop()
                .ok_or_else(|| "embedder returned no vectors".to_string())
        })
        .await
        .map_err(|e| EmbedError::Unavailable(format!("embedding task panicked: {e}")))?
        .map_err(EmbedError::Unavailable)?;

        let vector = matryoshka_truncate(vector, dimension);
        let tokens_used = (text.len() / 4).max(1) as u32;
        Ok(Embedding { vector, tokens_used })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
