//! Embedding model wrapper for fastembed.
//!
//! Provides a high-level interface for generating embeddings:
//! - A small registry mapping configured model keys to fastembed models
//! - Model download into a configurable cache directory
//! - Batched corpus embedding with a progress bar

use std::path::PathBuf;
use std::sync::Mutex;

use fastembed::{InitOptions, TextEmbedding};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

/// A configured embedding model.
///
/// `key` selects the underlying network, `model_name` names every cached
/// artifact produced with it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub key: String,
    pub model_name: String,
}

impl ModelSpec {
    pub fn new(key: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model_name: model_name.into(),
        }
    }

    /// The five models every run compares.
    pub fn defaults() -> Vec<ModelSpec> {
        vec![
            ModelSpec::new("sbert_short", "SBERT_short"),
            ModelSpec::new("sbert", "SBERT"),
            ModelSpec::new("minilm", "MiniLM"),
            ModelSpec::new("roberta", "RoBERTa"),
            ModelSpec::new("bert", "BERT"),
        ]
    }

    /// SHA-256 of the model name, stored in artifact headers.
    pub fn model_id_hash(&self) -> [u8; 32] {
        model_id_hash(&self.model_name)
    }
}

/// Compute SHA256 hash of a model name for storage identification.
pub fn model_id_hash(model_name: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.finalize().into()
}

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Ragged embedding matrix: row {row} has {got} values, expected {expected}")]
    RaggedMatrix {
        row: usize,
        expected: usize,
        got: usize,
    },
}

/// Dense row-major embedding matrix, one row per profile.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingMatrix {
    dimensions: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    /// Build from a flat buffer; `data.len()` must be a multiple of `dimensions`.
    pub fn from_flat(dimensions: usize, data: Vec<f32>) -> Result<Self, EmbeddingError> {
        if dimensions == 0 || data.len() % dimensions != 0 {
            return Err(EmbeddingError::RaggedMatrix {
                row: data.len() / dimensions.max(1),
                expected: dimensions,
                got: data.len() % dimensions.max(1),
            });
        }
        Ok(Self { dimensions, data })
    }

    pub fn from_rows(dimensions: usize, rows: Vec<Vec<f32>>) -> Result<Self, EmbeddingError> {
        let mut data = Vec::with_capacity(rows.len() * dimensions);
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != dimensions {
                return Err(EmbeddingError::RaggedMatrix {
                    row,
                    expected: dimensions,
                    got: values.len(),
                });
            }
            data.extend(values);
        }
        Self::from_flat(dimensions, data)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn rows(&self) -> usize {
        self.data.len() / self.dimensions
    }

    #[cfg(test)]
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        self.data.chunks_exact(self.dimensions).nth(i)
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimensions)
    }

    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }
}

/// Anything that turns text into fixed-length vectors.
pub trait Embedder {
    /// Model name used to key artifacts.
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn model_id_hash(&self) -> [u8; 32] {
        model_id_hash(self.name())
    }

    /// Embed a whole corpus into a matrix, one row per text.
    fn embed_corpus(&self, texts: &[String]) -> Result<EmbeddingMatrix, EmbeddingError> {
        let rows = self.embed_batch(texts)?;
        EmbeddingMatrix::from_rows(self.dimensions(), rows)
    }
}

/// Creates embedders for configured models.
pub trait EmbedderLoader {
    fn load(&self, spec: &ModelSpec) -> Result<Box<dyn Embedder>, EmbeddingError>;
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
    batch_size: usize,
    show_progress: bool,
}

impl EmbeddingModel {
    /// Create a new embedding model for the given spec.
    ///
    /// The model will be downloaded on first use if not cached.
    /// Models are cached in the `models/` subdirectory of `cache_dir`.
    pub fn new(
        spec: &ModelSpec,
        cache_dir: PathBuf,
        batch_size: usize,
        show_progress: bool,
    ) -> Result<Self, EmbeddingError> {
        let model_enum = Self::parse_model_name(&spec.key)?;

        // Ensure cache directory exists
        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        log::info!("Loading embedding model {} ({})", spec.model_name, spec.key);

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(show_progress);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        // Get model dimensions by embedding a test string
        let dimensions = Self::probe_dimensions(&mut model)?;
        log::debug!("{} produces {}-dim embeddings", spec.model_name, dimensions);

        Ok(Self {
            model: Mutex::new(model),
            model_name: spec.model_name.clone(),
            dimensions,
            batch_size: batch_size.max(1),
            show_progress,
        })
    }

    /// Parse a model key to the fastembed enum.
    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        match name.to_lowercase().as_str() {
            "sbert_short" | "paraphrase-multilingual-minilm-l12-v2" => {
                Ok(fastembed::EmbeddingModel::ParaphraseMLMiniLML12V2)
            }
            "sbert" | "all-minilm-l12-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML12V2),
            "minilm" | "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "roberta" | "paraphrase-multilingual-mpnet-base-v2" => {
                Ok(fastembed::EmbeddingModel::ParaphraseMLMpnetBaseV2)
            }
            "bert" | "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported keys: sbert_short, sbert, minilm, roberta, bert, \
                 bge-small-en-v1.5, bge-large-en-v1.5",
                name
            ))),
        }
    }

    /// Probe the model to determine embedding dimensions.
    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        ) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(format!("embedding with {}", self.model_name));
        bar
    }
}

impl Embedder for EmbeddingModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let bar = self.progress_bar(texts.len());
        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let batch = model
                .embed(chunk.to_vec(), Some(self.batch_size))
                .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
            embeddings.extend(batch);
            bar.inc(chunk.len() as u64);
        }
        bar.finish_and_clear();

        Ok(embeddings)
    }
}

/// Loads fastembed models into a shared cache directory.
pub struct FastEmbedLoader {
    pub cache_dir: PathBuf,
    pub batch_size: usize,
    pub show_progress: bool,
}

impl EmbedderLoader for FastEmbedLoader {
    fn load(&self, spec: &ModelSpec) -> Result<Box<dyn Embedder>, EmbeddingError> {
        let model = EmbeddingModel::new(
            spec,
            self.cache_dir.clone(),
            self.batch_size,
            self.show_progress,
        )?;
        Ok(Box::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Integration tests require model download - run with --ignored
    #[test]
    #[ignore = "requires model download"]
    fn test_model_creation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let spec = ModelSpec::new("minilm", "MiniLM");
        let model = EmbeddingModel::new(&spec, temp_dir.path().to_path_buf(), 16, false).unwrap();

        assert_eq!(model.name(), "MiniLM");
        assert_eq!(model.dimensions(), 384); // MiniLM produces 384-dim embeddings
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_embed_corpus_shape() {
        let temp_dir = tempfile::tempdir().unwrap();
        let spec = ModelSpec::new("minilm", "MiniLM");
        let model = EmbeddingModel::new(&spec, temp_dir.path().to_path_buf(), 2, false).unwrap();

        let texts: Vec<String> = ["fashion blogger", "esports player", "vegan chef"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let matrix = model.embed_corpus(&texts).unwrap();
        assert_eq!(matrix.rows(), 3);
        assert_eq!(matrix.dimensions(), 384);
    }

    #[test]
    fn test_invalid_model_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let spec = ModelSpec::new("nonexistent-model", "Nope");
        let result = EmbeddingModel::new(&spec, temp_dir.path().to_path_buf(), 16, false);
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
    }

    #[test]
    fn test_default_registry_keys_resolve() {
        for spec in ModelSpec::defaults() {
            assert!(
                EmbeddingModel::parse_model_name(&spec.key).is_ok(),
                "key={}",
                spec.key
            );
        }
    }

    #[test]
    fn test_model_id_hash() {
        let a = ModelSpec::new("minilm", "MiniLM").model_id_hash();
        let b = model_id_hash("MiniLM");
        let c = model_id_hash("BERT");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_matrix_from_rows() {
        let matrix = EmbeddingMatrix::from_rows(2, vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(matrix.rows(), 2);
        assert_eq!(matrix.row(1), Some(&[3.0, 4.0][..]));
        assert_eq!(matrix.row(2), None);
        assert_eq!(matrix.as_flat(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_matrix_rejects_ragged_rows() {
        let result = EmbeddingMatrix::from_rows(2, vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(
            result,
            Err(EmbeddingError::RaggedMatrix { row: 1, expected: 2, got: 1 })
        ));
        assert!(EmbeddingMatrix::from_flat(3, vec![0.0; 4]).is_err());
    }
}
