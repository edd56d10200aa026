//! Text embedding: pluggable backends behind a normalizing service.
//!
//! `EmbeddingService` validates input, checks backend output against the
//! model's declared dimensions and returns unit-norm `Embedding`s.

mod hashing;
mod model;
mod onnx;
mod vector;

use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::errors::Error;

pub use hashing::HashingBackend;
pub use model::EmbeddingModelType;
pub use onnx::OnnxBackend;
pub use vector::{Embedding, cosine_similarity};

/// Source of raw embedding vectors.
///
/// Implementations must be deterministic: the same text always yields the
/// same vector.
pub trait EmbeddingBackend: Send + Sync {
    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// Produce an unnormalized vector of `dimensions()` values.
    fn embed(&self, text: &str) -> Result<Vec<f32>, Error>;
}

/// Embeds text with one fixed model.
pub struct EmbeddingService {
    model_type: EmbeddingModelType,
    backend: Box<dyn EmbeddingBackend>,
}

impl EmbeddingService {
    /// Create a service for `model_type`, loading model files from `model_cache`.
    ///
    /// The `Hashing` model needs no files; the ONNX models are downloaded on
    /// first use.
    pub fn new(model_type: EmbeddingModelType, model_cache: &Path) -> Result<Self, Error> {
        let backend: Box<dyn EmbeddingBackend> = match model_type {
            EmbeddingModelType::Hashing => Box::new(HashingBackend::new(
                model_type.dimensions(),
                model_type.model_id(),
            )),
            _ => Box::new(OnnxBackend::load(model_type, model_cache)?),
        };
        info!(model = %model_type, dims = model_type.dimensions(), "embedding service ready");
        Ok(Self {
            model_type,
            backend,
        })
    }

    /// Create a service around a caller-supplied backend.
    ///
    /// # Errors
    ///
    /// Returns `Error::DimensionMismatch` if the backend's dimensions differ
    /// from those of `model_type`.
    pub fn with_backend(
        model_type: EmbeddingModelType,
        backend: Box<dyn EmbeddingBackend>,
    ) -> Result<Self, Error> {
        if backend.dimensions() != model_type.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: model_type.dimensions(),
                actual: backend.dimensions(),
            });
        }
        Ok(Self {
            model_type,
            backend,
        })
    }

    pub fn model_type(&self) -> EmbeddingModelType {
        self.model_type
    }

    pub fn get_model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn get_dimensions(&self) -> usize {
        self.model_type.dimensions()
    }

    /// Embed a single text into a unit-norm vector.
    ///
    /// # Errors
    ///
    /// - `Error::Embedding` for empty input, non-finite output or backend failure
    /// - `Error::DimensionMismatch` if the backend returns the wrong length
    pub fn embed_text(&self, text: &str) -> Result<Embedding, Error> {
        if text.trim().is_empty() {
            return Err(Error::Embedding("Cannot embed empty text".to_string()));
        }

        let vector = self.backend.embed(text)?;
        if vector.len() != self.get_dimensions() {
            return Err(Error::DimensionMismatch {
                expected: self.get_dimensions(),
                actual: vector.len(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(Error::Embedding(
                "Backend produced NaN or infinite values".to_string(),
            ));
        }

        let mut embedding = Embedding::new(vector, self.get_model_name());
        embedding.normalize();
        Ok(embedding)
    }

    /// Embed many texts in parallel, preserving input order.
    ///
    /// # Errors
    ///
    /// If any item fails, returns `Error::EmbeddingBatch` naming the lowest
    /// failing index; no partial output is returned.
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, Error> {
        debug!(count = texts.len(), "embedding batch");
        let results: Vec<Result<Embedding, Error>> =
            texts.par_iter().map(|text| self.embed_text(text)).collect();

        results
            .into_iter()
            .enumerate()
            .map(|(index, result)| {
                result.map_err(|e| Error::EmbeddingBatch {
                    index,
                    message: e.to_string(),
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("model_type", &self.model_type)
            .field("model_name", &self.get_model_name())
            .finish()
    }
}
