//! Dense embedding vectors and cosine similarity.

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// A fixed-dimension vector produced by one embedding model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    vector: Vec<f32>,
    model: String,
}

impl Embedding {
    pub fn new(vector: Vec<f32>, model: impl Into<String>) -> Self {
        Self {
            vector,
            model: model.into(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.vector
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.vector
    }

    /// L2 norm, accumulated in f64.
    pub fn norm(&self) -> f64 {
        l2_norm(&self.vector)
    }

    pub fn is_normalized(&self) -> bool {
        (self.norm() - 1.0).abs() < 1e-5
    }

    /// Scale to unit L2 norm in place.
    ///
    /// A zero vector has no direction and is left unchanged; this is not an error.
    pub fn normalize(&mut self) {
        let norm = self.norm();
        if norm == 0.0 {
            return;
        }
        for value in self.vector.iter_mut() {
            *value = (*value as f64 / norm) as f32;
        }
    }

    /// Cosine similarity in [-1.0, 1.0].
    ///
    /// # Errors
    ///
    /// Returns `Error::DimensionMismatch` if the embeddings differ in length.
    pub fn cosine_similarity(&self, other: &Embedding) -> Result<f64, Error> {
        cosine_similarity(&self.vector, &other.vector)
    }

    pub(crate) fn ensure_finite(&self) -> Result<(), Error> {
        if self.vector.iter().any(|x| !x.is_finite()) {
            return Err(Error::Validation(
                "Embedding contains NaN or infinite values".to_string(),
            ));
        }
        Ok(())
    }
}

fn l2_norm(vec: &[f32]) -> f64 {
    vec.iter().map(|&x| (x as f64).powi(2)).sum::<f64>().sqrt()
}

/// Compute cosine similarity between two vectors.
///
/// Either side being the zero vector yields 0.0. The result is clamped to
/// [-1.0, 1.0] to absorb rounding.
///
/// # Errors
///
/// Returns `Error::DimensionMismatch` if the slices have different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, Error> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}
