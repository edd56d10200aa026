//! Closed set of embedding models a store can be bound to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Embedding model selected when vector search is initialized.
///
/// Fixes the dimensionality of every vector in a store's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingModelType {
    /// BAAI bge-small-en-v1.5 (384 dims).
    BgeSmall,
    /// E5 multilingual large instruct (1024 dims).
    E5,
    /// GTE ModernBERT base (768 dims).
    Gte,
    /// Offline feature hashing of words and character trigrams (384 dims).
    Hashing,
}

impl EmbeddingModelType {
    pub const ALL: [EmbeddingModelType; 4] = [
        EmbeddingModelType::BgeSmall,
        EmbeddingModelType::E5,
        EmbeddingModelType::Gte,
        EmbeddingModelType::Hashing,
    ];

    pub fn dimensions(self) -> usize {
        match self {
            EmbeddingModelType::BgeSmall => 384,
            EmbeddingModelType::E5 => 1024,
            EmbeddingModelType::Gte => 768,
            EmbeddingModelType::Hashing => 384,
        }
    }

    /// HuggingFace repository (or pseudo id for built-in backends).
    pub fn model_id(self) -> &'static str {
        match self {
            EmbeddingModelType::BgeSmall => "BAAI/bge-small-en-v1.5",
            EmbeddingModelType::E5 => "intfloat/multilingual-e5-large-instruct",
            EmbeddingModelType::Gte => "Alibaba-NLP/gte-modernbert-base",
            EmbeddingModelType::Hashing => "engramdb/feature-hashing",
        }
    }

    /// Short name used in configuration and store metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            EmbeddingModelType::BgeSmall => "bge-small",
            EmbeddingModelType::E5 => "e5",
            EmbeddingModelType::Gte => "gte",
            EmbeddingModelType::Hashing => "hashing",
        }
    }
}

impl fmt::Display for EmbeddingModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingModelType {
    type Err = Error;

    /// Accepts the short name or the model id, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|model| {
                model.as_str().eq_ignore_ascii_case(wanted)
                    || model.model_id().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| Error::Validation(format!("Unknown embedding model: {wanted}")))
    }
}
