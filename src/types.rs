//! Record types stored by engramdb.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form string metadata attached to an engram.
pub type Metadata = HashMap<String, String>;

/// Identifier of a stored engram, assigned by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngramId(u64);

/// Identifier of a stored connection, assigned by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

macro_rules! sequence_id {
    ($name:ident) => {
        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

sequence_id!(EngramId);
sequence_id!(ConnectionId);

/// Label of a connection such as "causes" or "supports".
///
/// The vocabulary is open: any non-empty label is accepted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Relation(String);

impl Relation {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Relation {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for Relation {
    fn from(label: String) -> Self {
        Self(label)
    }
}

/// A unit of content with provenance and confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Engram {
    /// Assigned by `add_engram`; `None` while the engram only lives in memory.
    pub id: Option<EngramId>,
    pub content: String,
    pub source: String,
    /// Certainty in [0.0, 1.0].
    pub confidence: f64,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Engram {
    pub fn new(content: impl Into<String>, source: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: None,
            content: content.into(),
            source: source.into(),
            confidence,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A directed, typed, weighted edge between two engrams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Assigned by `add_connection`.
    pub id: Option<ConnectionId>,
    pub from_id: EngramId,
    pub to_id: EngramId,
    pub relation: Relation,
    /// Strength of the relation in [0.0, 1.0].
    pub weight: f64,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(
        from_id: EngramId,
        to_id: EngramId,
        relation: impl Into<Relation>,
        weight: f64,
    ) -> Self {
        Self {
            id: None,
            from_id,
            to_id,
            relation: relation.into(),
            weight,
            created_at: Utc::now(),
        }
    }
}

/// Which connections to follow from an engram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
    Both,
}

/// A hydrated engram with the relevance score that ranked it.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredEngram {
    pub engram: Engram,
    /// Cosine similarity for vector search, BM25 relevance for keyword search.
    pub score: f64,
}

/// Result of a hybrid (vector + graph) query.
#[derive(Debug, Clone, Serialize)]
pub struct HybridHit {
    pub engram: Engram,
    /// Fused score used for ranking.
    pub score: f64,
    /// Cosine similarity when the engram was itself a vector candidate.
    pub vector_score: Option<f64>,
    /// Connection that contributed the winning graph score, if any.
    pub via: Option<ConnectionId>,
}

/// Record counts reported by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub engrams: usize,
    pub connections: usize,
    pub embeddings: usize,
}
