//! Query orchestration: embed, search the vector index, hydrate, rank.
//!
//! `QueryEngine` borrows its collaborators and holds no state of its own.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::{Embedding, EmbeddingService};
use crate::errors::Error;
use crate::index::VectorIndex;
use crate::records::{RecordStore, validate_input_length};
use crate::sqlite::fts::validate_limit;
use crate::types::{
    Connection, ConnectionId, Direction, Engram, EngramId, HybridHit, Relation, ScoredEngram,
};

/// Maximum allowed candidate pool size for hybrid search to prevent DoS.
const MAX_CANDIDATE_POOL: usize = 10_000;

/// Default share of a seed's similarity passed along one connection.
pub const DEFAULT_GRAPH_WEIGHT: f64 = 0.5;

/// Conditions a result must meet to be returned.
///
/// Record conditions (`source`, `min_confidence`, `metadata`) are checked
/// against the hydrated engram. `min_score` cuts off at the ranking score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryFilter {
    /// Exact match on `Engram::source`.
    pub source: Option<String>,
    pub min_confidence: Option<f64>,
    /// Every pair must be present in the engram's metadata.
    pub metadata: BTreeMap<String, String>,
    pub min_score: Option<f64>,
}

impl QueryFilter {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Whether any record condition is set.
    fn restricts_records(&self) -> bool {
        self.source.is_some() || self.min_confidence.is_some() || !self.metadata.is_empty()
    }

    pub fn matches(&self, engram: &Engram) -> bool {
        self.source.as_ref().is_none_or(|source| *source == engram.source)
            && self.min_confidence.is_none_or(|min| engram.confidence >= min)
            && self
                .metadata
                .iter()
                .all(|(key, value)| engram.metadata.get(key) == Some(value))
    }

    fn accepts_score(&self, score: f64) -> bool {
        self.min_score.is_none_or(|min| score >= min)
    }

    fn validate(&self) -> Result<(), Error> {
        if let Some(min) = self.min_confidence {
            if !min.is_finite() || !(0.0..=1.0).contains(&min) {
                return Err(Error::Validation(format!(
                    "Minimum confidence must be within [0.0, 1.0], got {min}"
                )));
            }
        }
        if let Some(min) = self.min_score {
            if !min.is_finite() {
                return Err(Error::Validation(format!(
                    "Minimum score must be finite, got {min}"
                )));
            }
        }
        Ok(())
    }
}

/// How a hybrid query expands vector hits along the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridOptions {
    /// Only follow connections with this label; all labels when `None`.
    pub relation: Option<Relation>,
    pub direction: Direction,
    /// Scale in [0.0, 1.0] applied to scores propagated over an edge.
    pub graph_weight: f64,
    /// Applied to returned hits; filtered-out seeds still propagate.
    pub filter: QueryFilter,
}

impl Default for HybridOptions {
    fn default() -> Self {
        Self {
            relation: None,
            direction: Direction::Outgoing,
            graph_weight: DEFAULT_GRAPH_WEIGHT,
            filter: QueryFilter::default(),
        }
    }
}

impl HybridOptions {
    pub fn with_relation(mut self, relation: impl Into<Relation>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_graph_weight(mut self, graph_weight: f64) -> Self {
        self.graph_weight = graph_weight;
        self
    }

    pub fn with_filter(mut self, filter: QueryFilter) -> Self {
        self.filter = filter;
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if !self.graph_weight.is_finite() || !(0.0..=1.0).contains(&self.graph_weight) {
            return Err(Error::Validation(format!(
                "Graph weight must be within [0.0, 1.0], got {}",
                self.graph_weight
            )));
        }
        self.filter.validate()
    }
}

/// Scores gathered for one engram during hybrid expansion.
struct Candidate {
    /// Seed rank for vector hits, discovery position for graph-only ones.
    order: usize,
    vector: Option<f64>,
    graph: Option<(f64, ConnectionId)>,
}

impl Candidate {
    fn combined(&self) -> f64 {
        match (self.vector, self.graph) {
            (Some(v), Some((g, _))) => v.max(g),
            (Some(v), None) => v,
            (None, Some((g, _))) => g,
            (None, None) => 0.0,
        }
    }

    /// Connection credited when the graph term decides the score.
    fn via(&self) -> Option<ConnectionId> {
        match (self.vector, self.graph) {
            (Some(v), Some((g, id))) if g > v => Some(id),
            (None, Some((_, id))) => Some(id),
            _ => None,
        }
    }
}

pub struct QueryEngine<'a> {
    store: &'a RecordStore,
    embedder: &'a EmbeddingService,
    index: &'a dyn VectorIndex,
}

impl<'a> QueryEngine<'a> {
    pub fn new(
        store: &'a RecordStore,
        embedder: &'a EmbeddingService,
        index: &'a dyn VectorIndex,
    ) -> Self {
        Self {
            store,
            embedder,
            index,
        }
    }

    fn embed_query(&self, text: &str) -> Result<Embedding, Error> {
        let text = text.trim();
        validate_input_length(text)?;
        self.embedder.embed_text(text)
    }

    fn hydrate(&self, id: EngramId) -> Result<Option<Engram>, Error> {
        match self.store.get_engram(id) {
            Ok(engram) => Ok(Some(engram)),
            Err(Error::NotFound(_)) => {
                debug!(%id, "indexed engram missing from store, skipping");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[must_use = "handle the error or results may be lost"]
    /// Find the `k` engrams whose content is most similar to `text`.
    ///
    /// Index entries whose record has gone are skipped, so fewer than `k`
    /// results may come back.
    ///
    /// # Errors
    ///
    /// Returns error if `k` is 0 or above `MAX_SEARCH_LIMIT`, the text is
    /// empty or too long, or embedding fails.
    pub fn query_by_text(&self, text: &str, k: usize) -> Result<Vec<ScoredEngram>, Error> {
        self.query_filtered(text, k, &QueryFilter::default())
    }

    #[must_use = "handle the error or results may be lost"]
    /// `query_by_text` keeping only hits accepted by `filter`.
    ///
    /// With record conditions set the whole index is ranked, so matching
    /// engrams are found however far down they sit.
    pub fn query_filtered(
        &self,
        text: &str,
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredEngram>, Error> {
        validate_limit(k)?;
        filter.validate()?;
        let query = self.embed_query(text)?;

        let fetch = if filter.restricts_records() {
            self.index.len()?.max(k)
        } else {
            k
        };

        let mut results = Vec::with_capacity(k);
        for (id, score) in self.index.knn(&query, fetch)? {
            if results.len() == k || !filter.accepts_score(score) {
                break;
            }
            if let Some(engram) = self.hydrate(id)? {
                if filter.matches(&engram) {
                    results.push(ScoredEngram { engram, score });
                }
            }
        }
        Ok(results)
    }

    #[must_use = "handle the error or results may be lost"]
    /// Vector search expanded one hop along the connection graph.
    ///
    /// A candidate pool of nearest neighbors seeds the search. Each seed
    /// `s` passes `graph_weight * max(score(s), 0) * weight(e)` along every
    /// matching connection `e`; an engram keeps the larger of its own
    /// similarity and the best score passed to it. Equal scores rank seeds
    /// first by similarity rank, then graph-only engrams in discovery order.
    pub fn query_hybrid(
        &self,
        text: &str,
        k: usize,
        options: &HybridOptions,
    ) -> Result<Vec<HybridHit>, Error> {
        validate_limit(k)?;
        options.validate()?;
        let query = self.embed_query(text)?;

        let mut candidate_pool = k.saturating_mul(10).clamp(50, MAX_CANDIDATE_POOL);
        if options.filter.restricts_records() {
            candidate_pool = self.index.len()?.clamp(candidate_pool, MAX_CANDIDATE_POOL);
        }
        let seeds = self.index.knn(&query, candidate_pool)?;

        let mut candidates: HashMap<EngramId, Candidate> = HashMap::with_capacity(seeds.len());
        for (order, (id, score)) in seeds.iter().enumerate() {
            candidates.insert(
                *id,
                Candidate {
                    order,
                    vector: Some(*score),
                    graph: None,
                },
            );
        }

        let mut discovered = seeds.len();
        for (seed, seed_score) in &seeds {
            let propagated = options.graph_weight * seed_score.max(0.0);
            for (neighbor, connection) in self.neighbors(*seed, options)? {
                let Some(connection_id) = connection.id else {
                    continue;
                };
                let score = propagated * connection.weight;
                let candidate = candidates.entry(neighbor).or_insert_with(|| {
                    discovered += 1;
                    Candidate {
                        order: discovered,
                        vector: None,
                        graph: None,
                    }
                });
                if candidate.graph.is_none_or(|(best, _)| score > best) {
                    candidate.graph = Some((score, connection_id));
                }
            }
        }

        let mut ranked: Vec<(EngramId, Candidate)> = candidates.into_iter().collect();
        ranked.sort_by(|(_, a), (_, b)| {
            b.combined()
                .total_cmp(&a.combined())
                .then(a.order.cmp(&b.order))
        });

        let mut hits = Vec::with_capacity(k);
        for (id, candidate) in ranked {
            if hits.len() == k || !options.filter.accepts_score(candidate.combined()) {
                break;
            }
            if let Some(engram) = self.hydrate(id)? {
                if !options.filter.matches(&engram) {
                    continue;
                }
                hits.push(HybridHit {
                    engram,
                    score: candidate.combined(),
                    vector_score: candidate.vector,
                    via: candidate.via(),
                });
            }
        }

        debug!(seeds = seeds.len(), returned = hits.len(), "hybrid query");
        Ok(hits)
    }

    /// Neighbors of `id` reachable over one matching connection.
    fn neighbors(
        &self,
        id: EngramId,
        options: &HybridOptions,
    ) -> Result<Vec<(EngramId, Connection)>, Error> {
        let mut neighbors = Vec::new();
        if matches!(options.direction, Direction::Outgoing | Direction::Both) {
            for connection in self.store.connections_from(id)? {
                neighbors.push((connection.to_id, connection));
            }
        }
        if matches!(options.direction, Direction::Incoming | Direction::Both) {
            for connection in self.store.connections_to(id)? {
                neighbors.push((connection.from_id, connection));
            }
        }
        if let Some(relation) = &options.relation {
            neighbors.retain(|(_, connection)| connection.relation == *relation);
        }
        Ok(neighbors)
    }

    #[must_use = "handle the error or results may be lost"]
    /// The `k` engrams most similar to a stored engram, excluding itself.
    ///
    /// Uses the persisted embedding when it came from the active model,
    /// otherwise embeds the content.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the engram does not exist.
    pub fn similar_to(&self, id: EngramId, k: usize) -> Result<Vec<ScoredEngram>, Error> {
        validate_limit(k)?;
        let engram = self.store.get_engram(id)?;

        let embedding = match self.store.get_embedding(id)? {
            Some(stored) if stored.model() == self.embedder.get_model_name() => stored,
            _ => self.embedder.embed_text(&engram.content)?,
        };

        let mut results = Vec::with_capacity(k);
        for (hit, score) in self.index.knn(&embedding, k.saturating_add(1))? {
            if hit == id || results.len() == k {
                continue;
            }
            if let Some(engram) = self.hydrate(hit)? {
                results.push(ScoredEngram { engram, score });
            }
        }
        Ok(results)
    }
}
