//! Search operations on the engram database (vector, hybrid and keyword).

use crate::errors::Error;
use crate::query::{HybridOptions, QueryEngine, QueryFilter};
use crate::types::{EngramId, HybridHit, Relation, ScoredEngram};

use super::store::EngramDb;

impl EngramDb {
    #[must_use = "handle the error or results may be lost"]
    /// Find the `k` engrams most similar to `text`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Vector search is not initialized
    /// - `k` is 0 or exceeds MAX_SEARCH_LIMIT
    /// - Query is empty or exceeds 100,000 bytes
    /// - Embedding generation fails
    pub fn query_by_text(&self, text: &str, k: usize) -> Result<Vec<ScoredEngram>, Error> {
        let state = self.vector_state()?;
        QueryEngine::new(&self.records, &state.embedder, state.index.as_ref())
            .query_by_text(text, k)
    }

    #[must_use = "handle the error or results may be lost"]
    /// Like `query_by_text`, returning only hits accepted by `filter`.
    pub fn query_filtered(
        &self,
        text: &str,
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredEngram>, Error> {
        let state = self.vector_state()?;
        QueryEngine::new(&self.records, &state.embedder, state.index.as_ref())
            .query_filtered(text, k, filter)
    }

    #[must_use = "handle the error or results may be lost"]
    /// Vector search expanded one hop along connections.
    ///
    /// `graph_weight` in `options` decides how much of a hit's similarity a
    /// connected engram inherits.
    pub fn query_hybrid(
        &self,
        text: &str,
        k: usize,
        options: &HybridOptions,
    ) -> Result<Vec<HybridHit>, Error> {
        let state = self.vector_state()?;
        QueryEngine::new(&self.records, &state.embedder, state.index.as_ref())
            .query_hybrid(text, k, options)
    }

    /// Hybrid options using the configured graph weight.
    pub fn hybrid_options(&self, relation: Option<Relation>) -> HybridOptions {
        HybridOptions {
            relation,
            graph_weight: self.config.graph_weight,
            ..HybridOptions::default()
        }
    }

    #[must_use = "handle the error or results may be lost"]
    /// The `k` engrams most similar to a stored one, excluding itself.
    pub fn similar_to(&self, id: EngramId, k: usize) -> Result<Vec<ScoredEngram>, Error> {
        let state = self.vector_state()?;
        QueryEngine::new(&self.records, &state.embedder, state.index.as_ref()).similar_to(id, k)
    }

    #[must_use = "handle the error or results may be lost"]
    /// Keyword (BM25) search over engram content.
    ///
    /// Works without vector search. Scores are BM25 relevance, higher is
    /// better.
    pub fn search_keywords(&self, text: &str, limit: usize) -> Result<Vec<ScoredEngram>, Error> {
        let mut results = Vec::new();
        for (id, score) in self.records.search_keywords(text, limit)? {
            match self.records.get_engram(id) {
                Ok(engram) => results.push(ScoredEngram { engram, score }),
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }
}
