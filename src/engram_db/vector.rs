//! Vector search lifecycle: initialization, model binding, index rebuilds.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::embedding::{Embedding, EmbeddingBackend, EmbeddingModelType, EmbeddingService};
use crate::errors::Error;
use crate::index::{FlatIndex, VectorIndex};
use crate::types::EngramId;

use super::store::{EngramDb, VectorState};

/// Result of an `init_vector_search*` call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitOutcome {
    /// Vector search was set up by this call.
    Initialized,
    /// Vector search was already running with the requested model.
    AlreadyInitialized,
}

impl EngramDb {
    /// Enable vector search with the given embedding model.
    ///
    /// The first successful call binds the store to `model_type`, and the
    /// binding is persisted. The index is rebuilt from stored embeddings;
    /// engrams without one are embedded now.
    ///
    /// # Errors
    ///
    /// - `Error::AlreadyInitialized` if the store is bound to another model,
    ///   in this process or a previous one
    /// - Embedding errors if the model cannot be loaded or an engram fails to embed
    pub fn init_vector_search(&self, model_type: EmbeddingModelType) -> Result<InitOutcome, Error> {
        let model_cache = self.config.model_cache.clone();
        self.init_with(model_type, move || {
            EmbeddingService::new(model_type, &model_cache)
        })
    }

    /// Like `init_vector_search`, embedding with a caller-supplied backend.
    pub fn init_vector_search_with_backend(
        &self,
        model_type: EmbeddingModelType,
        backend: Box<dyn EmbeddingBackend>,
    ) -> Result<InitOutcome, Error> {
        self.init_with(model_type, move || {
            EmbeddingService::with_backend(model_type, backend)
        })
    }

    /// Initialize with the model named in the configuration.
    pub fn init_vector_search_from_config(&self) -> Result<InitOutcome, Error> {
        self.init_vector_search(self.config.embedding_model_type()?)
    }

    fn init_with(
        &self,
        model_type: EmbeddingModelType,
        make_service: impl FnOnce() -> Result<EmbeddingService, Error>,
    ) -> Result<InitOutcome, Error> {
        let mut slot = self.write_vector()?;

        if let Some(state) = slot.as_ref() {
            let current = state.embedder.model_type();
            if current == model_type {
                return Ok(InitOutcome::AlreadyInitialized);
            }
            return Err(Error::AlreadyInitialized {
                current,
                requested: model_type,
            });
        }

        if let Some(bound) = self.records.bound_model()? {
            let current: EmbeddingModelType = bound.parse()?;
            if current != model_type {
                return Err(Error::AlreadyInitialized {
                    current,
                    requested: model_type,
                });
            }
        }

        let embedder = make_service()?;
        let index = self.build_index(&embedder, false)?;
        self.records.bind_model(model_type.as_str())?;

        *slot = Some(Arc::new(VectorState {
            embedder: Arc::new(embedder),
            index: Arc::new(index),
        }));

        info!(model = %model_type, "vector search initialized");
        Ok(InitOutcome::Initialized)
    }

    /// Build a fresh index from persisted embeddings, embedding whatever is
    /// missing. Every pending text is embedded before anything is written.
    ///
    /// With `recompute` set, every engram is embedded afresh.
    fn build_index(
        &self,
        embedder: &EmbeddingService,
        recompute: bool,
    ) -> Result<FlatIndex, Error> {
        let index = FlatIndex::new(embedder.get_dimensions());

        let mut reused: HashSet<EngramId> = HashSet::new();
        if !recompute {
            for (id, embedding) in self.records.embeddings_for_model(embedder.get_model_name())? {
                if embedding.dimensions() != index.dimensions() {
                    warn!(
                        %id,
                        dims = embedding.dimensions(),
                        "ignoring stored embedding with wrong dimensions"
                    );
                    continue;
                }
                index.insert(id, &embedding)?;
                reused.insert(id);
            }
        }

        let pending: Vec<_> = self
            .records
            .list_engrams()?
            .into_iter()
            .filter_map(|engram| engram.id.map(|id| (id, engram.content)))
            .filter(|(id, _)| !reused.contains(id))
            .collect();

        let stale = self.records.stats()?.embeddings.saturating_sub(reused.len());
        if !recompute && stale > 0 {
            warn!(count = stale, "re-embedding engrams stored with another model");
        }

        let texts: Vec<&str> = pending.iter().map(|(_, content)| content.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts)?;

        let mut embedded = 0;
        for ((id, _), embedding) in pending.iter().zip(&embeddings) {
            match self.records.put_embedding(*id, embedding) {
                Ok(()) => {}
                Err(Error::NotFound(_)) => {
                    debug!(%id, "engram deleted while embedding; skipped");
                    continue;
                }
                Err(e) => return Err(e),
            }
            index.insert(*id, embedding)?;
            embedded += 1;
        }

        info!(reused = reused.len(), embedded, "vector index built");
        Ok(index)
    }

    /// Bring `index` in line with records written after it was built.
    fn reconcile(&self, index: &FlatIndex, model_name: &str) -> Result<(), Error> {
        for id in index.ids()? {
            if !self.records.contains_engram(id)? {
                index.remove(id)?;
            }
        }
        for engram in self.records.list_engrams()? {
            let Some(id) = engram.id else { continue };
            if index.contains(id)? {
                continue;
            }
            match self.records.get_embedding(id)? {
                Some(embedding)
                    if embedding.model() == model_name
                        && embedding.dimensions() == index.dimensions() =>
                {
                    index.insert(id, &embedding)?;
                }
                _ => warn!(%id, "engram has no usable embedding after reindex"),
            }
        }
        Ok(())
    }

    pub fn is_vector_search_initialized(&self) -> Result<bool, Error> {
        Ok(self.read_vector()?.is_some())
    }

    /// Model vector search runs with, if initialized.
    pub fn vector_model(&self) -> Result<Option<EmbeddingModelType>, Error> {
        Ok(self
            .read_vector()?
            .as_ref()
            .map(|state| state.embedder.model_type()))
    }

    /// The active embedding service.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized` before vector search is initialized.
    pub fn embedding_service(&self) -> Result<Arc<EmbeddingService>, Error> {
        Ok(Arc::clone(&self.vector_state()?.embedder))
    }

    pub fn embed_text(&self, text: &str) -> Result<Embedding, Error> {
        self.vector_state()?.embedder.embed_text(text)
    }

    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, Error> {
        self.vector_state()?.embedder.embed_batch(texts)
    }

    /// Re-embed every engram and rebuild the index. Returns the number indexed.
    ///
    /// The new index replaces the live one only once every engram has been
    /// embedded and persisted; on failure the current index keeps serving.
    pub fn reindex(&self) -> Result<usize, Error> {
        let state = self.vector_state()?;
        let index = self.build_index(&state.embedder, true)?;

        let mut slot = self.write_vector()?;
        self.reconcile(&index, state.embedder.get_model_name())?;
        let count = index.len()?;
        *slot = Some(Arc::new(VectorState {
            embedder: Arc::clone(&state.embedder),
            index: Arc::new(index),
        }));

        info!(count, "vector index swapped in");
        Ok(count)
    }

    /// Embed one stored engram again and refresh its index entry.
    pub fn index_engram(&self, id: EngramId) -> Result<(), Error> {
        let state = self.vector_state()?;
        let engram = self.records.get_engram(id)?;
        let embedding = state.embedder.embed_text(&engram.content)?;
        self.records.put_embedding(id, &embedding)?;
        state.index.insert(id, &embedding)
    }
}
