//! Record operations on the engram database.

use tracing::{debug, warn};

use crate::errors::Error;
use crate::records::validate_engram;
use crate::types::{Connection, ConnectionId, Engram, EngramId, Relation, StoreStats};

use super::store::EngramDb;

impl EngramDb {
    #[must_use = "handle the error or results may be lost"]
    /// Store a new engram and set its `id`.
    ///
    /// When vector search is initialized the content is embedded first. If
    /// embedding, persisting the vector or indexing it fails, nothing stays
    /// stored; the id is consumed all the same.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The engram already has an id
    /// - Content is empty or exceeds 100,000 bytes
    /// - Confidence is outside [0.0, 1.0]
    /// - Embedding generation fails
    /// - Database operations fail
    pub fn add_engram(&self, engram: &mut Engram) -> Result<EngramId, Error> {
        validate_engram(engram)?;

        // Held until the record is indexed so initialization cannot miss it.
        let slot = self.read_vector()?;
        let embedded = match slot.as_ref() {
            Some(state) => Some((state, state.embedder.embed_text(&engram.content)?)),
            None => None,
        };

        let id = self.records.add_engram(engram)?;
        if let Some((state, embedding)) = embedded {
            let indexed = self
                .records
                .put_embedding(id, &embedding)
                .and_then(|()| state.index.insert(id, &embedding));
            if let Err(e) = indexed {
                warn!(%id, error = %e, "rolling back engram that could not be indexed");
                self.records.delete_engram(id)?;
                engram.id = None;
                return Err(e);
            }
        }
        Ok(id)
    }

    #[must_use = "handle the error or results may be lost"]
    /// Get a specific engram by ID.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the engram doesn't exist.
    pub fn get_engram(&self, id: EngramId) -> Result<Engram, Error> {
        self.records.get_engram(id)
    }

    pub fn contains_engram(&self, id: EngramId) -> Result<bool, Error> {
        self.records.contains_engram(id)
    }

    #[must_use = "handle the error or results may be lost"]
    /// All engrams, ascending id.
    pub fn list_engrams(&self) -> Result<Vec<Engram>, Error> {
        self.records.list_engrams()
    }

    pub fn engram_count(&self) -> Result<usize, Error> {
        self.records.engram_count()
    }

    pub fn update_metadata(
        &self,
        id: EngramId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), Error> {
        self.records.update_metadata(id, key, value)
    }

    pub fn remove_metadata(&self, id: EngramId, key: &str) -> Result<Option<String>, Error> {
        self.records.remove_metadata(id, key)
    }

    #[must_use = "handle the error or results may be lost"]
    /// Delete an engram, its connections, its stored embedding and its index
    /// entry. Returns the ids of the removed connections.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the engram doesn't exist.
    pub fn delete_engram(&self, id: EngramId) -> Result<Vec<ConnectionId>, Error> {
        let slot = self.read_vector()?;
        let removed = self.records.delete_engram(id)?;
        if let Some(state) = slot.as_ref() {
            state.index.remove(id)?;
        }
        debug!(%id, "engram removed from database");
        Ok(removed)
    }

    #[must_use = "handle the error or results may be lost"]
    /// Store a new connection and set its `id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidReference` if either endpoint doesn't exist.
    pub fn add_connection(&self, connection: &mut Connection) -> Result<ConnectionId, Error> {
        self.records.add_connection(connection)
    }

    pub fn get_connection(&self, id: ConnectionId) -> Result<Connection, Error> {
        self.records.get_connection(id)
    }

    pub fn delete_connection(&self, id: ConnectionId) -> Result<(), Error> {
        self.records.delete_connection(id)
    }

    pub fn connections_from(&self, id: EngramId) -> Result<Vec<Connection>, Error> {
        self.records.connections_from(id)
    }

    pub fn connections_to(&self, id: EngramId) -> Result<Vec<Connection>, Error> {
        self.records.connections_to(id)
    }

    /// Engrams reachable from `start` over outgoing connections, with depth.
    pub fn traverse(
        &self,
        start: EngramId,
        max_depth: usize,
        relation: Option<&Relation>,
    ) -> Result<Vec<(EngramId, usize)>, Error> {
        self.records.traverse(start, max_depth, relation)
    }

    /// Simple paths between two engrams over outgoing connections.
    pub fn find_paths(
        &self,
        from: EngramId,
        to: EngramId,
        max_depth: usize,
    ) -> Result<Vec<Vec<EngramId>>, Error> {
        self.records.find_paths(from, to, max_depth)
    }

    pub fn stats(&self) -> Result<StoreStats, Error> {
        self.records.stats()
    }
}
