//! Durable record store for engrams, connections and their embeddings.
//!
//! SQLite is the source of truth. All records are also held in an in-memory
//! read cache so lookups and graph walks never touch SQL. Writers take the
//! database mutex first and the cache lock second.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::embedding::Embedding;
use crate::errors::Error;
use crate::sqlite::Database;
use crate::types::{Connection, ConnectionId, Engram, EngramId, Relation, StoreStats};

/// Maximum allowed content length in bytes.
pub const MAX_INPUT_LENGTH: usize = 100_000;

/// Upper bound on paths returned by `find_paths`.
pub const MAX_PATHS: usize = 1_000;

const BOUND_MODEL_KEY: &str = "bound_model";

#[derive(Default)]
struct Cache {
    engrams: BTreeMap<EngramId, Engram>,
    connections: BTreeMap<ConnectionId, Connection>,
    outgoing: HashMap<EngramId, BTreeSet<ConnectionId>>,
    incoming: HashMap<EngramId, BTreeSet<ConnectionId>>,
}

impl Cache {
    fn link(&mut self, id: ConnectionId, connection: Connection) {
        self.outgoing.entry(connection.from_id).or_default().insert(id);
        self.incoming.entry(connection.to_id).or_default().insert(id);
        self.connections.insert(id, connection);
    }

    fn unlink(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        if let Some(ids) = self.outgoing.get_mut(&connection.from_id) {
            ids.remove(&id);
        }
        if let Some(ids) = self.incoming.get_mut(&connection.to_id) {
            ids.remove(&id);
        }
        Some(connection)
    }

    fn adjacent(&self, ids: Option<&BTreeSet<ConnectionId>>) -> Vec<Connection> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.connections.get(id).cloned())
            .collect()
    }
}

/// Validate input length (rejects empty and whitespace-only inputs).
pub(crate) fn validate_input_length(text: &str) -> Result<(), Error> {
    if text.trim().is_empty() {
        return Err(Error::Validation("Input cannot be empty".to_string()));
    }
    if text.len() > MAX_INPUT_LENGTH {
        return Err(Error::Validation(format!(
            "Input too long: {} bytes exceeds maximum of {}",
            text.len(),
            MAX_INPUT_LENGTH
        )));
    }
    Ok(())
}

fn validate_unit_interval(name: &str, value: f64) -> Result<(), Error> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(Error::Validation(format!(
            "{} must be within [0.0, 1.0], got {}",
            name, value
        )));
    }
    Ok(())
}

/// Check an engram is new and its fields are in range.
pub(crate) fn validate_engram(engram: &Engram) -> Result<(), Error> {
    if let Some(id) = engram.id {
        return Err(Error::Validation(format!("Engram already stored with id {id}")));
    }
    validate_input_length(&engram.content)?;
    validate_unit_interval("Confidence", engram.confidence)
}

fn collect_paths(
    cache: &Cache,
    target: EngramId,
    depth_left: usize,
    current: &mut Vec<EngramId>,
    paths: &mut Vec<Vec<EngramId>>,
) {
    let Some(&at) = current.last() else {
        return;
    };
    if at == target {
        paths.push(current.clone());
        return;
    }
    if depth_left == 0 {
        return;
    }
    for connection in cache.adjacent(cache.outgoing.get(&at)) {
        if paths.len() >= MAX_PATHS {
            return;
        }
        if current.contains(&connection.to_id) {
            continue;
        }
        current.push(connection.to_id);
        collect_paths(cache, target, depth_left - 1, current, paths);
        current.pop();
    }
}

/// Persistent store of engrams and connections.
pub struct RecordStore {
    db: Mutex<Database>,
    cache: RwLock<Cache>,
}

impl RecordStore {
    /// Open or create the store at `path` and load all records into memory.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or a stored record is corrupt.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let db = Database::open(path)?;

        let mut cache = Cache::default();
        for engram in db.list_engrams()? {
            if let Some(id) = engram.id {
                cache.engrams.insert(id, engram);
            }
        }
        for connection in db.list_connections()? {
            if let Some(id) = connection.id {
                cache.link(id, connection);
            }
        }

        info!(
            path = %path.display(),
            engrams = cache.engrams.len(),
            connections = cache.connections.len(),
            "opened record store"
        );

        Ok(Self {
            db: Mutex::new(db),
            cache: RwLock::new(cache),
        })
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>, Error> {
        self.db
            .lock()
            .map_err(|e| Error::Lock(format!("record store database: {e}")))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Cache>, Error> {
        self.cache
            .read()
            .map_err(|e| Error::Lock(format!("record store cache: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Cache>, Error> {
        self.cache
            .write()
            .map_err(|e| Error::Lock(format!("record store cache: {e}")))
    }

    /// Persist a new engram and assign its id.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the engram already has an id, its
    /// content is empty or too long, or its confidence is outside [0, 1].
    pub fn add_engram(&self, engram: &mut Engram) -> Result<EngramId, Error> {
        validate_engram(engram)?;

        let db = self.db()?;
        let id = db.insert_engram(engram)?;
        engram.id = Some(id);
        self.write()?.engrams.insert(id, engram.clone());

        debug!(%id, source = %engram.source, "stored engram");
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `Error::NotFound` if no engram has this id.
    pub fn get_engram(&self, id: EngramId) -> Result<Engram, Error> {
        self.read()?
            .engrams
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("engram {id}")))
    }

    pub fn contains_engram(&self, id: EngramId) -> Result<bool, Error> {
        Ok(self.read()?.engrams.contains_key(&id))
    }

    /// All engrams in ascending id order.
    pub fn list_engrams(&self) -> Result<Vec<Engram>, Error> {
        Ok(self.read()?.engrams.values().cloned().collect())
    }

    pub fn engram_count(&self) -> Result<usize, Error> {
        Ok(self.read()?.engrams.len())
    }

    /// Set one metadata entry, replacing any previous value.
    pub fn update_metadata(
        &self,
        id: EngramId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), Error> {
        let db = self.db()?;
        let mut metadata = self.get_engram(id)?.metadata;
        metadata.insert(key.into(), value.into());
        db.update_metadata(id, &metadata)?;

        if let Some(engram) = self.write()?.engrams.get_mut(&id) {
            engram.metadata = metadata;
        }
        Ok(())
    }

    /// Remove one metadata entry, returning its previous value.
    pub fn remove_metadata(&self, id: EngramId, key: &str) -> Result<Option<String>, Error> {
        let db = self.db()?;
        let mut metadata = self.get_engram(id)?.metadata;
        let previous = metadata.remove(key);
        if previous.is_none() {
            return Ok(None);
        }
        db.update_metadata(id, &metadata)?;

        if let Some(engram) = self.write()?.engrams.get_mut(&id) {
            engram.metadata = metadata;
        }
        Ok(previous)
    }

    /// Delete an engram together with every connection touching it and its
    /// embedding. Returns the ids of the removed connections.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no engram has this id.
    pub fn delete_engram(&self, id: EngramId) -> Result<Vec<ConnectionId>, Error> {
        let db = self.db()?;
        let removed = db
            .delete_engram(id)?
            .ok_or_else(|| Error::NotFound(format!("engram {id}")))?;

        let mut cache = self.write()?;
        cache.engrams.remove(&id);
        for connection_id in &removed {
            cache.unlink(*connection_id);
        }
        cache.outgoing.remove(&id);
        cache.incoming.remove(&id);

        debug!(%id, connections = removed.len(), "deleted engram");
        Ok(removed)
    }

    /// Persist a new connection and assign its id.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidReference` if either endpoint is not a stored engram
    /// - `Error::Validation` if the connection already has an id, the relation
    ///   is empty, or the weight is outside [0, 1]
    pub fn add_connection(&self, connection: &mut Connection) -> Result<ConnectionId, Error> {
        if let Some(id) = connection.id {
            return Err(Error::Validation(format!("Connection already stored with id {id}")));
        }
        if connection.relation.as_str().trim().is_empty() {
            return Err(Error::Validation("Relation cannot be empty".to_string()));
        }
        validate_unit_interval("Weight", connection.weight)?;

        let db = self.db()?;
        {
            let cache = self.read()?;
            for endpoint in [connection.from_id, connection.to_id] {
                if !cache.engrams.contains_key(&endpoint) {
                    return Err(Error::InvalidReference(format!(
                        "engram {endpoint} does not exist"
                    )));
                }
            }
        }

        let id = db.insert_connection(connection)?;
        connection.id = Some(id);
        self.write()?.link(id, connection.clone());

        debug!(
            %id,
            from = %connection.from_id,
            to = %connection.to_id,
            relation = %connection.relation,
            "stored connection"
        );
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `Error::NotFound` if no connection has this id.
    pub fn get_connection(&self, id: ConnectionId) -> Result<Connection, Error> {
        self.read()?
            .connections
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("connection {id}")))
    }

    /// # Errors
    ///
    /// Returns `Error::NotFound` if no connection has this id.
    pub fn delete_connection(&self, id: ConnectionId) -> Result<(), Error> {
        let db = self.db()?;
        if !db.delete_connection(id)? {
            return Err(Error::NotFound(format!("connection {id}")));
        }
        self.write()?.unlink(id);
        Ok(())
    }

    /// Connections leaving `id`, ascending connection id.
    pub fn connections_from(&self, id: EngramId) -> Result<Vec<Connection>, Error> {
        let cache = self.read()?;
        Ok(cache.adjacent(cache.outgoing.get(&id)))
    }

    /// Connections arriving at `id`, ascending connection id.
    pub fn connections_to(&self, id: EngramId) -> Result<Vec<Connection>, Error> {
        let cache = self.read()?;
        Ok(cache.adjacent(cache.incoming.get(&id)))
    }

    /// All connections, ascending id.
    pub fn list_connections(&self) -> Result<Vec<Connection>, Error> {
        Ok(self.read()?.connections.values().cloned().collect())
    }

    pub fn connection_count(&self) -> Result<usize, Error> {
        Ok(self.read()?.connections.len())
    }

    /// Breadth-first walk over outgoing connections.
    ///
    /// Returns each reachable engram once with its hop distance, starting
    /// with `start` at depth 0. Only connections labelled `relation` are
    /// followed when one is given.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if `start` is not a stored engram.
    pub fn traverse(
        &self,
        start: EngramId,
        max_depth: usize,
        relation: Option<&Relation>,
    ) -> Result<Vec<(EngramId, usize)>, Error> {
        let cache = self.read()?;
        if !cache.engrams.contains_key(&start) {
            return Err(Error::NotFound(format!("engram {start}")));
        }

        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut reached = Vec::new();

        while let Some((id, depth)) = queue.pop_front() {
            reached.push((id, depth));
            if depth == max_depth {
                continue;
            }
            for connection in cache.adjacent(cache.outgoing.get(&id)) {
                if relation.is_some_and(|r| *r != connection.relation) {
                    continue;
                }
                if visited.insert(connection.to_id) {
                    queue.push_back((connection.to_id, depth + 1));
                }
            }
        }

        Ok(reached)
    }

    /// Simple paths from `from` to `to` over outgoing connections.
    ///
    /// Each path lists engram ids from `from` to `to` inclusive, uses at most
    /// `max_depth` connections and never revisits an engram. Paths come out
    /// in depth-first order by ascending connection id, at most `MAX_PATHS`
    /// of them. `from == to` yields the single one-element path.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if either endpoint is not a stored engram.
    pub fn find_paths(
        &self,
        from: EngramId,
        to: EngramId,
        max_depth: usize,
    ) -> Result<Vec<Vec<EngramId>>, Error> {
        let cache = self.read()?;
        for id in [from, to] {
            if !cache.engrams.contains_key(&id) {
                return Err(Error::NotFound(format!("engram {id}")));
            }
        }

        let mut paths = Vec::new();
        let mut current = vec![from];
        collect_paths(&cache, to, max_depth, &mut current, &mut paths);
        Ok(paths)
    }

    /// Lexical search over engram content, best first.
    pub fn search_keywords(&self, text: &str, limit: usize) -> Result<Vec<(EngramId, f64)>, Error> {
        Ok(self.db()?.search_bm25(text, limit)?)
    }

    /// Persist the embedding of a stored engram, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the engram does not exist.
    pub fn put_embedding(&self, id: EngramId, embedding: &Embedding) -> Result<(), Error> {
        let db = self.db()?;
        if !self.contains_engram(id)? {
            return Err(Error::NotFound(format!("engram {id}")));
        }
        db.put_embedding(id, embedding.model(), embedding.as_slice())?;
        Ok(())
    }

    pub fn get_embedding(&self, id: EngramId) -> Result<Option<Embedding>, Error> {
        Ok(self
            .db()?
            .get_embedding(id)?
            .map(|stored| Embedding::new(stored.vector, stored.model)))
    }

    /// Persisted embeddings produced by `model`, ascending engram id.
    pub fn embeddings_for_model(&self, model: &str) -> Result<Vec<(EngramId, Embedding)>, Error> {
        Ok(self
            .db()?
            .embeddings_for_model(model)?
            .into_iter()
            .map(|stored| {
                (
                    stored.engram_id,
                    Embedding::new(stored.vector, stored.model),
                )
            })
            .collect())
    }

    /// Short name of the embedding model this store is bound to, if any.
    pub fn bound_model(&self) -> Result<Option<String>, Error> {
        Ok(self.db()?.get_meta(BOUND_MODEL_KEY)?)
    }

    pub fn bind_model(&self, name: &str) -> Result<(), Error> {
        self.db()?.set_meta(BOUND_MODEL_KEY, name)?;
        info!(model = name, "bound store to embedding model");
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats, Error> {
        let db = self.db()?;
        let embeddings = db.count_embeddings()?;
        let cache = self.read()?;
        Ok(StoreStats {
            engrams: cache.engrams.len(),
            connections: cache.connections.len(),
            embeddings,
        })
    }
}
