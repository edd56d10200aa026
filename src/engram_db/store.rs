//! Core handle struct combining persistence and vector search state.

use std::path::{Component, Path};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::Config;
use crate::embedding::EmbeddingService;
use crate::errors::Error;
use crate::index::VectorIndex;
use crate::records::RecordStore;

/// Embedding service and index, present once vector search is initialized.
pub(crate) struct VectorState {
    pub(crate) embedder: Arc<EmbeddingService>,
    pub(crate) index: Arc<dyn VectorIndex>,
}

pub(crate) type VectorSlot = Option<Arc<VectorState>>;

/// Embedded engram database.
///
/// All methods take `&self`; share it across threads with `Arc<EngramDb>`.
/// Record operations work immediately. Vector operations fail with
/// `Error::NotInitialized` until one of the `init_vector_search*` methods
/// succeeds.
pub struct EngramDb {
    pub(crate) records: RecordStore,
    pub(crate) vector: RwLock<VectorSlot>,
    pub(crate) config: Config,
}

impl EngramDb {
    /// Open or create a database at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Database path contains path traversal sequences (e.g., "../")
    /// - Parent directory cannot be canonicalized
    /// - Database cannot be opened
    pub fn open(db_path: &Path, config: Config) -> Result<Self, Error> {
        // Path traversal guard: reject parent directory components (works on all platforms)
        for component in db_path.components() {
            if matches!(component, Component::ParentDir) {
                return Err(Error::Config(
                    "Invalid database path: contains '..' which may escape the intended directory"
                        .to_string(),
                ));
            }
        }

        // Validate parent directory exists and is accessible
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::canonicalize(parent).map_err(|e| {
                    Error::Config(format!(
                        "Invalid database path: parent directory not accessible: {}",
                        e
                    ))
                })?;
            }
        }

        let records = RecordStore::open(db_path)?;
        Ok(EngramDb {
            records,
            vector: RwLock::new(None),
            config,
        })
    }

    /// Open the database named by `config.database_path`, creating its
    /// directories first.
    pub fn from_config(config: Config) -> Result<Self, Error> {
        config.validate()?;
        config.ensure_directories()?;
        let path = config.database_path.clone();
        Self::open(&path, config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Direct access to the underlying record store.
    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub(crate) fn read_vector(&self) -> Result<RwLockReadGuard<'_, VectorSlot>, Error> {
        self.vector
            .read()
            .map_err(|e| Error::Lock(format!("vector state: {e}")))
    }

    pub(crate) fn write_vector(&self) -> Result<RwLockWriteGuard<'_, VectorSlot>, Error> {
        self.vector
            .write()
            .map_err(|e| Error::Lock(format!("vector state: {e}")))
    }

    /// The vector subsystem, or `Error::NotInitialized`.
    pub(crate) fn vector_state(&self) -> Result<Arc<VectorState>, Error> {
        self.read_vector()?.clone().ok_or(Error::NotInitialized)
    }
}
