//! JSON snapshots of the record store.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::Error;
use crate::types::{Connection, Engram, EngramId};

use super::store::EngramDb;

/// Version written into every snapshot.
pub const SNAPSHOT_VERSION: &str = "1";

/// Every engram and connection at one point in time.
///
/// Embeddings are not included; they are derived from content and are
/// recomputed when the snapshot is imported into an initialized store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub engrams: Vec<Engram>,
    pub connections: Vec<Connection>,
}

/// Import statistics for reporting.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub imported_engrams: usize,
    pub imported_connections: usize,
    /// Engrams rejected by validation.
    pub skipped_engrams: usize,
    /// Connections rejected by validation or whose endpoints were not imported.
    pub skipped_connections: usize,
}

impl EngramDb {
    /// Capture all engrams and connections.
    pub fn export_snapshot(&self) -> Result<Snapshot, Error> {
        Ok(Snapshot {
            version: SNAPSHOT_VERSION.to_string(),
            exported_at: Utc::now(),
            engrams: self.records.list_engrams()?,
            connections: self.records.list_connections()?,
        })
    }

    /// Write a snapshot to `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be written and `Error::Json`
    /// if serialization fails.
    pub fn export_to_path(&self, path: &Path) -> Result<Snapshot, Error> {
        let snapshot = self.export_snapshot()?;
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writer.flush()?;
        info!(
            path = %path.display(),
            engrams = snapshot.engrams.len(),
            connections = snapshot.connections.len(),
            "snapshot exported"
        );
        Ok(snapshot)
    }

    /// Add the records of `snapshot` to this store.
    ///
    /// Engrams receive fresh ids and connections are remapped onto them.
    /// When vector search is initialized every imported engram is embedded.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for an unknown snapshot version. Caller
    /// errors on single records are counted as skips; anything else aborts
    /// the import, keeping the records added so far.
    pub fn import_snapshot(&self, snapshot: Snapshot) -> Result<ImportStats, Error> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::Validation(format!(
                "Unsupported snapshot version {:?}",
                snapshot.version
            )));
        }

        let mut stats = ImportStats::default();
        let mut remap: HashMap<EngramId, EngramId> = HashMap::new();

        for engram in snapshot.engrams {
            let old_id = engram.id;
            let mut fresh = Engram { id: None, ..engram };
            match self.add_engram(&mut fresh) {
                Ok(new_id) => {
                    if let Some(old_id) = old_id {
                        remap.insert(old_id, new_id);
                    }
                    stats.imported_engrams += 1;
                }
                Err(e) if e.is_caller_error() => {
                    warn!(id = ?old_id, error = %e, "skipping engram during import");
                    stats.skipped_engrams += 1;
                }
                Err(e) => return Err(e),
            }
        }

        for connection in snapshot.connections {
            let endpoints = remap
                .get(&connection.from_id)
                .zip(remap.get(&connection.to_id));
            let Some((&from_id, &to_id)) = endpoints else {
                stats.skipped_connections += 1;
                continue;
            };
            let mut fresh = Connection {
                id: None,
                from_id,
                to_id,
                ..connection
            };
            match self.add_connection(&mut fresh) {
                Ok(_) => stats.imported_connections += 1,
                Err(e) if e.is_caller_error() => {
                    warn!(error = %e, "skipping connection during import");
                    stats.skipped_connections += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            engrams = stats.imported_engrams,
            connections = stats.imported_connections,
            skipped = stats.skipped_engrams + stats.skipped_connections,
            "snapshot imported"
        );
        Ok(stats)
    }

    /// Read a snapshot from `path` and import it.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileNotFound` if `path` does not exist and
    /// `Error::Json` if it is not a valid snapshot.
    pub fn import_from_path(&self, path: &Path) -> Result<ImportStats, Error> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Snapshot = serde_json::from_reader(reader)?;
        self.import_snapshot(snapshot)
    }
}
