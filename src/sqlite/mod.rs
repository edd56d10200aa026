//! SQLite backend for engram storage.
//!
//! This module provides:
//! - `Database`: connection, schema and row-level CRUD for engrams and connections
//! - `embedding`: persisted vectors and BLOB conversion
//! - `fts`: FTS5 full-text search over engram content
//!
//! Identifiers come from per-kind high-water marks in `store_meta`, bumped in
//! the same transaction as the insert, so ids are never reused.

pub mod embedding;
pub mod fts;

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection as SqliteConnection, OptionalExtension, Row, params};

use crate::types::{Connection, ConnectionId, Engram, EngramId, Metadata, Relation};

pub use self::embedding::{blob_to_vec, vec_to_blob};

const ENGRAM_HWM_KEY: &str = "engram_hwm";
const CONNECTION_HWM_KEY: &str = "connection_hwm";

/// Error types for SQLite operations.
#[derive(Debug)]
pub enum Error {
    Sqlite(String),
    InvalidBlobSize { expected: usize, actual: usize },
    MismatchedDimensions { expected: usize, actual: usize },
    InvalidRecord(String),
    InvalidLimit(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Sqlite(msg) => write!(f, "Database error: {}", msg),
            Error::InvalidBlobSize { expected, actual } => {
                write!(
                    f,
                    "Invalid BLOB size: expected {} bytes, got {} bytes",
                    expected, actual
                )
            }
            Error::MismatchedDimensions { expected, actual } => {
                write!(
                    f,
                    "Mismatched dimensions: expected {} dimensions, got {} dimensions",
                    expected, actual
                )
            }
            Error::InvalidRecord(msg) => write!(f, "Invalid stored record: {}", msg),
            Error::InvalidLimit(msg) => write!(f, "Invalid limit: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Sqlite(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// SQLite database backend for engramdb.
pub struct Database {
    conn: SqliteConnection,
}

/// Initialize database schema and create necessary tables and triggers.
fn create_schema(conn: &SqliteConnection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS engrams (
            id INTEGER PRIMARY KEY,
            content TEXT NOT NULL,
            source TEXT NOT NULL,
            confidence REAL NOT NULL,
            metadata TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS connections (
            id INTEGER PRIMARY KEY,
            from_id INTEGER NOT NULL REFERENCES engrams(id) ON DELETE CASCADE,
            to_id INTEGER NOT NULL REFERENCES engrams(id) ON DELETE CASCADE,
            relation TEXT NOT NULL,
            weight REAL NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_connections_from ON connections(from_id);
        CREATE INDEX IF NOT EXISTS idx_connections_to ON connections(to_id);

        CREATE TABLE IF NOT EXISTS embeddings (
            engram_id INTEGER PRIMARY KEY REFERENCES engrams(id) ON DELETE CASCADE,
            model TEXT NOT NULL,
            dimensions INTEGER NOT NULL,
            vector BLOB NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_embeddings_model ON embeddings(model);

        CREATE TABLE IF NOT EXISTS store_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS engrams_fts USING fts5(
            content,
            tokenize='porter unicode61',
            content='engrams',
            content_rowid='id'
        );

        CREATE TRIGGER IF NOT EXISTS engrams_fts_insert AFTER INSERT ON engrams BEGIN
            INSERT INTO engrams_fts(rowid, content) VALUES (new.id, new.content);
        END;

        CREATE TRIGGER IF NOT EXISTS engrams_fts_delete AFTER DELETE ON engrams BEGIN
            INSERT INTO engrams_fts(engrams_fts, rowid, content)
            VALUES('delete', old.id, old.content);
        END;

        CREATE TRIGGER IF NOT EXISTS engrams_fts_update AFTER UPDATE OF content ON engrams BEGIN
            INSERT INTO engrams_fts(engrams_fts, rowid, content)
            VALUES('delete', old.id, old.content);
            INSERT INTO engrams_fts(rowid, content) VALUES (new.id, new.content);
        END;
        "#,
    )?;
    Ok(())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::InvalidRecord(format!("bad timestamp '{}': {}", value, e)))
}

/// Raw engram columns; decoded outside the rusqlite row callback.
type EngramRow = (i64, String, String, f64, String, String);

fn engram_row(row: &Row<'_>) -> rusqlite::Result<EngramRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_engram(
    (id, content, source, confidence, metadata, created_at): EngramRow,
) -> Result<Engram> {
    let metadata: Metadata = serde_json::from_str(&metadata)
        .map_err(|e| Error::InvalidRecord(format!("bad metadata for engram {}: {}", id, e)))?;
    Ok(Engram {
        id: Some(EngramId::new(id as u64)),
        content,
        source,
        confidence,
        metadata,
        created_at: parse_timestamp(&created_at)?,
    })
}

type ConnectionRow = (i64, i64, i64, String, f64, String);

fn connection_row(row: &Row<'_>) -> rusqlite::Result<ConnectionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_connection(
    (id, from_id, to_id, relation, weight, created_at): ConnectionRow,
) -> Result<Connection> {
    Ok(Connection {
        id: Some(ConnectionId::new(id as u64)),
        from_id: EngramId::new(from_id as u64),
        to_id: EngramId::new(to_id as u64),
        relation: Relation::new(relation),
        weight,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn encode_metadata(metadata: &Metadata) -> Result<String> {
    serde_json::to_string(metadata)
        .map_err(|e| Error::InvalidRecord(format!("cannot encode metadata: {}", e)))
}

impl Database {
    /// Open or create a SQLite database at the given path.
    ///
    /// Initializes the schema if the database is new.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or schema initialization fails.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = SqliteConnection::open(path)?;
        create_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Read a `store_meta` value.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or replace a `store_meta` value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Allocate the next id for `key` inside an open transaction.
    fn next_id(tx: &rusqlite::Transaction<'_>, key: &str) -> Result<i64> {
        let current: Option<String> = tx
            .query_row(
                "SELECT value FROM store_meta WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        let current: i64 = match current {
            Some(value) => value
                .parse()
                .map_err(|_| Error::InvalidRecord(format!("bad high-water mark '{}'", value)))?,
            None => 0,
        };
        let next = current + 1;
        tx.execute(
            "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, next.to_string()],
        )?;
        Ok(next)
    }

    /// Insert an engram, allocating its id.
    ///
    /// The `id` field of `engram` is ignored.
    ///
    /// # Errors
    ///
    /// Returns error if the metadata cannot be encoded or the write fails.
    pub fn insert_engram(&self, engram: &Engram) -> Result<EngramId> {
        let metadata = encode_metadata(&engram.metadata)?;
        let tx = self.conn.unchecked_transaction()?;
        let id = Self::next_id(&tx, ENGRAM_HWM_KEY)?;

        tx.execute(
            r#"
            INSERT INTO engrams (id, content, source, confidence, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                id,
                &engram.content,
                &engram.source,
                engram.confidence,
                &metadata,
                engram.created_at.to_rfc3339()
            ],
        )?;
        tx.commit()?;

        Ok(EngramId::new(id as u64))
    }

    /// All engrams in ascending id order.
    pub fn list_engrams(&self) -> Result<Vec<Engram>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, content, source, confidence, metadata, created_at
            FROM engrams
            ORDER BY id
            "#,
        )?;
        let rows: rusqlite::Result<Vec<EngramRow>> = stmt.query_map([], engram_row)?.collect();
        rows?.into_iter().map(decode_engram).collect()
    }

    /// Replace an engram's metadata.
    ///
    /// Returns false if the engram does not exist.
    pub fn update_metadata(&self, id: EngramId, metadata: &Metadata) -> Result<bool> {
        let encoded = encode_metadata(metadata)?;
        let rows = self.conn.execute(
            "UPDATE engrams SET metadata = ?1 WHERE id = ?2",
            params![&encoded, id.get() as i64],
        )?;
        Ok(rows > 0)
    }

    /// Delete an engram with its connections and embedding.
    ///
    /// Returns the ids of the deleted connections, or None if the engram did
    /// not exist.
    pub fn delete_engram(&self, id: EngramId) -> Result<Option<Vec<ConnectionId>>> {
        let tx = self.conn.unchecked_transaction()?;
        let raw = id.get() as i64;

        let removed: Vec<ConnectionId> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM connections WHERE from_id = ?1 OR to_id = ?1 ORDER BY id",
            )?;
            let ids: rusqlite::Result<Vec<i64>> =
                stmt.query_map([raw], |row| row.get(0))?.collect();
            ids?.into_iter()
                .map(|c| ConnectionId::new(c as u64))
                .collect()
        };

        tx.execute(
            "DELETE FROM connections WHERE from_id = ?1 OR to_id = ?1",
            [raw],
        )?;
        tx.execute("DELETE FROM embeddings WHERE engram_id = ?1", [raw])?;
        let rows = tx.execute("DELETE FROM engrams WHERE id = ?1", [raw])?;

        if rows == 0 {
            tx.rollback()?;
            return Ok(None);
        }
        tx.commit()?;
        Ok(Some(removed))
    }

    /// Insert a connection, allocating its id.
    ///
    /// Endpoint existence is enforced by the foreign keys; callers check
    /// first to report which endpoint is missing.
    pub fn insert_connection(&self, connection: &Connection) -> Result<ConnectionId> {
        let tx = self.conn.unchecked_transaction()?;
        let id = Self::next_id(&tx, CONNECTION_HWM_KEY)?;

        tx.execute(
            r#"
            INSERT INTO connections (id, from_id, to_id, relation, weight, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                id,
                connection.from_id.get() as i64,
                connection.to_id.get() as i64,
                connection.relation.as_str(),
                connection.weight,
                connection.created_at.to_rfc3339()
            ],
        )?;
        tx.commit()?;

        Ok(ConnectionId::new(id as u64))
    }

    /// All connections in ascending id order.
    pub fn list_connections(&self) -> Result<Vec<Connection>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, from_id, to_id, relation, weight, created_at
            FROM connections
            ORDER BY id
            "#,
        )?;
        let rows: rusqlite::Result<Vec<ConnectionRow>> =
            stmt.query_map([], connection_row)?.collect();
        rows?.into_iter().map(decode_connection).collect()
    }

    /// Delete a connection by ID.
    ///
    /// Returns true if a connection was deleted, false if it didn't exist.
    pub fn delete_connection(&self, id: ConnectionId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM connections WHERE id = ?1", [id.get() as i64])?;
        Ok(rows > 0)
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &SqliteConnection {
        &self.conn
    }
}
