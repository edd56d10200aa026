//! Persisted embeddings and BLOB conversion.
//!
//! Vectors are stored as little-endian f32 BLOBs next to the model that
//! produced them and their dimension count.

use rusqlite::{OptionalExtension, params};

use super::{Database, Error};
use crate::types::EngramId;

pub type Result<T> = std::result::Result<T, Error>;

/// Convert a vector of f32 embedding values to a BLOB (little-endian bytes).
///
/// # Errors
///
/// Returns `Error::MismatchedDimensions` if the vector length is not `dims`.
pub fn vec_to_blob(vec: &[f32], dims: usize) -> Result<Vec<u8>> {
    if vec.len() != dims {
        return Err(Error::MismatchedDimensions {
            expected: dims,
            actual: vec.len(),
        });
    }
    Ok(vec.iter().flat_map(|&x| x.to_le_bytes()).collect())
}

/// Convert a BLOB (little-endian bytes) to a vector of `dims` f32 values.
///
/// # Errors
///
/// Returns `Error::InvalidBlobSize` if the blob is not exactly `dims * 4` bytes.
pub fn blob_to_vec(blob: &[u8], dims: usize) -> Result<Vec<f32>> {
    if blob.len() != dims * 4 {
        return Err(Error::InvalidBlobSize {
            expected: dims * 4,
            actual: blob.len(),
        });
    }
    let mut vec = Vec::with_capacity(dims);
    for chunk in blob.chunks_exact(4) {
        let val = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        vec.push(val);
    }
    Ok(vec)
}

/// A stored vector and the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmbedding {
    pub engram_id: EngramId,
    pub model: String,
    pub vector: Vec<f32>,
}

type EmbeddingRow = (i64, String, i64, Vec<u8>);

fn decode(row: EmbeddingRow) -> Result<StoredEmbedding> {
    let (engram_id, model, dims, blob) = row;
    let dims = usize::try_from(dims).map_err(|_| {
        Error::InvalidRecord(format!("negative dimensions for engram {}", engram_id))
    })?;
    Ok(StoredEmbedding {
        engram_id: EngramId::new(engram_id as u64),
        model,
        vector: blob_to_vec(&blob, dims)?,
    })
}

impl Database {
    /// Store (or replace) the embedding of an engram.
    pub fn put_embedding(&self, id: EngramId, model: &str, vector: &[f32]) -> Result<()> {
        let blob = vec_to_blob(vector, vector.len())?;
        self.conn.execute(
            r#"
            INSERT INTO embeddings (engram_id, model, dimensions, vector)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(engram_id) DO UPDATE SET
                model = excluded.model,
                dimensions = excluded.dimensions,
                vector = excluded.vector
            "#,
            params![id.get() as i64, model, vector.len() as i64, &blob],
        )?;
        Ok(())
    }

    pub fn get_embedding(&self, id: EngramId) -> Result<Option<StoredEmbedding>> {
        let row = self
            .conn
            .query_row(
                "SELECT engram_id, model, dimensions, vector FROM embeddings WHERE engram_id = ?1",
                [id.get() as i64],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        row.map(decode).transpose()
    }

    /// All embeddings produced by `model`, in ascending engram id order.
    pub fn embeddings_for_model(&self, model: &str) -> Result<Vec<StoredEmbedding>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT engram_id, model, dimensions, vector
            FROM embeddings
            WHERE model = ?1
            ORDER BY engram_id
            "#,
        )?;
        let rows: rusqlite::Result<Vec<EmbeddingRow>> = stmt
            .query_map([model], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect();
        rows?.into_iter().map(decode).collect()
    }

    pub fn count_embeddings(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
