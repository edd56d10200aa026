//! FTS5 full-text search and BM25 ranking over engram content.

use rusqlite::params;

use super::{Database, Error};
use crate::types::EngramId;

pub type Result<T> = std::result::Result<T, Error>;

pub const MAX_SEARCH_LIMIT: usize = 10_000;

/// Validate search limit is within acceptable bounds.
pub fn validate_limit(limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(Error::InvalidLimit(
            "Limit must be greater than 0".to_string(),
        ));
    }
    if limit > MAX_SEARCH_LIMIT {
        return Err(Error::InvalidLimit(format!(
            "Limit {} exceeds maximum allowed ({})",
            limit, MAX_SEARCH_LIMIT
        )));
    }
    Ok(())
}

impl Database {
    /// Search engram content using FTS5 BM25 ranking.
    ///
    /// Returns `(id, relevance)` pairs, best first. SQLite's `bm25()` is
    /// negative with lower meaning better; it is negated so higher is better.
    ///
    /// # Errors
    ///
    /// Returns error if the limit is invalid or the FTS5 query fails.
    pub fn search_bm25(&self, query: &str, limit: usize) -> Result<Vec<(EngramId, f64)>> {
        validate_limit(limit)?;

        let escaped_query = Self::escape_fts_query(query);

        // Empty query returns no results (avoid FTS5 syntax error)
        if escaped_query.is_empty() {
            return Ok(Vec::new());
        }

        let sql = r#"
            SELECT rowid, bm25(engrams_fts) AS bm25_score
            FROM engrams_fts
            WHERE engrams_fts MATCH ?1
            ORDER BY bm25_score, rowid
            LIMIT ?2
        "#;

        let mut stmt = self.conn.prepare(sql)?;
        let hits: rusqlite::Result<Vec<(EngramId, f64)>> = stmt
            .query_map(params![escaped_query, limit as i64], |row| {
                let id: i64 = row.get(0)?;
                let score: f64 = row.get(1)?;
                Ok((EngramId::new(id as u64), -score))
            })?
            .collect();

        Ok(hits?)
    }

    /// Quote every whitespace-separated term so FTS5 operators are literal.
    fn escape_fts_query(query: &str) -> String {
        query
            .split_whitespace()
            .map(|word| format!("\"{}\"", word.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}
