//! In-memory vector index with exact cosine k-nearest-neighbor search.
//!
//! `FlatIndex` scans every entry; top-k selection is O(n) followed by a sort
//! of the k winners. `VectorIndex` is the seam for an approximate backend.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::embedding::{Embedding, cosine_similarity};
use crate::errors::Error;
use crate::types::EngramId;

/// Identifier → vector store answering nearest-neighbor queries.
pub trait VectorIndex: Send + Sync {
    /// Dimensionality every stored vector must have.
    fn dimensions(&self) -> usize;

    /// Insert or overwrite the vector for `id`.
    fn insert(&self, id: EngramId, embedding: &Embedding) -> Result<(), Error>;

    /// Up to `k` entries by descending cosine similarity to `query`.
    ///
    /// Equal scores keep the order in which ids were first inserted.
    fn knn(&self, query: &Embedding, k: usize) -> Result<Vec<(EngramId, f64)>, Error>;

    /// Remove `id`; returns whether it was present.
    fn remove(&self, id: EngramId) -> Result<bool, Error>;

    fn contains(&self, id: EngramId) -> Result<bool, Error>;

    /// Every stored id, in no particular order.
    fn ids(&self) -> Result<Vec<EngramId>, Error>;

    fn len(&self) -> Result<usize, Error>;

    fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    fn clear(&self) -> Result<(), Error>;
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    vector: Vec<f32>,
}

#[derive(Debug, Default)]
struct Entries {
    by_id: HashMap<EngramId, Entry>,
    next_seq: u64,
}

/// Brute-force index behind a reader/writer lock.
#[derive(Debug)]
pub struct FlatIndex {
    dimensions: usize,
    entries: RwLock<Entries>,
}

impl FlatIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            entries: RwLock::new(Entries::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Entries>, Error> {
        self.entries
            .read()
            .map_err(|e| Error::Lock(format!("vector index: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Entries>, Error> {
        self.entries
            .write()
            .map_err(|e| Error::Lock(format!("vector index: {e}")))
    }

    fn check_dimensions(&self, embedding: &Embedding) -> Result<(), Error> {
        if embedding.dimensions() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.dimensions(),
            });
        }
        Ok(())
    }
}

/// Descending score, then ascending insertion sequence.
fn rank(a: &(EngramId, f64, u64), b: &(EngramId, f64, u64)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.2.cmp(&b.2))
}

impl VectorIndex for FlatIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Re-inserting an id replaces its vector but keeps its original
    /// position for tie-breaking.
    fn insert(&self, id: EngramId, embedding: &Embedding) -> Result<(), Error> {
        self.check_dimensions(embedding)?;
        embedding.ensure_finite()?;

        let mut entries = self.write()?;
        let vector = embedding.as_slice().to_vec();
        if let Some(entry) = entries.by_id.get_mut(&id) {
            entry.vector = vector;
            return Ok(());
        }
        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.by_id.insert(id, Entry { seq, vector });
        Ok(())
    }

    fn knn(&self, query: &Embedding, k: usize) -> Result<Vec<(EngramId, f64)>, Error> {
        self.check_dimensions(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let entries = self.read()?;
        let mut scored = entries
            .by_id
            .iter()
            .map(|(id, entry)| {
                cosine_similarity(query.as_slice(), &entry.vector)
                    .map(|score| (*id, score, entry.seq))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        drop(entries);

        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, rank);
            scored.truncate(k);
        }
        scored.sort_unstable_by(rank);

        Ok(scored.into_iter().map(|(id, score, _)| (id, score)).collect())
    }

    fn remove(&self, id: EngramId) -> Result<bool, Error> {
        Ok(self.write()?.by_id.remove(&id).is_some())
    }

    fn contains(&self, id: EngramId) -> Result<bool, Error> {
        Ok(self.read()?.by_id.contains_key(&id))
    }

    fn ids(&self) -> Result<Vec<EngramId>, Error> {
        Ok(self.read()?.by_id.keys().copied().collect())
    }

    fn len(&self) -> Result<usize, Error> {
        Ok(self.read()?.by_id.len())
    }

    fn clear(&self) -> Result<(), Error> {
        let mut entries = self.write()?;
        entries.by_id.clear();
        entries.next_seq = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec(), "test")
    }

    fn id(n: u64) -> EngramId {
        EngramId::new(n)
    }

    #[test]
    fn test_insert_and_knn() {
        let index = FlatIndex::new(3);
        index.insert(id(1), &emb(&[1.0, 0.0, 0.0])).unwrap();
        index.insert(id(2), &emb(&[0.0, 1.0, 0.0])).unwrap();
        index.insert(id(3), &emb(&[0.9, 0.1, 0.0])).unwrap();

        let hits = index.knn(&emb(&[1.0, 0.0, 0.0]), 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, id(1));
        assert_eq!(hits[1].0, id(3));
        assert!((hits[0].1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_knn_scores_non_increasing() {
        let index = FlatIndex::new(2);
        for n in 0..50u64 {
            let angle = n as f32 * 0.1;
            index.insert(id(n), &emb(&[angle.cos(), angle.sin()])).unwrap();
        }
        let hits = index.knn(&emb(&[1.0, 0.3]), 10).unwrap();
        assert_eq!(hits.len(), 10);
        assert!(hits.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_knn_returns_all_when_fewer_than_k() {
        let index = FlatIndex::new(2);
        index.insert(id(1), &emb(&[1.0, 0.0])).unwrap();
        index.insert(id(2), &emb(&[0.0, 1.0])).unwrap();
        assert_eq!(index.knn(&emb(&[1.0, 1.0]), 10).unwrap().len(), 2);
    }

    #[test]
    fn test_knn_zero_k_and_empty_index() {
        let index = FlatIndex::new(2);
        assert!(index.knn(&emb(&[1.0, 0.0]), 5).unwrap().is_empty());
        index.insert(id(1), &emb(&[1.0, 0.0])).unwrap();
        assert!(index.knn(&emb(&[1.0, 0.0]), 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let index = FlatIndex::new(2);
        for n in [5u64, 3, 9, 1] {
            index.insert(id(n), &emb(&[1.0, 1.0])).unwrap();
        }
        let hits: Vec<EngramId> = index
            .knn(&emb(&[1.0, 1.0]), 3)
            .unwrap()
            .into_iter()
            .map(|(hit, _)| hit)
            .collect();
        assert_eq!(hits, vec![id(5), id(3), id(9)]);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let index = FlatIndex::new(2);
        index.insert(id(1), &emb(&[0.0, 1.0])).unwrap();
        index.insert(id(2), &emb(&[1.0, 0.0])).unwrap();
        index.insert(id(1), &emb(&[1.0, 0.0])).unwrap();

        assert_eq!(index.len().unwrap(), 2);
        let hits = index.knn(&emb(&[1.0, 0.0]), 2).unwrap();
        assert_eq!(hits[0].0, id(1));
        assert_eq!(hits[1].0, id(2));
    }

    #[test]
    fn test_dimension_mismatch() {
        let index = FlatIndex::new(3);
        assert!(matches!(
            index.insert(id(1), &emb(&[1.0, 0.0])),
            Err(Error::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(matches!(
            index.knn(&emb(&[1.0]), 1),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_insert_rejects_non_finite() {
        let index = FlatIndex::new(2);
        assert!(matches!(
            index.insert(id(1), &emb(&[f32::NAN, 0.0])),
            Err(Error::Validation(_))
        ));
        assert!(index.is_empty().unwrap());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let index = FlatIndex::new(2);
        index.insert(id(1), &emb(&[1.0, 0.0])).unwrap();
        assert!(index.contains(id(1)).unwrap());
        assert!(index.remove(id(1)).unwrap());
        assert!(!index.remove(id(1)).unwrap());
        assert!(!index.contains(id(1)).unwrap());
    }

    #[test]
    fn test_ids_lists_every_entry() {
        let index = FlatIndex::new(2);
        index.insert(id(4), &emb(&[1.0, 0.0])).unwrap();
        index.insert(id(2), &emb(&[0.0, 1.0])).unwrap();
        let mut ids = index.ids().unwrap();
        ids.sort();
        assert_eq!(ids, vec![id(2), id(4)]);
    }

    #[test]
    fn test_clear() {
        let index = FlatIndex::new(2);
        index.insert(id(1), &emb(&[1.0, 0.0])).unwrap();
        index.insert(id(2), &emb(&[0.0, 1.0])).unwrap();
        index.clear().unwrap();
        assert_eq!(index.len().unwrap(), 0);
        assert_eq!(index.dimensions(), 2);
    }
}
