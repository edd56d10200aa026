//! Tests for the engram database handle.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::TempDir;

use super::store::VectorState;
use super::*;
use crate::config::Config;
use crate::embedding::{Embedding, EmbeddingBackend, EmbeddingModelType, HashingBackend};
use crate::errors::Error;
use crate::index::{FlatIndex, VectorIndex};
use crate::types::{Connection, Engram, EngramId};

fn test_config(dir: &Path) -> Config {
    Config {
        database_path: dir.join("engrams.db"),
        embedding_model: "hashing".to_string(),
        model_cache: dir.join("models"),
        ..Config::default()
    }
}

fn create_test_db() -> EngramDb {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let db = EngramDb::open(&config.database_path.clone(), config).unwrap();
    std::mem::forget(dir);
    db
}

fn add(db: &EngramDb, content: &str) -> EngramId {
    let mut engram = Engram::new(content, "test", 0.8);
    db.add_engram(&mut engram).unwrap()
}

/// Refuses to embed any text containing "boom".
struct FlakyBackend;

impl EmbeddingBackend for FlakyBackend {
    fn model_name(&self) -> &str {
        "flaky"
    }

    fn dimensions(&self) -> usize {
        384
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, Error> {
        if text.contains("boom") {
            return Err(Error::Embedding("refused".to_string()));
        }
        let mut vector = vec![0.0; 384];
        vector[text.len() % 384] = 1.0;
        Ok(vector)
    }
}

/// Hashing backend that fails every call while `failing` is set.
struct ToggleBackend {
    inner: HashingBackend,
    failing: Arc<AtomicBool>,
}

impl EmbeddingBackend for ToggleBackend {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Embedding("backend offline".to_string()));
        }
        self.inner.embed(text)
    }
}

/// Index that accepts reads but rejects every insert.
struct ReadOnlyIndex(FlatIndex);

impl VectorIndex for ReadOnlyIndex {
    fn dimensions(&self) -> usize {
        self.0.dimensions()
    }

    fn insert(&self, _id: EngramId, _embedding: &Embedding) -> Result<(), Error> {
        Err(Error::Lock("vector index: read-only".to_string()))
    }

    fn knn(&self, query: &Embedding, k: usize) -> Result<Vec<(EngramId, f64)>, Error> {
        self.0.knn(query, k)
    }

    fn remove(&self, id: EngramId) -> Result<bool, Error> {
        self.0.remove(id)
    }

    fn contains(&self, id: EngramId) -> Result<bool, Error> {
        self.0.contains(id)
    }

    fn ids(&self) -> Result<Vec<EngramId>, Error> {
        self.0.ids()
    }

    fn len(&self) -> Result<usize, Error> {
        self.0.len()
    }

    fn clear(&self) -> Result<(), Error> {
        self.0.clear()
    }
}

#[test]
fn test_open_rejects_path_traversal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("../escape.db");
    let result = EngramDb::open(&path, test_config(dir.path()));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_open_requires_existing_parent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing/engrams.db");
    let result = EngramDb::open(&path, test_config(dir.path()));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_from_config_creates_directories() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        database_path: dir.path().join("data/engrams.db"),
        ..test_config(dir.path())
    };
    let db = EngramDb::from_config(config).unwrap();
    assert!(dir.path().join("data/engrams.db").exists());
    assert_eq!(db.config().embedding_model, "hashing");
}

#[test]
fn test_vector_operations_require_init() {
    let db = create_test_db();
    let id = add(&db, "stored without vectors");

    assert!(!db.is_vector_search_initialized().unwrap());
    assert!(matches!(db.query_by_text("anything", 2), Err(Error::NotInitialized)));
    assert!(matches!(
        db.query_hybrid("anything", 2, &db.hybrid_options(None)),
        Err(Error::NotInitialized)
    ));
    assert!(matches!(db.embed_text("anything"), Err(Error::NotInitialized)));
    assert!(matches!(db.embed_batch(&["a"]), Err(Error::NotInitialized)));
    assert!(matches!(db.embedding_service(), Err(Error::NotInitialized)));
    assert!(matches!(db.similar_to(id, 1), Err(Error::NotInitialized)));
    assert!(matches!(db.reindex(), Err(Error::NotInitialized)));
    assert!(matches!(db.index_engram(id), Err(Error::NotInitialized)));

    assert_eq!(db.get_engram(id).unwrap().content, "stored without vectors");
}

#[test]
fn test_init_state_machine() {
    let db = create_test_db();
    assert_eq!(
        db.init_vector_search(EmbeddingModelType::Hashing).unwrap(),
        InitOutcome::Initialized
    );
    assert_eq!(
        db.init_vector_search(EmbeddingModelType::Hashing).unwrap(),
        InitOutcome::AlreadyInitialized
    );
    assert!(matches!(
        db.init_vector_search(EmbeddingModelType::E5),
        Err(Error::AlreadyInitialized {
            current: EmbeddingModelType::Hashing,
            requested: EmbeddingModelType::E5
        })
    ));
    assert_eq!(db.vector_model().unwrap(), Some(EmbeddingModelType::Hashing));
    assert_eq!(db.embedding_service().unwrap().get_dimensions(), 384);
}

#[test]
fn test_model_binding_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let path = config.database_path.clone();
    {
        let db = EngramDb::open(&path, config.clone()).unwrap();
        db.init_vector_search(EmbeddingModelType::Hashing).unwrap();
    }

    let db = EngramDb::open(&path, config).unwrap();
    assert!(!db.is_vector_search_initialized().unwrap());
    assert!(matches!(
        db.init_vector_search(EmbeddingModelType::Gte),
        Err(Error::AlreadyInitialized {
            current: EmbeddingModelType::Hashing,
            ..
        })
    ));
    assert_eq!(
        db.init_vector_search_from_config().unwrap(),
        InitOutcome::Initialized
    );
}

#[test]
fn test_init_embeds_existing_engrams() {
    let db = create_test_db();
    let solar = add(&db, "Solar panels are becoming more affordable");
    add(&db, "Medieval castles had thick stone walls");

    db.init_vector_search(EmbeddingModelType::Hashing).unwrap();
    assert_eq!(db.stats().unwrap().embeddings, 2);

    let results = db.query_by_text("affordable solar panels", 1).unwrap();
    assert_eq!(results[0].engram.id, Some(solar));
}

#[test]
fn test_reopen_reuses_persisted_embeddings() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let path = config.database_path.clone();
    let bread = {
        let db = EngramDb::open(&path, config.clone()).unwrap();
        db.init_vector_search(EmbeddingModelType::Hashing).unwrap();
        add(&db, "Wind turbines generate electricity");
        add(&db, "Bread needs yeast to rise")
    };

    let db = EngramDb::open(&path, config).unwrap();
    db.init_vector_search(EmbeddingModelType::Hashing).unwrap();
    assert_eq!(db.stats().unwrap().embeddings, 2);
    let results = db.query_by_text("yeast bread", 1).unwrap();
    assert_eq!(results[0].engram.id, Some(bread));
}

#[test]
fn test_add_engram_embedding_failure_stores_nothing() {
    let db = create_test_db();
    db.init_vector_search_with_backend(EmbeddingModelType::BgeSmall, Box::new(FlakyBackend))
        .unwrap();

    let mut engram = Engram::new("boom goes the backend", "test", 0.5);
    assert!(matches!(db.add_engram(&mut engram), Err(Error::Embedding(_))));
    assert!(engram.id.is_none());
    assert_eq!(db.engram_count().unwrap(), 0);

    let mut fine = Engram::new("quiet text", "test", 0.5);
    db.add_engram(&mut fine).unwrap();
    assert_eq!(db.stats().unwrap().embeddings, 1);
}

#[test]
fn test_add_engram_validation_precedes_embedding() {
    let db = create_test_db();
    db.init_vector_search(EmbeddingModelType::Hashing).unwrap();
    let mut engram = Engram::new("  ", "test", 0.5);
    assert!(matches!(db.add_engram(&mut engram), Err(Error::Validation(_))));
}

#[test]
fn test_delete_engram_removes_index_entry() {
    let db = create_test_db();
    db.init_vector_search(EmbeddingModelType::Hashing).unwrap();
    let solar = add(&db, "solar power");
    let panels = add(&db, "solar panels");
    let mut connection = Connection::new(solar, panels, "supports", 0.9);
    let link = db.add_connection(&mut connection).unwrap();

    assert_eq!(db.delete_engram(solar).unwrap(), vec![link]);
    let results = db.query_by_text("solar power", 5).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].engram.id, Some(panels));
    assert_eq!(db.stats().unwrap().embeddings, 1);
}

#[test]
fn test_reindex_and_index_engram() {
    let db = create_test_db();
    db.init_vector_search(EmbeddingModelType::Hashing).unwrap();
    let a = add(&db, "first engram");
    add(&db, "second engram");

    assert_eq!(db.reindex().unwrap(), 2);
    db.index_engram(a).unwrap();
    assert!(matches!(
        db.index_engram(EngramId::new(99)),
        Err(Error::NotFound(_))
    ));
    assert_eq!(db.query_by_text("engram", 5).unwrap().len(), 2);
}

#[test]
fn test_embed_through_handle() {
    let db = create_test_db();
    db.init_vector_search(EmbeddingModelType::Hashing).unwrap();
    let single = db.embed_text("renewable energy").unwrap();
    let batch = db.embed_batch(&["renewable energy", "solar"]).unwrap();
    assert_eq!(batch[0], single);
    assert!(single.is_normalized());
}

#[test]
fn test_search_keywords_without_vectors() {
    let db = create_test_db();
    let climate = add(&db, "Climate change is accelerating");
    add(&db, "Solar panels are becoming more affordable");

    let hits = db.search_keywords("climate", 5).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].engram.id, Some(climate));
}

#[test]
fn test_hybrid_options_use_configured_weight() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        graph_weight: 0.3,
        ..test_config(dir.path())
    };
    let db = EngramDb::open(&config.database_path.clone(), config).unwrap();
    let options = db.hybrid_options(Some("causes".into()));
    assert_eq!(options.graph_weight, 0.3);
    assert_eq!(options.relation.as_ref().map(|r| r.as_str()), Some("causes"));
}

#[test]
fn test_failed_reindex_keeps_serving_results() {
    let db = create_test_db();
    let failing = Arc::new(AtomicBool::new(false));
    let backend = ToggleBackend {
        inner: HashingBackend::new(384, "toggle"),
        failing: Arc::clone(&failing),
    };
    db.init_vector_search_with_backend(EmbeddingModelType::BgeSmall, Box::new(backend))
        .unwrap();
    add(&db, "solar power");
    add(&db, "wind power");

    failing.store(true, Ordering::SeqCst);
    assert!(matches!(db.reindex(), Err(Error::EmbeddingBatch { .. })));

    failing.store(false, Ordering::SeqCst);
    assert_eq!(db.query_by_text("power", 5).unwrap().len(), 2);
    assert_eq!(db.stats().unwrap().embeddings, 2);

    assert_eq!(db.reindex().unwrap(), 2);
    assert_eq!(db.query_by_text("power", 5).unwrap().len(), 2);
}

#[test]
fn test_reindex_drops_entries_of_deleted_engrams() {
    let db = create_test_db();
    db.init_vector_search(EmbeddingModelType::Hashing).unwrap();
    let solar = add(&db, "solar power");
    add(&db, "wind power");
    db.delete_engram(solar).unwrap();

    assert_eq!(db.reindex().unwrap(), 1);
    let results = db.query_by_text("solar power", 5).unwrap();
    assert_eq!(results.len(), 1);
    assert_ne!(results[0].engram.id, Some(solar));
}

#[test]
fn test_add_engram_rolls_back_when_indexing_fails() {
    let db = create_test_db();
    db.init_vector_search(EmbeddingModelType::Hashing).unwrap();
    let kept = add(&db, "already indexed");

    let embedder = db.embedding_service().unwrap();
    *db.vector.write().unwrap() = Some(Arc::new(VectorState {
        embedder,
        index: Arc::new(ReadOnlyIndex(FlatIndex::new(384))),
    }));

    let mut engram = Engram::new("never indexed", "test", 0.5);
    assert!(matches!(db.add_engram(&mut engram), Err(Error::Lock(_))));
    assert!(engram.id.is_none());
    assert_eq!(db.engram_count().unwrap(), 1);
    assert_eq!(db.stats().unwrap().embeddings, 1);
    assert!(db.contains_engram(kept).unwrap());
    let hits = db.search_keywords("indexed", 5).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].engram.id, Some(kept));
}

#[test]
fn test_find_paths_through_handle() {
    let db = create_test_db();
    let a = add(&db, "first");
    let b = add(&db, "second");
    let c = add(&db, "third");
    db.add_connection(&mut Connection::new(a, b, "causes", 0.5)).unwrap();
    db.add_connection(&mut Connection::new(b, c, "causes", 0.5)).unwrap();

    assert_eq!(db.find_paths(a, c, 3).unwrap(), vec![vec![a, b, c]]);
    assert!(db.find_paths(c, a, 3).unwrap().is_empty());
}

#[test]
fn test_export_then_import_into_fresh_store() {
    let source = create_test_db();
    let climate = add(&source, "Climate change is accelerating");
    let renewable = add(&source, "Renewable energy adoption is growing");
    source
        .add_connection(&mut Connection::new(climate, renewable, "causes", 0.8))
        .unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("snapshot.json");
    let snapshot = source.export_to_path(&path).unwrap();
    assert_eq!(snapshot.engrams.len(), 2);
    assert_eq!(snapshot.connections.len(), 1);

    let target = create_test_db();
    add(&target, "Already here");
    target.init_vector_search(EmbeddingModelType::Hashing).unwrap();

    let stats = target.import_from_path(&path).unwrap();
    assert_eq!(stats.imported_engrams, 2);
    assert_eq!(stats.imported_connections, 1);
    assert_eq!(target.engram_count().unwrap(), 3);
    assert_eq!(target.stats().unwrap().embeddings, 3);

    let hits = target.query_by_text("Climate change is accelerating", 1).unwrap();
    let new_climate = hits[0].engram.id.unwrap();
    assert_ne!(new_climate, climate);
    let links = target.connections_from(new_climate).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].relation.as_str(), "causes");
    assert_eq!(
        target.get_engram(links[0].to_id).unwrap().content,
        "Renewable energy adoption is growing"
    );
}

#[test]
fn test_import_skips_invalid_records() {
    let db = create_test_db();
    let mut snapshot = db.export_snapshot().unwrap();

    let mut valid = Engram::new("kept", "test", 0.5);
    valid.id = Some(EngramId::new(7));
    let mut invalid = Engram::new("   ", "test", 0.5);
    invalid.id = Some(EngramId::new(8));
    snapshot.engrams = vec![valid, invalid];
    snapshot.connections = vec![
        Connection::new(EngramId::new(7), EngramId::new(8), "causes", 0.5),
        Connection::new(EngramId::new(7), EngramId::new(7), "causes", 2.0),
    ];

    let stats = db.import_snapshot(snapshot).unwrap();
    assert_eq!(
        stats,
        ImportStats {
            imported_engrams: 1,
            imported_connections: 0,
            skipped_engrams: 1,
            skipped_connections: 2,
        }
    );
    assert_eq!(db.engram_count().unwrap(), 1);
}

#[test]
fn test_import_rejects_bad_input() {
    let db = create_test_db();
    let mut snapshot = db.export_snapshot().unwrap();
    snapshot.version = "0".to_string();
    assert!(matches!(db.import_snapshot(snapshot), Err(Error::Validation(_))));

    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.json");
    assert!(matches!(db.import_from_path(&missing), Err(Error::FileNotFound(_))));

    let garbage = dir.path().join("garbage.json");
    std::fs::write(&garbage, "not json").unwrap();
    assert!(matches!(db.import_from_path(&garbage), Err(Error::Json(_))));

    let unwritable = dir.path().join("no/such/dir/snapshot.json");
    assert!(matches!(db.export_to_path(&unwritable), Err(Error::Io(_))));
}
