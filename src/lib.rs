//! engramdb - an embedded store of semantic engrams.
//!
//! Engrams are units of content with provenance and confidence. They are
//! linked by typed, weighted connections and retrieved by vector similarity,
//! by keyword relevance, or by a hybrid of similarity and graph proximity.
//! All operations are synchronous.
//!
//! # Example
//!
//! ```no_run
//! use engramdb::{Config, Connection, EmbeddingModelType, Engram, EngramDb};
//!
//! let db = EngramDb::from_config(Config::default()).expect("Failed to open database");
//!
//! let mut climate = Engram::new("Climate change is accelerating", "research", 0.95);
//! let climate_id = db.add_engram(&mut climate).expect("Failed to add engram");
//! let mut renewable = Engram::new("Renewable energy adoption is growing", "report", 0.9);
//! let renewable_id = db.add_engram(&mut renewable).expect("Failed to add engram");
//!
//! let mut link = Connection::new(climate_id, renewable_id, "causes", 0.8);
//! db.add_connection(&mut link).expect("Failed to connect engrams");
//!
//! db.init_vector_search(EmbeddingModelType::BgeSmall)
//!     .expect("Failed to initialize vector search");
//! for hit in db.query_by_text("global warming", 2).unwrap() {
//!     println!("{:.2}: {}", hit.score, hit.engram.content);
//! }
//! ```
//!
//! # Vector search lifecycle
//!
//! Record operations work as soon as the database is open. Vector operations
//! return `Error::NotInitialized` until `init_vector_search` succeeds, and a
//! store stays bound to the first model it was initialized with.

pub mod api;
pub mod config;
pub mod embedding;
pub mod engram_db;
pub mod errors;
pub mod index;
pub mod query;
pub mod records;
pub mod sqlite;
pub mod types;

// Re-export public API
pub use config::Config;
pub use embedding::{
    Embedding, EmbeddingBackend, EmbeddingModelType, EmbeddingService, HashingBackend,
    OnnxBackend,
};
pub use engram_db::{EngramDb, ImportStats, InitOutcome, Snapshot};
pub use errors::Error;
pub use index::{FlatIndex, VectorIndex};
pub use query::{HybridOptions, QueryEngine, QueryFilter};
pub use records::{MAX_INPUT_LENGTH, RecordStore};
pub use sqlite::fts::MAX_SEARCH_LIMIT;
pub use types::{
    Connection, ConnectionId, Direction, Engram, EngramId, HybridHit, Metadata, Relation,
    ScoredEngram, StoreStats,
};
