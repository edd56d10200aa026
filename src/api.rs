//! Serializable request and response types for remote callers.
//!
//! Each `Request` variant maps onto one `EngramDb` operation. `execute`
//! runs a request and returns a `Response`; `respond` additionally folds
//! failures into `Response::Error` so a transport can always reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::EmbeddingModelType;
use crate::engram_db::{EngramDb, ImportStats, InitOutcome, Snapshot};
use crate::errors::Error;
use crate::query::QueryFilter;
use crate::types::{
    Connection, ConnectionId, Engram, EngramId, HybridHit, Metadata, Relation, ScoredEngram,
    StoreStats,
};

/// A call against an engram database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    CreateEngram {
        content: String,
        source: String,
        confidence: f64,
        #[serde(default)]
        metadata: Option<Metadata>,
    },
    GetEngram {
        id: EngramId,
    },
    DeleteEngram {
        id: EngramId,
    },
    CreateConnection {
        from_id: EngramId,
        to_id: EngramId,
        relation: Relation,
        weight: f64,
    },
    InitVectorSearch {
        model_type: EmbeddingModelType,
    },
    QueryByText {
        text: String,
        k: usize,
        #[serde(default)]
        filter: QueryFilter,
    },
    QueryHybrid {
        text: String,
        k: usize,
        #[serde(default)]
        relation: Option<Relation>,
        #[serde(default)]
        filter: QueryFilter,
    },
    SearchKeywords {
        text: String,
        limit: usize,
    },
    EmbedText {
        text: String,
    },
    EmbedBatch {
        texts: Vec<String>,
    },
    FindPaths {
        from_id: EngramId,
        to_id: EngramId,
        max_depth: usize,
    },
    Export,
    Import {
        snapshot: Snapshot,
    },
    Stats,
}

/// Full view of a stored engram.
#[derive(Debug, Clone, Serialize)]
pub struct EngramBody {
    pub id: EngramId,
    pub content: String,
    pub source: String,
    pub confidence: f64,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// One ranked query result.
#[derive(Debug, Clone, Serialize)]
pub struct ResultItem {
    pub id: EngramId,
    pub content: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<ConnectionId>,
}

/// Machine-readable failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

/// Reply to a `Request`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    EngramCreated {
        id: EngramId,
    },
    Engram(EngramBody),
    EngramDeleted {
        id: EngramId,
        connections: Vec<ConnectionId>,
    },
    ConnectionCreated {
        id: ConnectionId,
    },
    VectorSearch {
        status: InitOutcome,
    },
    Results {
        results: Vec<ResultItem>,
    },
    Vector {
        vector: Vec<f32>,
    },
    Vectors {
        vectors: Vec<Vec<f32>>,
    },
    Paths {
        paths: Vec<Vec<EngramId>>,
    },
    Snapshot(Snapshot),
    Imported(ImportStats),
    Stats(StoreStats),
    Error(ErrorBody),
}

#[must_use = "handle the error or results may be lost"]
/// Run one request against `db`.
///
/// # Errors
///
/// Returns whatever error the underlying operation produced.
pub fn execute(db: &EngramDb, request: Request) -> Result<Response, Error> {
    debug!(?request, "executing request");
    match request {
        Request::CreateEngram {
            content,
            source,
            confidence,
            metadata,
        } => {
            let mut engram = Engram::new(content, source, confidence);
            if let Some(metadata) = metadata {
                engram.metadata = metadata;
            }
            let id = db.add_engram(&mut engram)?;
            Ok(Response::EngramCreated { id })
        }
        Request::GetEngram { id } => {
            let engram = db.get_engram(id)?;
            Ok(Response::Engram(EngramBody {
                id,
                content: engram.content,
                source: engram.source,
                confidence: engram.confidence,
                metadata: engram.metadata,
                created_at: engram.created_at,
            }))
        }
        Request::DeleteEngram { id } => {
            let connections = db.delete_engram(id)?;
            Ok(Response::EngramDeleted { id, connections })
        }
        Request::CreateConnection {
            from_id,
            to_id,
            relation,
            weight,
        } => {
            let mut connection = Connection::new(from_id, to_id, relation, weight);
            let id = db.add_connection(&mut connection)?;
            Ok(Response::ConnectionCreated { id })
        }
        Request::InitVectorSearch { model_type } => {
            let status = db.init_vector_search(model_type)?;
            Ok(Response::VectorSearch { status })
        }
        Request::QueryByText { text, k, filter } => {
            Ok(scored_results(db.query_filtered(&text, k, &filter)?))
        }
        Request::QueryHybrid {
            text,
            k,
            relation,
            filter,
        } => {
            let options = db.hybrid_options(relation).with_filter(filter);
            Ok(hybrid_results(db.query_hybrid(&text, k, &options)?))
        }
        Request::SearchKeywords { text, limit } => {
            Ok(scored_results(db.search_keywords(&text, limit)?))
        }
        Request::EmbedText { text } => Ok(Response::Vector {
            vector: db.embed_text(&text)?.into_vec(),
        }),
        Request::EmbedBatch { texts } => {
            let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
            let vectors = db
                .embed_batch(&texts)?
                .into_iter()
                .map(|embedding| embedding.into_vec())
                .collect();
            Ok(Response::Vectors { vectors })
        }
        Request::FindPaths {
            from_id,
            to_id,
            max_depth,
        } => Ok(Response::Paths {
            paths: db.find_paths(from_id, to_id, max_depth)?,
        }),
        Request::Export => Ok(Response::Snapshot(db.export_snapshot()?)),
        Request::Import { snapshot } => Ok(Response::Imported(db.import_snapshot(snapshot)?)),
        Request::Stats => Ok(Response::Stats(db.stats()?)),
    }
}

/// Like `execute`, reporting failures as `Response::Error`.
pub fn respond(db: &EngramDb, request: Request) -> Response {
    execute(db, request).unwrap_or_else(|err| {
        Response::Error(ErrorBody {
            kind: error_kind(&err),
            message: err.to_string(),
        })
    })
}

/// Stable snake_case name of an error variant.
pub fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::NotFound(_) | Error::FileNotFound(_) => "not_found",
        Error::InvalidReference(_) => "invalid_reference",
        Error::DimensionMismatch { .. } => "dimension_mismatch",
        Error::NotInitialized => "not_initialized",
        Error::AlreadyInitialized { .. } => "already_initialized",
        Error::Embedding(_) | Error::EmbeddingBatch { .. } => "embedding",
        Error::Validation(_) => "validation",
        Error::Config(_) => "config",
        _ => "internal",
    }
}

fn scored_results(results: Vec<ScoredEngram>) -> Response {
    let results = results
        .into_iter()
        .filter_map(|scored| {
            Some(ResultItem {
                id: scored.engram.id?,
                content: scored.engram.content,
                score: scored.score,
                vector_score: None,
                via: None,
            })
        })
        .collect();
    Response::Results { results }
}

fn hybrid_results(hits: Vec<HybridHit>) -> Response {
    let results = hits
        .into_iter()
        .filter_map(|hit| {
            Some(ResultItem {
                id: hit.engram.id?,
                content: hit.engram.content,
                score: hit.score,
                vector_score: hit.vector_score,
                via: hit.via,
            })
        })
        .collect();
    Response::Results { results }
}
