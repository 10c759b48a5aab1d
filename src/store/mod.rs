//! Vector index clients
//!
//! The search engine talks to a collection of `{id, document, metadata,
//! embedding}` records through the [`VectorStore`] trait. Two backends exist:
//! a remote Chroma collection and a local SQLite-persisted collection with an
//! in-memory HNSW index. Both answer a whole batch of query vectors in one
//! call, each result list ranked by ascending distance.

mod chroma;
mod filter;
mod local;
mod stats;

pub use chroma::{assemble_hits, ChromaStore};
pub use filter::MetadataFilter;
pub use local::LocalStore;
pub use stats::{CollectionStats, STATS_SAMPLE};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Record metadata: string keys to scalar JSON values
pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Remote returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Index error: {0}")]
    Index(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// One nearest-neighbour hit as returned by the index
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Hit {
    pub document: Option<String>,
    pub metadata: Metadata,
    /// Lower is closer; absent when the backend did not report one
    pub distance: Option<f64>,
}

/// A record to be written into a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// Batched nearest-neighbour access to a document collection
///
/// Implementations are shared by all concurrent requests and must not keep
/// per-request state.
pub trait VectorStore: Send + Sync {
    /// Query every vector in one round trip
    ///
    /// The outer result is indexed like `query_vectors`; each inner list holds
    /// at most `top_k` hits ranked by ascending distance. Errors abort the
    /// whole batch.
    fn query(
        &self,
        query_vectors: &[Vec<f32>],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Vec<Hit>>, VectorStoreError>;

    /// Number of records in the collection
    fn count(&self) -> Result<usize, VectorStoreError>;

    /// Insert or replace records by id
    fn upsert(&self, records: &[Record]) -> Result<(), VectorStoreError>;

    /// Metadata of up to `limit` records, for statistics
    fn peek(&self, limit: usize) -> Result<Vec<Metadata>, VectorStoreError>;

    /// Lightweight connectivity probe
    fn heartbeat(&self) -> Result<(), VectorStoreError> {
        self.count().map(|_| ())
    }

    /// Human-readable backend name
    fn name(&self) -> &str;
}

/// Cosine distance (1 - cosine similarity); zero vectors are maximally far
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (mag_a * mag_b)
}
