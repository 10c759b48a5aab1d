//! fshdkb - FSHD knowledge base retrieval
//!
//! Answers medical questions about facioscapulohumeral muscular dystrophy by
//! searching a vector-embedded document collection with several related
//! queries at once, then merging, deduplicating, ranking and diversifying the
//! hits so no single source document dominates the result.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod expansion;
pub mod filtering;
pub mod ingest;
pub mod retrieval;
pub mod server;
pub mod store;

pub use error::{KbError, Result};
