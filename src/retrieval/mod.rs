//! Multi-query retrieval and diversification
//!
//! A search embeds every query in one model call, issues one batched index
//! query, merges the per-query hit lists (junk filtered, deduplicated by
//! content fingerprint), ranks globally by distance and finally caps how many
//! passages any single source document may contribute.

mod diversify;
mod engine;
mod merge;
mod preview;
mod request;

pub use diversify::{diversify, sort_by_distance, source_key, MISSING_DISTANCE};
pub use engine::SearchEngine;
pub use merge::merge_hits;
pub use preview::{compose, EMPTY_QUESTION_ANSWER, NO_RESULTS_ANSWER};
pub use request::SearchRequest;

use crate::store::{Metadata, MetadataFilter};
use serde::{Deserialize, Serialize};

/// Which copy of a duplicated passage survives the merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// The first occurrence in query-then-rank order
    #[default]
    FirstSeen,
    /// The occurrence with the smallest distance
    Closest,
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first_seen" => Ok(Self::FirstSeen),
            "closest" => Ok(Self::Closest),
            other => Err(format!("unknown duplicate policy '{}'", other)),
        }
    }
}

/// A retrieved passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Whitespace-normalized passage text
    pub content: String,
    pub metadata: Metadata,
    /// Lower is closer; `None` ranks after every measured hit
    pub distance: Option<f64>,
    /// Query that retrieved this passage
    #[serde(rename = "_hit_query", default, skip_serializing_if = "Option::is_none")]
    pub hit_query: Option<String>,
    /// Position of that query in the query list
    #[serde(rename = "_hit_query_i", default, skip_serializing_if = "Option::is_none")]
    pub hit_query_i: Option<usize>,
}

impl Candidate {
    pub fn strip_debug(&mut self) {
        self.hit_query = None;
        self.hit_query_i = None;
    }
}

/// Echo of the effective search parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    pub total_results: usize,
    pub search_query: String,
    pub queries_used: Vec<String>,
    pub fetch_k: usize,
    pub final_n: usize,
    pub max_per_source: usize,
    /// Always present, `null` when no filter was applied
    #[serde(rename = "where")]
    pub filter: Option<MetadataFilter>,
}

/// The `metadata` object of a response; its shape depends on the outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseMetadata {
    Search(SearchMetadata),
    EmptyQuestion {
        total_results: usize,
        search_query: String,
    },
    Error {
        error: String,
    },
}

/// `{answer, chunks, metadata}` as returned by the CLI and the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub answer: String,
    pub chunks: Vec<Candidate>,
    pub metadata: ResponseMetadata,
}

impl SearchResponse {
    /// Response for a blank question; nothing was searched
    pub fn empty_question() -> Self {
        Self {
            answer: EMPTY_QUESTION_ANSWER.to_string(),
            chunks: Vec::new(),
            metadata: ResponseMetadata::EmptyQuestion {
                total_results: 0,
                search_query: String::new(),
            },
        }
    }

    /// Well-formed failure response
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            answer: format!("知识库服务暂时不可用：{}", message),
            chunks: Vec::new(),
            metadata: ResponseMetadata::Error { error: message },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.metadata, ResponseMetadata::Error { .. })
    }
}
