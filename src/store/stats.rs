//! Collection statistics from a metadata sample
use super::{Metadata, VectorStore, VectorStoreError};
use serde::Serialize;
use std::collections::BTreeMap;

/// Records sampled for the distributions
pub const STATS_SAMPLE: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionStats {
    pub backend: String,
    pub total_chunks: usize,
    pub language_distribution: BTreeMap<String, usize>,
    pub category_distribution: BTreeMap<String, usize>,
}

impl CollectionStats {
    /// Count the collection and tally a sample of its metadata
    ///
    /// A failed sample degrades to attributing every record to `"unknown"`;
    /// only a failed count is an error.
    pub fn collect(store: &dyn VectorStore, sample: usize) -> Result<Self, VectorStoreError> {
        let total_chunks = store.count()?;
        let mut stats = Self {
            backend: store.name().to_string(),
            total_chunks,
            language_distribution: BTreeMap::new(),
            category_distribution: BTreeMap::new(),
        };

        let limit = sample.min(total_chunks);
        if limit == 0 {
            return Ok(stats);
        }

        match store.peek(limit) {
            Ok(metadatas) => {
                for metadata in &metadatas {
                    *stats
                        .language_distribution
                        .entry(field(metadata, "language"))
                        .or_insert(0) += 1;
                    *stats
                        .category_distribution
                        .entry(short_category(&field(metadata, "category")))
                        .or_insert(0) += 1;
                }
            }
            Err(e) => {
                tracing::warn!("Metadata sample failed: {}", e);
                stats
                    .language_distribution
                    .insert("unknown".to_string(), total_chunks);
                stats
                    .category_distribution
                    .insert("unknown".to_string(), total_chunks);
            }
        }

        Ok(stats)
    }
}

fn field(metadata: &Metadata, key: &str) -> String {
    match metadata.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => "unknown".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Last segment of a folder-style category
fn short_category(category: &str) -> String {
    category
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(category)
        .to_string()
}
