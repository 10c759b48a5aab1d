//! In-memory stand-ins for the embedding model and the vector index
#![allow(dead_code)]

use fshdkb::config::Config;
use fshdkb::embedding::{EmbeddingError, EmbeddingProvider};
use fshdkb::retrieval::SearchEngine;
use fshdkb::store::{Hit, Metadata, MetadataFilter, Record, VectorStore, VectorStoreError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Embeds text `i` of a batch as `[i]`, counting model calls
#[derive(Default)]
pub struct MockEmbedder {
    pub calls: AtomicUsize,
    pub batches: Mutex<Vec<Vec<String>>>,
}

impl EmbeddingProvider for MockEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().unwrap().push(texts.to_vec());
        Ok((0..texts.len()).map(|i| vec![i as f32]).collect())
    }

    fn dimension(&self) -> usize {
        1
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Returns canned hit lists: vector `[i]` gets `results[i]`
#[derive(Default)]
pub struct MockStore {
    pub results: Vec<Vec<Hit>>,
    pub fail: bool,
    pub calls: AtomicUsize,
    pub last_top_k: AtomicUsize,
    pub last_filter: Mutex<Option<MetadataFilter>>,
}

impl MockStore {
    pub fn with_results(results: Vec<Vec<Hit>>) -> Self {
        Self {
            results,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

impl VectorStore for MockStore {
    fn query(
        &self,
        query_vectors: &[Vec<f32>],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Vec<Hit>>, VectorStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_top_k.store(top_k, Ordering::SeqCst);
        *self.last_filter.lock().unwrap() = filter.cloned();

        if self.fail {
            return Err(VectorStoreError::Http("connection refused".to_string()));
        }

        Ok(query_vectors
            .iter()
            .map(|v| {
                let i = v[0] as usize;
                self.results
                    .get(i)
                    .map(|hits| hits.iter().take(top_k).cloned().collect())
                    .unwrap_or_default()
            })
            .collect())
    }

    fn count(&self) -> Result<usize, VectorStoreError> {
        if self.fail {
            return Err(VectorStoreError::Http("connection refused".to_string()));
        }
        Ok(self.results.iter().map(Vec::len).sum())
    }

    fn upsert(&self, _records: &[Record]) -> Result<(), VectorStoreError> {
        Ok(())
    }

    fn peek(&self, limit: usize) -> Result<Vec<Metadata>, VectorStoreError> {
        Ok(self
            .results
            .iter()
            .flatten()
            .take(limit)
            .map(|h| h.metadata.clone())
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Answers every query with empty lists after a fixed delay
pub struct SlowStore(pub Duration);

impl VectorStore for SlowStore {
    fn query(
        &self,
        query_vectors: &[Vec<f32>],
        _top_k: usize,
        _filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Vec<Hit>>, VectorStoreError> {
        std::thread::sleep(self.0);
        Ok(vec![Vec::new(); query_vectors.len()])
    }

    fn count(&self) -> Result<usize, VectorStoreError> {
        Ok(0)
    }

    fn upsert(&self, _records: &[Record]) -> Result<(), VectorStoreError> {
        Ok(())
    }

    fn peek(&self, _limit: usize) -> Result<Vec<Metadata>, VectorStoreError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

pub fn metadata(value: Value) -> Metadata {
    match value {
        Value::Object(map) => map,
        _ => panic!("metadata must be an object"),
    }
}

/// A passage long enough to survive the junk filter
pub fn passage(source: &str, n: usize) -> String {
    format!(
        "{} passage {} about facioscapulohumeral muscular dystrophy care",
        source, n
    )
}

pub fn hit(text: &str, source: &str, distance: f64) -> Hit {
    Hit {
        document: Some(text.to_string()),
        metadata: metadata(json!({ "source_file": source, "language": "en" })),
        distance: Some(distance),
    }
}

pub fn engine(store: Arc<MockStore>, embedder: Arc<MockEmbedder>) -> SearchEngine {
    SearchEngine::from_config(&Config::default(), embedder, store).unwrap()
}
