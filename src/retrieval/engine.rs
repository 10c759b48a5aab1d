//! The multi-query search pipeline

use super::{
    compose, diversify, merge_hits, sort_by_distance, ResponseMetadata, SearchMetadata,
    SearchRequest, SearchResponse,
};
use crate::config::{Config, SearchConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{KbError, Result};
use crate::expansion::QueryExpander;
use crate::filtering::JunkFilter;
use crate::store::VectorStore;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Search engine shared by every request
///
/// Holds only read-only state; the embedder and the store are process-wide
/// singletons injected by the caller.
pub struct SearchEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    expander: QueryExpander,
    junk: JunkFilter,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        expander: QueryExpander,
        junk: JunkFilter,
        config: SearchConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            expander,
            junk,
            config,
        }
    }

    /// Build the filter and expander from configuration
    pub fn from_config(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let expander = match &config.search.expansions_file {
            Some(path) => QueryExpander::from_file(path)?,
            None => QueryExpander::builtin(),
        };
        let junk = JunkFilter::from_config(&config.filters)?;
        Ok(Self::new(embedder, store, expander, junk, config.search.clone()))
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn expander(&self) -> &QueryExpander {
        &self.expander
    }

    /// Queries actually issued for a request
    ///
    /// Explicit queries are trimmed and blanks dropped. With none left the
    /// question itself is used, or its expansion when the request asks.
    pub fn plan_queries(&self, question: &str, request: &SearchRequest) -> Vec<String> {
        let explicit: Vec<String> = request
            .queries
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect();

        if !explicit.is_empty() {
            return explicit;
        }
        if request.expand {
            let expanded = self.expander.expand(question, self.config.max_queries);
            if !expanded.is_empty() {
                return expanded;
            }
        }
        vec![question.to_string()]
    }

    /// Run one search
    ///
    /// A blank question returns the prompt response without touching the
    /// embedder or the store. Any embedding or index failure aborts the
    /// whole search.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let question = request.question.trim();
        if question.is_empty() {
            return Ok(SearchResponse::empty_question());
        }

        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("search", %request_id);
        let _enter = span.enter();
        let started = Instant::now();

        let queries = self.plan_queries(question, request);
        tracing::info!("Multi queries ({}): {:?}", queries.len(), queries);
        tracing::info!(
            "fetch_k={}, final_n={}, max_per_source={}, where={:?}",
            request.fetch_k,
            request.final_n,
            request.max_per_source,
            request.filter.as_ref().map(|f| f.as_map())
        );

        let vectors = self.embedder.embed_batch(&queries)?;
        let hits = self
            .store
            .query(&vectors, request.fetch_k, request.filter.as_ref())?;
        let returned: usize = hits.iter().map(Vec::len).sum();

        let mut merged = merge_hits(&queries, hits, &self.junk, self.config.duplicate_policy);
        tracing::debug!("{} hits merged into {} candidates", returned, merged.len());

        sort_by_distance(&mut merged);
        let mut chosen = diversify(merged, request.final_n, request.max_per_source);

        let answer = compose(question, &chosen);
        if !request.keep_debug_fields {
            chosen.iter_mut().for_each(|c| c.strip_debug());
        }

        tracing::info!(
            "Selected {} chunks in {}ms",
            chosen.len(),
            started.elapsed().as_millis()
        );

        Ok(SearchResponse {
            answer,
            metadata: ResponseMetadata::Search(SearchMetadata {
                total_results: chosen.len(),
                search_query: question.to_string(),
                queries_used: queries,
                fetch_k: request.fetch_k,
                final_n: request.final_n,
                max_per_source: request.max_per_source,
                filter: request.filter.clone(),
            }),
            chunks: chosen,
        })
    }

    /// Run one search on a worker thread, giving up after `limit`
    ///
    /// Model loading and index calls have no deadline of their own; on
    /// timeout the worker is abandoned and finishes in the background.
    pub fn search_within(
        self: &Arc<Self>,
        request: SearchRequest,
        limit: Duration,
    ) -> Result<SearchResponse> {
        let (tx, rx) = mpsc::channel();
        let engine = Arc::clone(self);
        std::thread::Builder::new()
            .name("fshdkb-search".to_string())
            .spawn(move || {
                // The receiver is gone once the deadline has passed
                let _ = tx.send(engine.search(&request));
            })
            .map_err(|e| KbError::Io {
                source: e,
                context: "Failed to spawn search worker".to_string(),
            })?;

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("Search exceeded {}ms", limit.as_millis());
                Err(KbError::Timeout { limit })
            }
            Err(RecvTimeoutError::Disconnected) => Err(KbError::Other(anyhow::anyhow!(
                "search worker exited without a result"
            ))),
        }
    }

    /// Run one search, folding any failure into an error response
    pub fn respond(&self, request: &SearchRequest) -> SearchResponse {
        match self.search(request) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Search failed: {}", e);
                SearchResponse::error(e.to_string())
            }
        }
    }
}
